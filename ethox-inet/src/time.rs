//! Points in time of the socket layer.
//!
//! The stack has no clock. Whoever drives it passes the current [`Instant`] to
//! [`Inet::poll`], which both advances the time stamped on arriving packets and fires the timers
//! due by then. Relative time is a plain [`Duration`].
//!
//! [`Instant`]: struct.Instant.html
//! [`Inet::poll`]: ../inet/struct.Inet.html#method.poll
//! [`Duration`]: struct.Duration.html
use core::{fmt, ops};
pub use core::time::Duration;

/// Milliseconds since an origin chosen by the caller, usually the Unix epoch.
///
/// Negative values lie before the origin.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant {
    millis: i64,
}

impl Instant {
    pub fn from_millis<T: Into<i64>>(millis: T) -> Self {
        Instant { millis: millis.into() }
    }

    pub fn from_secs<T: Into<i64>>(secs: T) -> Self {
        Instant { millis: secs.into() * 1000 }
    }

    /// The wall clock time, relative to the Unix epoch.
    pub fn now() -> Self {
        Self::from(std::time::SystemTime::now())
    }

    pub fn total_millis(self) -> i64 {
        self.millis
    }

    /// Whole seconds and the microseconds beyond them, as reported by `SIOCGSTAMP`.
    pub fn timeval(self) -> (i64, i64) {
        (self.millis.div_euclid(1000), self.millis.rem_euclid(1000) * 1000)
    }
}

impl From<std::time::SystemTime> for Instant {
    fn from(time: std::time::SystemTime) -> Self {
        let millis = match time.duration_since(std::time::UNIX_EPOCH) {
            Ok(after) => after.as_millis() as i64,
            Err(before) => -(before.duration().as_millis() as i64),
        };
        Instant { millis }
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (secs, micros) = self.timeval();
        write!(f, "{}.{:03}s", secs, micros / 1000)
    }
}

impl ops::Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, delay: Duration) -> Instant {
        Instant { millis: self.millis + delay.as_millis() as i64 }
    }
}

impl ops::Sub<Instant> for Instant {
    type Output = Duration;

    /// The distance between two instants, regardless of their order.
    fn sub(self, other: Instant) -> Duration {
        Duration::from_millis((self.millis - other.millis).unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        let armed = Instant::from_secs(3) + Duration::from_millis(250);
        assert_eq!(armed.total_millis(), 3250);
        assert_eq!(armed - Instant::from_secs(3), Duration::from_millis(250));
        assert_eq!(Instant::from_secs(3) - armed, Duration::from_millis(250));
        assert!(Instant::from_secs(3) < armed);
    }

    #[test]
    fn timeval() {
        assert_eq!(Instant::from_millis(5674).timeval(), (5, 674_000));
        assert_eq!(Instant::from_millis(-1).timeval(), (-1, 999_000));
        assert_eq!(Instant::from_millis(5004).to_string(), "5.004s");
    }

    #[test]
    fn from_system_time() {
        assert_eq!(Instant::from(std::time::UNIX_EPOCH), Instant::default());
        let later = std::time::UNIX_EPOCH + Duration::from_secs(86_400);
        assert_eq!(Instant::from(later), Instant::from_secs(86_400));
    }
}
