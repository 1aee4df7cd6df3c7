//! Tunables of the socket layer.
use crate::error::{Error, Result};
use crate::time::Duration;

/// Construction parameters of an [`Inet`] context.
///
/// The defaults are exposed as associated constants and mirror the historical values of the
/// BSD socket layer. Override individual fields with struct update syntax:
///
/// ```
/// use ethox_inet::Config;
///
/// let config = Config {
///     table_size: 64,
///     ..Config::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
///
/// [`Inet`]: ../inet/struct.Inet.html
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Number of buckets in each transport registry, must be a power of two.
    pub table_size: usize,
    /// Ports below this value require a privileged caller.
    pub reserved_ports: u16,
    /// Upper bound on the accept backlog requested by `listen`.
    pub max_backlog: u32,
    /// Default send buffer limit of a new sock, in bytes.
    pub sndbuf: usize,
    /// Default receive buffer limit of a new sock, in bytes.
    pub rcvbuf: usize,
    /// Default path mtu of a new sock.
    pub mtu: u16,
    /// Default time to live of a new sock.
    pub ttl: u8,
    /// Interval between two checks of a sock awaiting deferred destruction.
    pub destroy_delay: Duration,
    /// Number of re-checks after which deferred destruction gives up on a sock.
    pub destroy_retries: u32,
    /// Number of table-size strides the port allocator probes in a crowded bucket.
    pub probe_limit: usize,
}

impl Config {
    pub const TABLE_SIZE: usize = 256;
    pub const RESERVED_PORTS: u16 = 1024;
    pub const MAX_BACKLOG: u32 = 128;
    pub const SNDBUF: usize = 32767;
    pub const RCVBUF: usize = 32767;
    pub const MTU: u16 = 576;
    pub const TTL: u8 = 64;
    pub const DESTROY_DELAY: Duration = Duration::from_secs(10);
    pub const DESTROY_RETRIES: u32 = 30;
    pub const PROBE_LIMIT: usize = 256;

    /// Check the invariants the registry relies on.
    pub fn validate(&self) -> Result<()> {
        if !self.table_size.is_power_of_two() {
            return Err(Error::InvalidArgument);
        }

        if self.probe_limit == 0 || self.max_backlog == 0 {
            return Err(Error::InvalidArgument);
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            table_size: Self::TABLE_SIZE,
            reserved_ports: Self::RESERVED_PORTS,
            max_backlog: Self::MAX_BACKLOG,
            sndbuf: Self::SNDBUF,
            rcvbuf: Self::RCVBUF,
            mtu: Self::MTU,
            ttl: Self::TTL,
            destroy_delay: Self::DESTROY_DELAY,
            destroy_retries: Self::DESTROY_RETRIES,
            probe_limit: Self::PROBE_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn table_size_must_be_power_of_two() {
        assert!(Config::default().validate().is_ok());
        let odd = Config { table_size: 100, ..Config::default() };
        assert!(odd.validate().is_err());
        let zero = Config { table_size: 0, ..Config::default() };
        assert!(zero.validate().is_err());
    }
}
