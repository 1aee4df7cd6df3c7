use std::collections::BTreeMap;

use crate::sock::SocketKey;
use crate::time::Instant;

/// The timers a sock may have armed, at most one of each kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerKind {
    /// Re-check of a sock whose destruction was deferred.
    Destroy,
    Retransmit,
    Keepalive,
    /// Any other timer of the transport.
    Protocol,
}

/// All armed timers of the stack.
///
/// Timers are only evaluated when the stack is polled.
#[derive(Debug, Default)]
pub(crate) struct Timers {
    armed: BTreeMap<(SocketKey, TimerKind), Instant>,
}

impl Timers {
    /// Arm a timer, replacing an armed timer of the same kind.
    pub fn arm(&mut self, sk: SocketKey, kind: TimerKind, expires: Instant) {
        self.armed.insert((sk, kind), expires);
    }

    pub fn cancel(&mut self, sk: SocketKey, kind: TimerKind) -> bool {
        self.armed.remove(&(sk, kind)).is_some()
    }

    pub fn cancel_all(&mut self, sk: SocketKey) {
        self.armed.retain(|(key, _), _| *key != sk);
    }

    pub fn expiry(&self, sk: SocketKey, kind: TimerKind) -> Option<Instant> {
        self.armed.get(&(sk, kind)).copied()
    }

    pub fn next_expiry(&self) -> Option<Instant> {
        self.armed.values().min().copied()
    }

    /// Disarm and return all timers expired at `now`, earliest first.
    pub fn expired(&mut self, now: Instant) -> Vec<(SocketKey, TimerKind)> {
        let mut due: Vec<_> = self.armed.iter()
            .filter(|(_, expires)| **expires <= now)
            .map(|(&(sk, kind), &expires)| (expires, sk, kind))
            .collect();
        due.sort();

        due.into_iter()
            .map(|(_, sk, kind)| {
                self.armed.remove(&(sk, kind));
                (sk, kind)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }
}
