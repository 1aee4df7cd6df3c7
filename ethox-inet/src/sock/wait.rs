use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, MutexGuard};

use super::Sock;

/// The place a blocked socket call sleeps.
///
/// A wait queue belongs to a user [`Socket`] and is linked into its sock while the two are
/// attached. Sleeping atomically releases the guard of the socket layer, so a wake-up raised by
/// a transport while it holds that guard can not be lost.
///
/// [`Socket`]: ../inet/struct.Socket.html
#[derive(Debug, Default)]
pub struct WaitQueue {
    cond: Condvar,
    sleepers: AtomicUsize,
}

/// Hooks a transport fires on its sock when something changes.
///
/// The defaults wake every caller sleeping on the sock's wait queue unless the sock is already
/// dead. Install another implementation with [`Sock::set_callbacks`] to observe events, for
/// example to raise an asynchronous notification.
///
/// [`Sock::set_callbacks`]: struct.Sock.html#method.set_callbacks
pub trait Callbacks: Send + Sync {
    /// The connection state changed.
    fn state_change(&self, sk: &Sock) {
        sk.wake();
    }

    /// Data arrived on the receive queue.
    fn data_ready(&self, sk: &Sock, _len: usize) {
        sk.wake();
    }

    /// Send buffer space became available.
    fn write_space(&self, sk: &Sock) {
        sk.wake();
    }

    /// An error was latched on the sock.
    fn error_report(&self, sk: &Sock) {
        sk.wake();
    }
}

/// The default callbacks, which only wake sleepers.
#[derive(Clone, Copy, Debug, Default)]
pub struct WakeUp;

impl Callbacks for WakeUp { }

impl WaitQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(WaitQueue::default())
    }

    /// Wake all callers sleeping on this queue.
    pub fn wake(&self) {
        self.cond.notify_all();
    }

    /// The number of callers currently asleep.
    pub fn sleepers(&self) -> usize {
        self.sleepers.load(Ordering::Acquire)
    }

    /// Sleep until woken, releasing the guard meanwhile.
    pub(crate) fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) {
        self.sleepers.fetch_add(1, Ordering::AcqRel);
        self.cond.wait(guard);
        self.sleepers.fetch_sub(1, Ordering::AcqRel);
    }

    /// Sleep until woken or the deadline passed, releasing the guard meanwhile.
    ///
    /// Returns `true` if the deadline passed.
    pub(crate) fn wait_until<T>(&self, guard: &mut MutexGuard<'_, T>, deadline: std::time::Instant) -> bool {
        self.sleepers.fetch_add(1, Ordering::AcqRel);
        let result = self.cond.wait_until(guard, deadline);
        self.sleepers.fetch_sub(1, Ordering::AcqRel);
        result.timed_out()
    }
}
