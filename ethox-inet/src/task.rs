//! The caller of a socket call.
//!
//! Socket calls are made on behalf of a [`Task`]: it carries the credentials checked by `bind` and
//! `ioctl`, and the pending-signal flag that interrupts a blocking wait. Signals are raised through
//! [`Inet::interrupt`], which also wakes the queue the task sleeps on.
//!
//! [`Task`]: struct.Task.html
//! [`Inet::interrupt`]: ../inet/struct.Inet.html#method.interrupt
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::sock::WaitQueue;

/// Identity and signal state of a calling process.
#[derive(Debug)]
pub struct Task {
    pid: i32,
    pgrp: i32,
    privileged: bool,
    exiting: AtomicBool,
    signal: AtomicBool,
    sleeping: Mutex<Option<Arc<WaitQueue>>>,
}

impl Task {
    pub fn new(pid: i32, pgrp: i32, privileged: bool) -> Self {
        Task {
            pid,
            pgrp,
            privileged,
            exiting: AtomicBool::new(false),
            signal: AtomicBool::new(false),
            sleeping: Mutex::new(None),
        }
    }

    /// The credentials of the current process.
    pub fn current() -> Self {
        // SAFETY: these calls can not fail and have no preconditions.
        let (pid, pgrp, euid) = unsafe { (libc::getpid(), libc::getpgrp(), libc::geteuid()) };
        Task::new(pid, pgrp, euid == 0)
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn pgrp(&self) -> i32 {
        self.pgrp
    }

    /// Whether the task has superuser privileges.
    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    /// Mark the task as exiting, its socket releases no longer linger.
    pub fn set_exiting(&self) {
        self.exiting.store(true, Ordering::Release);
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::Acquire)
    }

    pub fn signal_pending(&self) -> bool {
        self.signal.load(Ordering::Acquire)
    }

    /// Acknowledge a pending signal.
    pub fn clear_signal(&self) {
        self.signal.store(false, Ordering::Release);
    }

    /// Raise a signal and return the queue the task sleeps on, if any.
    pub(crate) fn raise(&self) -> Option<Arc<WaitQueue>> {
        self.signal.store(true, Ordering::Release);
        self.sleeping.lock().clone()
    }

    pub(crate) fn sleep_on(&self, wait: Option<Arc<WaitQueue>>) {
        *self.sleeping.lock() = wait;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_task() {
        let task = Task::current();
        assert_eq!(task.pid(), std::process::id() as i32);
        assert!(!task.signal_pending());
    }

    #[test]
    fn signal_flag() {
        let task = Task::new(7, 7, false);
        assert!(task.raise().is_none());
        assert!(task.signal_pending());
        task.clear_signal();
        assert!(!task.signal_pending());

        let wait = WaitQueue::new();
        task.sleep_on(Some(wait.clone()));
        let woken = task.raise().unwrap();
        assert!(Arc::ptr_eq(&woken, &wait));
    }
}
