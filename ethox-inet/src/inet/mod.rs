//! The socket call layer.
//!
//! [`Inet`] is the context of one `AF_INET` family instance. It owns the [`Stack`] behind a
//! mutex and implements the socket calls on user [`Socket`]s: `bind`, `listen`, `connect`,
//! `accept`, `shutdown`, `getname`, `release`, the data calls and the control calls.
//!
//! Blocking calls sleep on the socket's wait queue with the mutex released. Transports wake them
//! through the sock callbacks. Each wait re-checks the calling [`Task`]'s pending signal and the
//! call returns `Interrupted` if one was raised, with enough state preserved that the call can
//! simply be made again.
//!
//! ```
//! use std::sync::Arc;
//! use ethox_inet::{Inet, Protocol, SockType, Task, Transport};
//! use ethox_inet::wire::{Ipv4Address, SockAddr};
//!
//! // Every hook has a default.
//! struct Quiet;
//! impl Protocol for Quiet {}
//!
//! let inet = Inet::builder()
//!     .protocol(Transport::Tcp, Arc::new(Quiet))
//!     .build()
//!     .unwrap();
//!
//! let task = Task::new(100, 100, false);
//! let mut socket = inet.create(&task, SockType::Stream, 0).unwrap();
//! inet.bind(&socket, &task, SockAddr::new(Ipv4Address::UNSPECIFIED, 0)).unwrap();
//! assert!(inet.getname(&socket, false).unwrap().port > 1024);
//! inet.release(&mut socket, &task).unwrap();
//! ```
//!
//! [`Inet`]: struct.Inet.html
//! [`Stack`]: ../stack/struct.Stack.html
//! [`Socket`]: struct.Socket.html
//! [`Task`]: ../task/struct.Task.html
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::iface::{Addresses, Interfaces, NetControl, NoControl};
use crate::proto::{Protocol, Transport};
use crate::registry::FourTuple;
use crate::sock::{MsgFlags, SockType, SocketKey, WaitQueue};
use crate::stack::{Delivery, Stack};
use crate::task::Task;
use crate::time::Instant;

mod calls;
mod control;
#[cfg(test)]
mod tests;

pub use self::control::{FcntlCommand, IoctlCommand, SockOpt, SOL_SOCKET};

/// The socket layer of one address family instance.
pub struct Inet {
    stack: Mutex<Stack>,
    addresses: Box<dyn Addresses>,
    control: Box<dyn NetControl>,
}

/// Assembles an [`Inet`] context.
///
/// [`Inet`]: struct.Inet.html
pub struct Builder {
    config: Config,
    protocols: Vec<(Transport, Arc<dyn Protocol>)>,
    addresses: Box<dyn Addresses>,
    control: Box<dyn NetControl>,
}

/// A user socket, the handle socket calls operate on.
///
/// The socket is attached to a sock in the stack from creation until release. Sleeping calls wait
/// on the socket's queue, which the attached sock wakes.
#[derive(Debug)]
pub struct Socket {
    kind: SockType,
    state: SocketState,
    data: Option<SocketKey>,
    wait: Arc<WaitQueue>,
    nonblocking: bool,
}

/// The call-level state of a socket, independent of the transport's connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SocketState {
    Unconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl Inet {
    pub fn builder() -> Builder {
        Builder {
            config: Config::default(),
            protocols: Vec::new(),
            addresses: Box::new(Interfaces::loopback()),
            control: Box::new(NoControl),
        }
    }

    /// Run a closure on the stack, for the packet arrival and timer side of the system.
    pub fn with<R>(&self, f: impl FnOnce(&mut Stack) -> R) -> R {
        f(&mut self.stack.lock())
    }

    /// Acquire the stack's guard.
    pub fn lock(&self) -> MutexGuard<'_, Stack> {
        self.stack.lock()
    }

    /// Demultiplex an inbound packet, see [`Stack::deliver`].
    ///
    /// [`Stack::deliver`]: ../stack/struct.Stack.html#method.deliver
    pub fn deliver(&self, transport: Transport, tuple: FourTuple, payload: Vec<u8>) -> Delivery {
        self.stack.lock().deliver(transport, tuple, payload)
    }

    /// Hand a copy of a packet to every matching sock, see [`Stack::deliver_fanout`].
    ///
    /// [`Stack::deliver_fanout`]: ../stack/struct.Stack.html#method.deliver_fanout
    pub fn deliver_fanout(&self, transport: Transport, tuple: FourTuple, payload: &[u8], match_remote_port: bool)
        -> Vec<SocketKey>
    {
        self.stack.lock().deliver_fanout(transport, tuple, payload, match_remote_port)
    }

    /// Fire expired timers.
    pub fn poll(&self, now: Instant) {
        self.stack.lock().poll(now)
    }

    /// Raise a signal for `task`, interrupting the socket call it is blocked in.
    pub fn interrupt(&self, task: &Task) {
        let _stack = self.stack.lock();
        if let Some(wait) = task.raise() {
            wait.wake();
        }
    }
}

impl Builder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Install the transport serving a socket family member.
    pub fn protocol(mut self, transport: Transport, ops: Arc<dyn Protocol>) -> Self {
        self.protocols.push((transport, ops));
        self
    }

    /// The addresses of this host, the loopback network by default.
    pub fn addresses(mut self, addresses: impl Addresses + 'static) -> Self {
        self.addresses = Box::new(addresses);
        self
    }

    /// The handler of forwarded route, neighbor and device requests.
    pub fn control(mut self, control: impl NetControl + 'static) -> Self {
        self.control = Box::new(control);
        self
    }

    pub fn build(self) -> Result<Inet> {
        let mut stack = Stack::new(self.config)?;
        for (transport, ops) in self.protocols {
            stack.install(transport, ops);
        }

        Ok(Inet {
            stack: Mutex::new(stack),
            addresses: self.addresses,
            control: self.control,
        })
    }
}

impl Socket {
    fn attached(kind: SockType, key: SocketKey, wait: Arc<WaitQueue>) -> Self {
        Socket {
            kind,
            state: SocketState::Unconnected,
            data: Some(key),
            wait,
            nonblocking: false,
        }
    }

    /// A socket without a sock, to be filled by `accept_into`.
    pub fn unattached(kind: SockType) -> Self {
        Socket {
            kind,
            state: SocketState::Unconnected,
            data: None,
            wait: WaitQueue::new(),
            nonblocking: false,
        }
    }

    pub fn kind(&self) -> SockType {
        self.kind
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    /// The attached sock.
    pub fn key(&self) -> Option<SocketKey> {
        self.data
    }

    pub fn wait_queue(&self) -> &Arc<WaitQueue> {
        &self.wait
    }

    /// Make every call on this socket non-blocking, as with `O_NONBLOCK`.
    pub fn set_nonblocking(&mut self, nonblocking: bool) {
        self.nonblocking = nonblocking;
    }

    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking
    }

    fn sock(&self) -> Result<SocketKey> {
        self.data.ok_or(Error::BadKey)
    }

    fn nonblock(&self, flags: MsgFlags) -> bool {
        self.nonblocking || flags.contains(MsgFlags::NONBLOCK)
    }
}

/// Sleep on `wait` until woken.
///
/// The signal is checked before and after sleeping so that one raised before the call blocks is
/// not missed.
fn sleep(stack: &mut MutexGuard<'_, Stack>, wait: &Arc<WaitQueue>, task: &Task) -> Result<()> {
    if task.signal_pending() {
        return Err(Error::Interrupted);
    }

    task.sleep_on(Some(wait.clone()));
    wait.wait(stack);
    task.sleep_on(None);

    if task.signal_pending() {
        Err(Error::Interrupted)
    } else {
        Ok(())
    }
}

/// Sleep on `wait` until woken or the deadline passed, returning whether it passed.
fn sleep_until(
    stack: &mut MutexGuard<'_, Stack>,
    wait: &Arc<WaitQueue>,
    task: &Task,
    deadline: std::time::Instant,
) -> Result<bool> {
    if task.signal_pending() {
        return Err(Error::Interrupted);
    }

    task.sleep_on(Some(wait.clone()));
    let timed_out = wait.wait_until(stack, deadline);
    task.sleep_on(None);

    if task.signal_pending() {
        Err(Error::Interrupted)
    } else {
        Ok(timed_out)
    }
}

/// Bind an unbound sock to an ephemeral port.
fn autobind(stack: &mut Stack, key: SocketKey) -> Result<()> {
    let sk = stack.get(key).ok_or(Error::BadKey)?;
    if sk.port() != 0 {
        return Ok(());
    }

    let transport = sk.transport();
    let port = stack.allocate_port(transport, 0)?;
    stack.register(key, port)
}
