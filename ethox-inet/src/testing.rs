//! A scripted transport for exercising the socket layer.
//!
//! [`Scripted`] implements every hook of [`Protocol`] with the simplest behavior that still drives
//! socks through their states: connects complete when told to, closes finish immediately (or
//! linger in `FinWait1` if asked), accepted connections come from the listener's receive queue.
//! It records each hook invocation so tests can assert on the order of events.
//!
//! [`Scripted`]: struct.Scripted.html
//! [`Protocol`]: ../proto/trait.Protocol.html
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::lifecycle::TimerKind;
use crate::proto::{Protocol, Select, Transport};
use crate::sock::{Direction, MsgFlags, Shutdown, SocketKey, TcpState};
use crate::stack::Stack;
use crate::wire::SockAddr;

/// A hook invocation seen by the [`Scripted`] transport.
///
/// [`Scripted`]: struct.Scripted.html
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Init(SocketKey),
    Connect(SocketKey, SockAddr),
    Close { sk: SocketKey, dead: bool },
    Accept(SocketKey),
    Shutdown(SocketKey, Shutdown),
    Send(SocketKey, usize),
    Ioctl(SocketKey, u32),
    Timer(SocketKey, TimerKind),
}

/// A transport whose behavior is controlled by the test.
#[derive(Debug, Default)]
pub struct Scripted {
    events: Mutex<Vec<Event>>,
    fail_init: AtomicBool,
    instant_connect: AtomicBool,
    graceful_close: AtomicBool,
}

impl Scripted {
    /// The `ioctl` command this transport answers, echoing its argument.
    pub const IOCTL_ECHO: u32 = 0x89e0;

    pub fn new() -> Self {
        Scripted::default()
    }

    /// Let `init` fail with `Exhausted`.
    pub fn fail_init(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::Release);
    }

    /// Let `connect` move straight to `Established` instead of `SynSent`.
    pub fn instant_connect(&self, instant: bool) {
        self.instant_connect.store(instant, Ordering::Release);
    }

    /// Let `close` of a connected sock go to `FinWait1` instead of `Closed`.
    pub fn graceful_close(&self, graceful: bool) {
        self.graceful_close.store(graceful, Ordering::Release);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// The socks closed so far, in order.
    pub fn closed(&self) -> Vec<SocketKey> {
        self.events.lock()
            .iter()
            .filter_map(|event| match event {
                Event::Close { sk, .. } => Some(*sk),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }

    /// Simulate a connection request arriving at a listener.
    ///
    /// Creates the child in `SynRecv` and queues a reference to it on the listener, charged to the
    /// child, the way a transport does on receipt of a handshake.
    pub fn incoming(stack: &mut Stack, listener: SocketKey, remote: SockAddr) -> Result<SocketKey> {
        let child = stack.create_child(listener, remote)?;
        let skb = stack.alloc_buffer(Some(child), Vec::new(), Direction::Read);
        stack.queue_receive(listener, skb);
        if let Some(sk) = stack.get_mut(listener) {
            sk.ack_backlog += 1;
        }
        Ok(child)
    }

    /// Complete the handshake of a sock.
    pub fn establish(stack: &mut Stack, sk: SocketKey) {
        stack.set_state(sk, TcpState::Established);
    }
}

impl Protocol for Scripted {
    fn init(&self, _: &mut Stack, sk: SocketKey) -> Result<()> {
        self.record(Event::Init(sk));
        if self.fail_init.load(Ordering::Acquire) {
            return Err(Error::Exhausted);
        }
        Ok(())
    }

    fn connect(&self, stack: &mut Stack, sk: SocketKey, addr: SockAddr) -> Result<()> {
        self.record(Event::Connect(sk, addr));
        let sock = stack.get_mut(sk).ok_or(Error::BadKey)?;
        sock.daddr = addr.addr;
        sock.dport = addr.port;

        let state = if self.instant_connect.load(Ordering::Acquire) {
            TcpState::Established
        } else {
            TcpState::SynSent
        };
        stack.set_state(sk, state);
        Ok(())
    }

    fn close(&self, stack: &mut Stack, sk: SocketKey) {
        let (state, dead) = match stack.get(sk) {
            Some(sock) => (sock.state, sock.dead),
            None => return,
        };
        self.record(Event::Close { sk, dead });

        let next = match state {
            TcpState::Established if self.graceful_close.load(Ordering::Acquire) => TcpState::FinWait1,
            TcpState::CloseWait if self.graceful_close.load(Ordering::Acquire) => TcpState::LastAck,
            _ => TcpState::Closed,
        };
        stack.set_state(sk, next);
    }

    fn accept(&self, stack: &mut Stack, sk: SocketKey, _: MsgFlags) -> Result<Option<SocketKey>> {
        let listener = stack.get_mut(sk).ok_or(Error::BadKey)?;
        if listener.state != TcpState::Listen {
            return Err(Error::InvalidArgument);
        }

        let skb = match listener.receive_queue.pop_front() {
            Some(skb) => skb,
            None => return Ok(None),
        };
        listener.ack_backlog = listener.ack_backlog.saturating_sub(1);

        let child = skb.owner();
        stack.free_buffer(skb);
        if let Some(child) = child {
            self.record(Event::Accept(child));
        }
        Ok(child)
    }

    fn shutdown(&self, _: &mut Stack, sk: SocketKey, how: Shutdown) {
        self.record(Event::Shutdown(sk, how));
    }

    fn select(&self, stack: &Stack, sk: SocketKey, kind: Select) -> bool {
        let sock = match stack.get(sk) {
            Some(sock) => sock,
            None => return false,
        };

        match kind {
            Select::Read => !sock.receive_queue.is_empty(),
            Select::Write => sock.wmem_alloc() < sock.sndbuf,
            Select::Except => sock.err.is_some(),
        }
    }

    fn ioctl(&self, _: &mut Stack, sk: SocketKey, cmd: u32, arg: &mut [u8]) -> Result<usize> {
        self.record(Event::Ioctl(sk, cmd));
        if cmd == Self::IOCTL_ECHO {
            Ok(arg.len())
        } else {
            Err(Error::InvalidArgument)
        }
    }

    fn sendto(&self, stack: &mut Stack, sk: SocketKey, data: &[u8], _: MsgFlags, _: Option<SockAddr>)
        -> Result<usize>
    {
        let skb = stack.try_alloc_buffer(sk, data.to_vec(), Direction::Write)?;
        stack.get_mut(sk).ok_or(Error::BadKey)?.write_queue.push_back(skb);
        self.record(Event::Send(sk, data.len()));
        Ok(data.len())
    }

    fn recvfrom(&self, stack: &mut Stack, sk: SocketKey, buf: &mut [u8], flags: MsgFlags)
        -> Result<(usize, Option<SockAddr>)>
    {
        let sock = stack.get_mut(sk).ok_or(Error::BadKey)?;
        let skb = match sock.receive_queue.pop_front() {
            Some(skb) => skb,
            None if sock.shutdown.contains(Shutdown::RCV) => return Ok((0, None)),
            None if sock.transport() == Transport::Tcp
                && matches!(sock.state, TcpState::Closed | TcpState::CloseWait) => return Ok((0, None)),
            None => return Err(Error::WouldBlock),
        };

        let len = skb.len().min(buf.len());
        buf[..len].copy_from_slice(&skb.payload[..len]);
        sock.stamp = skb.stamp;
        let from = skb.remote;

        if flags.contains(MsgFlags::PEEK) {
            sock.receive_queue.push_front(skb);
        } else {
            stack.free_buffer(skb);
        }

        Ok((len, from))
    }

    fn timer(&self, _: &mut Stack, sk: SocketKey, kind: TimerKind) {
        self.record(Event::Timer(sk, kind));
    }
}
