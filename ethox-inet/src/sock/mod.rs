//! The transport endpoint underneath a socket.
//!
//! A [`Sock`] is the state shared by the socket layer and the transport that owns it: its
//! identity in the registry, the connection state, the buffer queues and the accounting of their
//! memory. It lives in the arena of the [`Stack`] and is referenced by [`SocketKey`].
//!
//! [`Sock`]: struct.Sock.html
//! [`Stack`]: ../stack/struct.Stack.html
//! [`SocketKey`]: struct.SocketKey.html
use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::managed::Key;
use crate::proto::Transport;
use crate::time::{Duration, Instant};
use crate::wire::{Ipv4Address, AF_INET};

mod buffer;
mod wait;

pub use self::buffer::{BufferId, Direction, Link, SkBuff};
pub use self::wait::{Callbacks, WaitQueue, WakeUp};

/// The index of a sock.
///
/// Useful for storing in other structs to reference the sock at another point in time. Note
/// that the index will be invalidated when the sock itself is freed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SocketKey {
    pub(crate) key: Key,
}

enum_with_unknown! {
    /// The type of a socket, as requested at creation.
    pub enum SockType(u16) {
        /// Reliable byte stream.
        Stream = 1,
        /// Unreliable datagrams.
        Dgram = 2,
        /// Raw IP packets of one protocol.
        Raw = 3,
        /// Reliable datagrams.
        Rdm = 4,
        /// Reliable sequenced datagrams.
        SeqPacket = 5,
        /// Raw link level packets.
        Packet = 10,
    }
}

/// The transport connection state of a sock.
///
/// The discriminants follow the historical numbering. Some socket calls compare states by their
/// order, see [`past_fin_wait2`].
///
/// [`past_fin_wait2`]: #method.past_fin_wait2
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TcpState {
    Established = 1,
    SynSent = 2,
    SynRecv = 3,
    FinWait1 = 4,
    FinWait2 = 5,
    TimeWait = 6,
    Closed = 7,
    CloseWait = 8,
    LastAck = 9,
    Listen = 10,
    Closing = 11,
}

bitflags::bitflags! {
    /// Directions shut down on a sock.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Shutdown: u8 {
        const RCV = 1;
        const SEND = 2;
    }
}

bitflags::bitflags! {
    /// Flags of a single socket call.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MsgFlags: u32 {
        const OOB = 0x01;
        const PEEK = 0x02;
        const DONTROUTE = 0x04;
        /// Fail with `WouldBlock` instead of sleeping.
        const NONBLOCK = 0x40;
    }
}

/// A transport endpoint.
///
/// Fields a transport is expected to maintain are public. The registry identity (the bound port)
/// and the memory counters are only changed through the [`Stack`] so that the table and the
/// accounting stay consistent.
///
/// [`Stack`]: ../stack/struct.Stack.html
pub struct Sock {
    kind: SockType,
    transport: Transport,
    protocol: u16,
    pub(crate) num: u16,

    /// The bound local address, unspecified for the wildcard.
    pub saddr: Ipv4Address,
    /// The connected remote address, unspecified if not connected.
    pub daddr: Ipv4Address,
    /// The connected remote port, 0 if not connected.
    pub dport: u16,

    pub state: TcpState,
    /// A pending asynchronous error, consumed by the next socket call that reports it.
    pub err: Option<Error>,
    /// Allow sharing the local port, `SO_REUSEADDR`.
    pub reuse: bool,
    /// The user handle is gone and the sock is awaiting destruction.
    pub dead: bool,
    /// A socket call currently operates on the sock, packets go to the backlog.
    pub inuse: bool,
    pub(crate) destroy: bool,
    pub(crate) destroy_checks: u32,

    pub(crate) rmem_alloc: usize,
    pub(crate) wmem_alloc: usize,
    pub sndbuf: usize,
    pub rcvbuf: usize,

    pub receive_queue: VecDeque<SkBuff>,
    pub write_queue: VecDeque<SkBuff>,
    /// Packets that arrived while the sock was in use.
    pub back_log: VecDeque<SkBuff>,
    /// Sent buffers kept for retransmission.
    pub send_head: VecDeque<SkBuff>,
    /// A partially filled outgoing buffer.
    pub partial: Option<SkBuff>,

    /// A child handed over by `accept` but not yet claimed, or a socketpair peer.
    pub pair: Option<SocketKey>,
    pub ack_backlog: u32,
    pub max_ack_backlog: u32,
    pub shutdown: Shutdown,

    pub linger: Option<Duration>,
    pub keepopen: bool,
    pub broadcast: bool,
    pub localroute: bool,
    pub urginline: bool,
    pub no_check: bool,
    pub debug: bool,
    pub priority: u8,
    pub mtu: u16,
    pub ttl: u8,
    /// Process (positive) or process group (negative) receiving asynchronous notifications.
    pub proc_owner: i32,
    /// Arrival time of the last packet handed to the user.
    pub stamp: Option<Instant>,

    pub(crate) callbacks: Arc<dyn Callbacks>,
    pub(crate) wait: Option<Arc<WaitQueue>>,
}

impl SockType {
    /// The transport serving this socket type.
    pub fn transport(self) -> Option<Transport> {
        match self {
            SockType::Stream | SockType::SeqPacket => Some(Transport::Tcp),
            SockType::Dgram => Some(Transport::Udp),
            SockType::Raw => Some(Transport::Raw),
            SockType::Packet => Some(Transport::Packet),
            _ => None,
        }
    }
}

impl TcpState {
    /// States in which the peer address is meaningful.
    pub fn is_connected(self) -> bool {
        matches!(self,
            TcpState::Established | TcpState::CloseWait
            | TcpState::FinWait1 | TcpState::FinWait2)
    }

    /// States of an orderly close still in progress.
    pub fn is_closing(self) -> bool {
        matches!(self, TcpState::FinWait1 | TcpState::Closing | TcpState::LastAck)
    }

    /// States of an opening handshake.
    pub fn is_handshake(self) -> bool {
        matches!(self, TcpState::SynSent | TcpState::SynRecv)
    }

    /// Any state after `FinWait2` in the numbering, all of which mean a connect attempt is over.
    pub fn past_fin_wait2(self) -> bool {
        self > TcpState::FinWait2
    }
}

impl Shutdown {
    /// Convert the `how` argument of `shutdown`, 0 for receive, 1 for send, 2 for both.
    pub fn from_how(how: i32) -> Result<Self> {
        match how {
            0 => Ok(Shutdown::RCV),
            1 => Ok(Shutdown::SEND),
            2 => Ok(Shutdown::RCV | Shutdown::SEND),
            _ => Err(Error::InvalidArgument),
        }
    }
}

impl Sock {
    pub(crate) fn new(config: &Config, kind: SockType, transport: Transport, protocol: u16) -> Self {
        Sock {
            kind,
            transport,
            protocol,
            num: 0,
            saddr: Ipv4Address::UNSPECIFIED,
            daddr: Ipv4Address::UNSPECIFIED,
            dport: 0,
            state: TcpState::Closed,
            err: None,
            reuse: false,
            dead: false,
            inuse: false,
            destroy: false,
            destroy_checks: 0,
            rmem_alloc: 0,
            wmem_alloc: 0,
            sndbuf: config.sndbuf,
            rcvbuf: config.rcvbuf,
            receive_queue: VecDeque::new(),
            write_queue: VecDeque::new(),
            back_log: VecDeque::new(),
            send_head: VecDeque::new(),
            partial: None,
            pair: None,
            ack_backlog: 0,
            max_ack_backlog: 0,
            shutdown: Shutdown::empty(),
            linger: None,
            keepopen: false,
            broadcast: false,
            localroute: false,
            urginline: false,
            no_check: false,
            debug: false,
            priority: 1,
            mtu: config.mtu,
            ttl: config.ttl,
            proc_owner: 0,
            stamp: None,
            callbacks: Arc::new(WakeUp),
            wait: None,
        }
    }

    /// The address family, always `AF_INET`.
    pub fn family(&self) -> u16 {
        AF_INET
    }

    pub fn kind(&self) -> SockType {
        self.kind
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// The protocol number chosen at creation.
    pub fn protocol(&self) -> u16 {
        self.protocol
    }

    /// The bound local port, or the protocol number for raw socks. 0 while unbound.
    pub fn port(&self) -> u16 {
        self.num
    }

    /// Bytes charged to the receive side.
    pub fn rmem_alloc(&self) -> usize {
        self.rmem_alloc
    }

    /// Bytes charged to the send side.
    pub fn wmem_alloc(&self) -> usize {
        self.wmem_alloc
    }

    /// Whether destruction was deferred because buffers are still charged.
    pub fn is_destroy_pending(&self) -> bool {
        self.destroy
    }

    /// Whether a user socket is attached to this sock.
    pub fn has_waiter(&self) -> bool {
        self.wait.is_some()
    }

    pub fn set_callbacks(&mut self, callbacks: Arc<dyn Callbacks>) {
        self.callbacks = callbacks;
    }

    /// Wake callers sleeping on this sock, unless it is dead.
    pub fn wake(&self) {
        if self.dead {
            return;
        }

        if let Some(wait) = &self.wait {
            wait.wake();
        }
    }

    pub(crate) fn charge(&mut self, direction: Direction, size: usize) {
        match direction {
            Direction::Read => self.rmem_alloc += size,
            Direction::Write => self.wmem_alloc += size,
        }
    }

    pub(crate) fn uncharge(&mut self, direction: Direction, size: usize) {
        match direction {
            Direction::Read => self.rmem_alloc = self.rmem_alloc.saturating_sub(size),
            Direction::Write => self.wmem_alloc = self.wmem_alloc.saturating_sub(size),
        }
    }

    pub(crate) fn memory_released(&self) -> bool {
        self.rmem_alloc == 0 && self.wmem_alloc == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_order() {
        assert!(!TcpState::FinWait2.past_fin_wait2());
        assert!(TcpState::TimeWait.past_fin_wait2());
        assert!(TcpState::Closed.past_fin_wait2());
        assert!(!TcpState::SynSent.past_fin_wait2());
        assert_eq!(TcpState::Listen as u8, 10);
    }

    #[test]
    fn state_classes() {
        assert!(TcpState::CloseWait.is_connected());
        assert!(!TcpState::SynRecv.is_connected());
        assert!(TcpState::LastAck.is_closing());
        assert!(TcpState::SynRecv.is_handshake());
    }

    #[test]
    fn shutdown_how() {
        assert_eq!(Shutdown::from_how(0), Ok(Shutdown::RCV));
        assert_eq!(Shutdown::from_how(2), Ok(Shutdown::all()));
        assert_eq!(Shutdown::from_how(3), Err(Error::InvalidArgument));
        assert_eq!(Shutdown::from_how(-1), Err(Error::InvalidArgument));
    }

    #[test]
    fn sock_type_codes() {
        assert_eq!(SockType::from(1), SockType::Stream);
        assert_eq!(SockType::from(10), SockType::Packet);
        assert_eq!(SockType::from(7), SockType::Unknown(7));
        assert_eq!(SockType::SeqPacket.transport(), Some(Transport::Tcp));
        assert_eq!(SockType::Rdm.transport(), None);
    }

    #[test]
    fn defaults() {
        let sk = Sock::new(&Config::default(), SockType::Stream, Transport::Tcp, 6);
        assert_eq!(sk.state, TcpState::Closed);
        assert_eq!(sk.sndbuf, 32767);
        assert_eq!(sk.mtu, 576);
        assert_eq!(sk.ttl, 64);
        assert_eq!(sk.priority, 1);
        assert_eq!(sk.port(), 0);
        assert!(sk.memory_released());
    }
}
