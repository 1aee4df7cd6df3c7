//! The seam between the socket layer and the transports.
//!
//! A transport (tcp, udp, raw, packet) implements [`Protocol`] and is installed into the
//! [`Inet`] context at construction. The socket layer calls its hooks while holding the one
//! guard of the stack and passes that [`Stack`] in, so a hook may freely inspect and modify socks,
//! queue buffers or arm timers. Hooks must never block. They report "not yet" with a
//! `WouldBlock` error or `None` and the socket layer does the sleeping.
//!
//! Every hook has a default. For the optional operations it reports `NotSupported`, which is what
//! the user sees for a transport lacking the operation.
//!
//! [`Protocol`]: trait.Protocol.html
//! [`Inet`]: ../inet/struct.Inet.html
//! [`Stack`]: ../stack/struct.Stack.html
use crate::error::{Error, Result};
use crate::lifecycle::TimerKind;
use crate::sock::{MsgFlags, Shutdown, SkBuff, SocketKey};
use crate::stack::Stack;
use crate::wire::SockAddr;

/// The transports a socket can be served by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Transport {
    Tcp,
    Udp,
    Raw,
    Packet,
}

/// What a `select` call waits for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Select {
    Read,
    Write,
    Except,
}

/// The hooks of a transport.
pub trait Protocol: Send + Sync {
    /// Transport specific setup of a fresh sock.
    ///
    /// A failure aborts the creation and the sock is destroyed again.
    fn init(&self, _: &mut Stack, _: SocketKey) -> Result<()> {
        Ok(())
    }

    /// Begin a connection to `addr`.
    ///
    /// Should move the sock into `SynSent` (or directly into `Established` for connectionless
    /// transports). The socket layer waits for the handshake to complete.
    fn connect(&self, _: &mut Stack, _: SocketKey, _addr: SockAddr) -> Result<()> {
        Err(Error::NotSupported)
    }

    /// Close the sock, initiating an orderly shutdown if possible.
    ///
    /// Called on release of the user socket and on children a dead listener still queued. The
    /// transport decides the resulting state. A sock that reached `Closed` while dead is
    /// destroyed by the following [`Stack::release_sock`].
    ///
    /// [`Stack::release_sock`]: ../stack/struct.Stack.html#method.release_sock
    fn close(&self, stack: &mut Stack, sk: SocketKey) {
        stack.set_state(sk, crate::sock::TcpState::Closed);
    }

    /// Take the next pending connection from a listening sock.
    ///
    /// Returns `Ok(None)` if no connection is pending yet.
    fn accept(&self, _: &mut Stack, _: SocketKey, _: MsgFlags) -> Result<Option<SocketKey>> {
        Err(Error::NotSupported)
    }

    /// Directions were shut down, the socket layer already recorded them on the sock.
    fn shutdown(&self, _: &mut Stack, _: SocketKey, _how: Shutdown) { }

    /// Readiness of the sock, `false` when the transport does not tell.
    fn select(&self, _: &Stack, _: SocketKey, _: Select) -> bool {
        false
    }

    /// Transport specific control requests.
    fn ioctl(&self, _: &mut Stack, _: SocketKey, _cmd: u32, _arg: &mut [u8]) -> Result<usize> {
        Err(Error::InvalidArgument)
    }

    /// Options of a level other than `SOL_SOCKET`.
    fn setsockopt(&self, _: &mut Stack, _: SocketKey, _level: i32, _name: i32, _value: &[u8])
        -> Result<()>
    {
        Err(Error::NotSupported)
    }

    /// Options of a level other than `SOL_SOCKET`.
    fn getsockopt(&self, _: &mut Stack, _: SocketKey, _level: i32, _name: i32, _value: &mut [u8])
        -> Result<usize>
    {
        Err(Error::NotSupported)
    }

    /// Queue data for sending.
    ///
    /// Reports `WouldBlock` when no send buffer space is available.
    fn sendto(&self, _: &mut Stack, _: SocketKey, _data: &[u8], _: MsgFlags, _to: Option<SockAddr>)
        -> Result<usize>
    {
        Err(Error::NotSupported)
    }

    /// Dequeue received data.
    ///
    /// Reports `WouldBlock` when nothing is queued yet and `Ok(0)` at end of stream.
    fn recvfrom(&self, _: &mut Stack, _: SocketKey, _buf: &mut [u8], _: MsgFlags)
        -> Result<(usize, Option<SockAddr>)>
    {
        Err(Error::NotSupported)
    }

    /// A demultiplexed packet for this sock.
    ///
    /// The default defers to the backlog while a socket call is operating on the sock and
    /// otherwise hands the buffer to [`backlog_rcv`].
    ///
    /// [`backlog_rcv`]: #method.backlog_rcv
    fn receive(&self, stack: &mut Stack, sk: SocketKey, skb: SkBuff) {
        match stack.get_mut(sk) {
            Some(sock) if sock.inuse => sock.back_log.push_back(skb),
            Some(_) => self.backlog_rcv(stack, sk, skb),
            None => stack.free_buffer(skb),
        }
    }

    /// Process a packet, either directly or from the backlog on `release_sock`.
    ///
    /// The default appends it to the receive queue and signals `data_ready`.
    fn backlog_rcv(&self, stack: &mut Stack, sk: SocketKey, skb: SkBuff) {
        stack.queue_receive(sk, skb);
    }

    /// A transport timer armed with [`Stack::arm_timer`] expired.
    ///
    /// [`Stack::arm_timer`]: ../stack/struct.Stack.html#method.arm_timer
    fn timer(&self, _: &mut Stack, _: SocketKey, _: TimerKind) { }
}

impl Transport {
    pub const ALL: [Transport; 4] = [Transport::Tcp, Transport::Udp, Transport::Raw, Transport::Packet];

    pub(crate) fn index(self) -> usize {
        match self {
            Transport::Tcp => 0,
            Transport::Udp => 1,
            Transport::Raw => 2,
            Transport::Packet => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
            Transport::Raw => "raw",
            Transport::Packet => "packet",
        }
    }
}
