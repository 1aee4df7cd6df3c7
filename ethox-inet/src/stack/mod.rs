//! The guarded state of the socket layer.
//!
//! A [`Stack`] owns the sock arena, the registry of every transport, the armed timers and the
//! transmit queues. The [`Inet`] context keeps it behind its mutex. Transports receive it in
//! every hook and the asynchronous (packet arrival, timer) side of the system operates on it
//! through [`Inet::with`].
//!
//! [`Stack`]: struct.Stack.html
//! [`Inet`]: ../inet/struct.Inet.html
//! [`Inet::with`]: ../inet/struct.Inet.html#method.with
use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::lifecycle::{Timers, TimerKind};
use crate::managed::SlotMap;
use crate::proto::{Protocol, Transport};
use crate::registry::{FourTuple, PortCursor, Registry};
use crate::sock::{BufferId, Direction, Link, SkBuff, Sock, SocketKey, TcpState};
use crate::time::{Duration, Instant};
use crate::wire::SockAddr;

mod deliver;

pub use self::deliver::Delivery;

/// The state behind the socket layer's mutex.
pub struct Stack {
    pub(crate) config: Config,
    pub(crate) socks: SlotMap<Sock>,
    descriptors: [Option<Descriptor>; 4],
    pub(crate) cursor: PortCursor,
    pub(crate) timers: Timers,
    links: Links,
    next_buffer: u64,
    pub(crate) now: Instant,
    pub(crate) stats: Stats,
}

/// A transport installed into the stack.
struct Descriptor {
    ops: Arc<dyn Protocol>,
    registry: Registry,
}

#[derive(Debug, Default)]
struct Links {
    device: VecDeque<BufferId>,
    resolve: VecDeque<BufferId>,
}

/// Counters of the lifecycle manager.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Socks freed so far.
    pub freed: u64,
    /// Destructions deferred because buffers were still charged.
    pub deferred: u64,
    /// Socks deferred destruction gave up on, they stay allocated.
    pub abandoned: Vec<SocketKey>,
}

impl Stack {
    pub(crate) fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Stack {
            config,
            socks: SlotMap::new(),
            descriptors: [None, None, None, None],
            cursor: PortCursor::default(),
            timers: Timers::default(),
            links: Links::default(),
            next_buffer: 0,
            now: Instant::default(),
            stats: Stats::default(),
        })
    }

    /// Install the transport serving `transport` sockets.
    pub(crate) fn install(&mut self, transport: Transport, ops: Arc<dyn Protocol>) {
        self.descriptors[transport.index()] = Some(Descriptor {
            ops,
            registry: Registry::new(self.config.table_size),
        });
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The time of the last poll.
    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn get(&self, key: SocketKey) -> Option<&Sock> {
        self.socks.get(key.key)
    }

    pub fn get_mut(&mut self, key: SocketKey) -> Option<&mut Sock> {
        self.socks.get_mut(key.key)
    }

    /// Iterate all socks, including dead ones awaiting destruction.
    pub fn socks(&self) -> impl Iterator<Item=(SocketKey, &Sock)> + '_ {
        self.socks.iter().map(|(key, sk)| (SocketKey { key }, sk))
    }

    /// The number of allocated socks.
    pub fn len(&self) -> usize {
        self.socks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.socks.is_empty()
    }

    pub fn registry(&self, transport: Transport) -> Option<&Registry> {
        self.descriptors[transport.index()].as_ref().map(|desc| &desc.registry)
    }

    pub fn protocol(&self, transport: Transport) -> Option<Arc<dyn Protocol>> {
        self.descriptors[transport.index()].as_ref().map(|desc| desc.ops.clone())
    }

    /// The hooks of the transport owning a sock.
    pub(crate) fn ops(&self, key: SocketKey) -> Result<Arc<dyn Protocol>> {
        let sk = self.get(key).ok_or(Error::BadKey)?;
        self.protocol(sk.transport()).ok_or(Error::ProtocolNotSupported)
    }

    /// Find the sock an inbound packet belongs to.
    pub fn lookup(&self, transport: Transport, tuple: FourTuple) -> Option<SocketKey> {
        self.registry(transport)?.lookup_best(&self.socks, tuple)
    }

    /// Pick an unused local port of a transport, see [`Registry::allocate`].
    ///
    /// [`Registry::allocate`]: ../registry/struct.Registry.html#method.allocate
    pub fn allocate_port(&mut self, transport: Transport, hint: u16) -> Result<u16> {
        let desc = self.descriptors[transport.index()].as_ref()
            .ok_or(Error::ProtocolNotSupported)?;
        desc.registry.allocate(
            &self.socks,
            &mut self.cursor,
            hint,
            self.config.reserved_ports,
            self.config.probe_limit)
    }

    /// Link a sock into the registry of its transport under `port`.
    pub(crate) fn register(&mut self, key: SocketKey, port: u16) -> Result<()> {
        let transport = self.get(key).ok_or(Error::BadKey)?.transport();
        let desc = self.descriptors[transport.index()].as_mut()
            .ok_or(Error::ProtocolNotSupported)?;
        desc.registry.insert(&mut self.socks, key, port)
    }

    /// Unlink a sock from the registry, a no-op for unlinked socks.
    pub(crate) fn unregister(&mut self, key: SocketKey) -> bool {
        let (transport, port) = match self.get(key) {
            Some(sk) => (sk.transport(), sk.num),
            None => return false,
        };

        match self.descriptors[transport.index()].as_mut() {
            Some(desc) => desc.registry.remove(key, port),
            None => false,
        }
    }

    /// Create the sock of an incoming connection on a listener.
    ///
    /// The child shares the listener's transport and local address, is connected to `remote` and
    /// starts in `SynRecv`. It is registered under the listener's port, so that the following
    /// packets of the connection are demultiplexed to it.
    pub fn create_child(&mut self, listener: SocketKey, remote: SockAddr) -> Result<SocketKey> {
        let parent = self.get(listener).ok_or(Error::BadKey)?;
        let mut child = Sock::new(&self.config, parent.kind(), parent.transport(), parent.protocol());
        child.saddr = parent.saddr;
        child.daddr = remote.addr;
        child.dport = remote.port;
        child.state = TcpState::SynRecv;
        child.sndbuf = parent.sndbuf;
        child.rcvbuf = parent.rcvbuf;
        child.linger = parent.linger;
        child.keepopen = parent.keepopen;
        child.callbacks = parent.callbacks.clone();
        let port = parent.num;

        let key = SocketKey { key: self.socks.insert(child) };
        self.register(key, port)?;
        net_debug!("stack: child {:?} of {:?} for {}", key, listener, remote);
        Ok(key)
    }

    /// Allocate a buffer charged to `owner`, regardless of its buffer limits.
    pub fn alloc_buffer(&mut self, owner: Option<SocketKey>, payload: Vec<u8>, direction: Direction)
        -> SkBuff
    {
        let id = BufferId(self.next_buffer);
        self.next_buffer += 1;
        let truesize = payload.len() + SkBuff::HEADER_SIZE;

        let charge = owner
            .and_then(|key| self.socks.get_mut(key.key))
            .map(|sk| sk.charge(direction, truesize))
            .map(|()| direction);

        SkBuff {
            id,
            owner,
            charge,
            link: None,
            truesize,
            payload,
            stamp: None,
            remote: None,
        }
    }

    /// Allocate a buffer charged to `owner` if it fits into its send or receive buffer.
    pub fn try_alloc_buffer(&mut self, owner: SocketKey, payload: Vec<u8>, direction: Direction)
        -> Result<SkBuff>
    {
        let sk = self.get(owner).ok_or(Error::BadKey)?;
        let truesize = payload.len() + SkBuff::HEADER_SIZE;
        let (used, limit) = match direction {
            Direction::Read => (sk.rmem_alloc, sk.rcvbuf),
            Direction::Write => (sk.wmem_alloc, sk.sndbuf),
        };

        if used + truesize > limit {
            return Err(Error::WouldBlock);
        }

        Ok(self.alloc_buffer(Some(owner), payload, direction))
    }

    /// Append a buffer to the receive queue and signal `data_ready`.
    pub fn queue_receive(&mut self, key: SocketKey, skb: SkBuff) {
        let len = skb.len();
        match self.socks.get_mut(key.key) {
            Some(sk) => sk.receive_queue.push_back(skb),
            None => return self.free_buffer(skb),
        }

        if let Some(sk) = self.get(key) {
            sk.callbacks.data_ready(sk, len);
        }
    }

    /// Change the connection state and signal `state_change`.
    pub fn set_state(&mut self, key: SocketKey, state: TcpState) {
        if let Some(sk) = self.socks.get_mut(key.key) {
            net_trace!("stack: {:?} {:?} -> {:?}", key, sk.state, state);
            sk.state = state;
            sk.callbacks.state_change(sk);
        }
    }

    /// Signal `state_change` without a transition.
    pub fn state_change(&self, key: SocketKey) {
        if let Some(sk) = self.get(key) {
            sk.callbacks.state_change(sk);
        }
    }

    /// Latch an asynchronous error and signal `error_report`.
    pub fn report_error(&mut self, key: SocketKey, err: Error) {
        if let Some(sk) = self.socks.get_mut(key.key) {
            sk.err = Some(err);
            sk.callbacks.error_report(sk);
        }
    }

    /// Consume the latched error of a sock.
    pub fn take_error(&mut self, key: SocketKey) -> Option<Error> {
        self.socks.get_mut(key.key)?.err.take()
    }

    /// Put a buffer onto one of the transmit queues.
    pub fn link(&mut self, skb: &mut SkBuff, link: Link) {
        self.unlink(skb);
        match link {
            Link::Device => self.links.device.push_back(skb.id),
            Link::Resolve => self.links.resolve.push_back(skb.id),
        }
        skb.link = Some(link);
    }

    /// Take a buffer off the transmit queue it is linked into.
    pub fn unlink(&mut self, skb: &mut SkBuff) {
        let queue = match skb.link.take() {
            Some(Link::Device) => &mut self.links.device,
            Some(Link::Resolve) => &mut self.links.resolve,
            None => return,
        };

        if let Some(position) = queue.iter().position(|id| *id == skb.id) {
            queue.remove(position);
        }
    }

    /// The buffers waiting on a transmit queue, in order.
    pub fn linked(&self, link: Link) -> &VecDeque<BufferId> {
        match link {
            Link::Device => &self.links.device,
            Link::Resolve => &self.links.resolve,
        }
    }

    /// Arm a timer of a sock to expire `after` the last poll.
    pub fn arm_timer(&mut self, key: SocketKey, kind: TimerKind, after: Duration) {
        self.timers.arm(key, kind, self.now + after);
    }

    pub fn cancel_timer(&mut self, key: SocketKey, kind: TimerKind) -> bool {
        self.timers.cancel(key, kind)
    }

    /// When an armed timer of a sock expires.
    pub fn timer_expiry(&self, key: SocketKey, kind: TimerKind) -> Option<Instant> {
        self.timers.expiry(key, kind)
    }

    /// The earliest expiry of any armed timer.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.timers.next_expiry()
    }
}
