//! Creation and teardown of socks.
//!
//! A sock is freed only once it is dead (no user socket refers to it) and every buffer charged to
//! it was returned. [`Stack::destroy`] drains what the sock itself still holds. Buffers that are
//! out of its reach, such as packets sitting in a device queue or already handed to another
//! subsystem, keep it alive. In that case destruction is deferred: the sock is marked and
//! re-checked periodically, and freed by the last [`Stack::free_buffer`] that brings its counters
//! to zero.
//!
//! [`Stack::destroy`]: ../stack/struct.Stack.html#method.destroy
//! [`Stack::free_buffer`]: ../stack/struct.Stack.html#method.free_buffer
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::proto::Transport;
use crate::sock::{Direction, SkBuff, Sock, SockType, SocketKey, TcpState, WaitQueue};
use crate::stack::Stack;
use crate::task::Task;
use crate::time::Instant;
use crate::wire::ip_protocol;

mod timer;

pub use self::timer::TimerKind;
pub(crate) use self::timer::Timers;

impl Stack {
    /// Allocate and initialize a sock for a new socket.
    ///
    /// Stream and sequenced packet sockets are served by tcp, datagram sockets by udp. Raw and
    /// packet sockets require a privileged caller and a protocol number, under which they are
    /// registered right away.
    pub(crate) fn create_sock(
        &mut self,
        task: &Task,
        kind: SockType,
        protocol: u16,
        wait: Option<Arc<WaitQueue>>,
    ) -> Result<SocketKey> {
        let (transport, protocol) = match kind {
            SockType::Stream | SockType::SeqPacket => {
                if protocol != 0 && protocol != ip_protocol::TCP {
                    return Err(Error::ProtocolNotSupported);
                }
                (Transport::Tcp, ip_protocol::TCP)
            },
            SockType::Dgram => {
                if protocol != 0 && protocol != ip_protocol::UDP {
                    return Err(Error::ProtocolNotSupported);
                }
                (Transport::Udp, ip_protocol::UDP)
            },
            SockType::Raw | SockType::Packet => {
                if !task.is_privileged() {
                    return Err(Error::PermissionDenied);
                }
                if protocol == 0 {
                    return Err(Error::ProtocolNotSupported);
                }
                let transport = if kind == SockType::Raw { Transport::Raw } else { Transport::Packet };
                (transport, protocol)
            },
            _ => return Err(Error::SocketTypeNotSupported),
        };

        let ops = self.protocol(transport).ok_or(Error::ProtocolNotSupported)?;
        let eager = matches!(transport, Transport::Raw | Transport::Packet);

        let mut sk = Sock::new(&self.config, kind, transport, protocol);
        sk.wait = wait;
        sk.reuse = eager;
        let key = SocketKey { key: self.socks.insert(sk) };

        if eager {
            self.register(key, protocol)?;
        }

        if let Err(err) = ops.init(self, key) {
            net_debug!("lifecycle: {} init of {:?} failed: {}", transport.name(), key, err);
            if let Some(sk) = self.get_mut(key) {
                sk.dead = true;
            }
            self.destroy(key);
            return Err(err);
        }

        net_debug!("lifecycle: created {:?} ({:?}, {})", key, kind, transport.name());
        Ok(key)
    }

    /// Tear a sock down.
    ///
    /// Unlinks it from the registry, cancels its timers and frees every buffer it holds. If the
    /// sock is dead, children still queued on it are closed and its pair is closed. It is freed
    /// right away if dead with no memory charged. Otherwise destruction is deferred and retried
    /// when the destroy timer fires. Calling this again on a sock pending destruction is
    /// harmless.
    pub fn destroy(&mut self, key: SocketKey) {
        let dead = match self.get_mut(key) {
            Some(sk) => {
                sk.inuse = true;
                sk.dead
            },
            None => {
                net_error!("lifecycle: destroy of stale sock {:?}", key);
                return;
            },
        };

        if !dead {
            if let Some(sk) = self.get(key) {
                sk.callbacks.write_space(sk);
            }
        }

        self.unregister(key);
        self.timers.cancel_all(key);

        let (partial, write_queue, receive_queue, send_head, back_log) = match self.get_mut(key) {
            Some(sk) => (
                sk.partial.take(),
                core::mem::take(&mut sk.write_queue),
                if dead { core::mem::take(&mut sk.receive_queue) } else { Default::default() },
                core::mem::take(&mut sk.send_head),
                core::mem::take(&mut sk.back_log),
            ),
            None => return,
        };

        if let Some(skb) = partial {
            self.free_buffer(skb);
        }

        for skb in write_queue {
            self.free_buffer(skb);
        }

        for skb in receive_queue {
            // A listener's queue references its not yet accepted children.
            if let Some(child) = skb.owner.filter(|&owner| owner != key) {
                self.close_orphan(child);
            }
            self.free_buffer(skb);
        }

        for skb in send_head {
            // Unlinked from the transmit queues by freeing.
            self.free_buffer(skb);
        }

        for skb in back_log {
            self.free_buffer(skb);
        }

        if let Some(pair) = self.get_mut(key).and_then(|sk| sk.pair.take()) {
            self.close_orphan(pair);
        }

        // The sock may have been freed by the last buffer above.
        let (dead, released) = match self.get(key) {
            Some(sk) => (sk.dead, sk.memory_released()),
            None => return,
        };

        if dead && released {
            self.free_sock(key);
            return;
        }

        let delay = self.config.destroy_delay;
        if let Some(sk) = self.get_mut(key) {
            net_debug!("lifecycle: deferring destruction of {:?} (rmem {}, wmem {})",
                key, sk.rmem_alloc, sk.wmem_alloc);
            sk.destroy = true;
            sk.ack_backlog = 0;
            sk.inuse = false;
        }
        self.stats.deferred += 1;
        self.arm_timer(key, TimerKind::Destroy, delay);
    }

    /// Return a buffer, releasing its memory charge.
    ///
    /// Frees the owner if it was pending destruction and this was its last charged buffer.
    pub fn free_buffer(&mut self, mut skb: SkBuff) {
        self.unlink(&mut skb);

        let (owner, direction) = match (skb.owner, skb.charge) {
            (Some(owner), Some(direction)) => (owner, direction),
            _ => return,
        };

        let sk = match self.get_mut(owner) {
            Some(sk) => sk,
            None => return,
        };

        sk.uncharge(direction, skb.truesize);
        if sk.destroy && sk.dead && sk.memory_released() {
            self.timers.cancel(owner, TimerKind::Destroy);
            self.free_sock(owner);
            return;
        }

        if direction == Direction::Write && !sk.destroy {
            sk.callbacks.write_space(sk);
        }
    }

    /// End a socket call's exclusive use of a sock.
    ///
    /// Packets that arrived meanwhile are processed from the backlog. A dead sock that reached
    /// `Closed` is destroyed.
    pub fn release_sock(&mut self, key: SocketKey) {
        let ops = match self.ops(key) {
            Ok(ops) => ops,
            Err(_) => return,
        };

        loop {
            let skb = match self.get_mut(key) {
                Some(sk) => {
                    sk.inuse = true;
                    sk.back_log.pop_front()
                },
                None => return,
            };

            match skb {
                Some(skb) => ops.backlog_rcv(self, key, skb),
                None => break,
            }
        }

        let destroy = match self.get_mut(key) {
            Some(sk) => {
                sk.inuse = false;
                sk.dead && sk.state == TcpState::Closed && !sk.destroy
            },
            None => return,
        };

        if destroy {
            self.destroy(key);
        }
    }

    /// Fire every timer expired at `now`.
    pub fn poll(&mut self, now: Instant) {
        self.now = now;
        for (key, kind) in self.timers.expired(now) {
            match kind {
                TimerKind::Destroy => self.destroy_timer(key),
                kind => match self.ops(key) {
                    Ok(ops) => ops.timer(self, key, kind),
                    Err(_) => net_debug!("lifecycle: {:?} timer of freed {:?}", kind, key),
                },
            }
        }
    }

    /// Re-check a sock whose destruction was deferred.
    fn destroy_timer(&mut self, key: SocketKey) {
        let limit = self.config.destroy_retries;
        let (dead, released, checks) = match self.get_mut(key) {
            Some(sk) if sk.destroy => {
                sk.destroy_checks += 1;
                (sk.dead, sk.memory_released(), sk.destroy_checks)
            },
            _ => return,
        };

        if dead && released {
            self.destroy(key);
            return;
        }

        if checks >= limit {
            if let Some(sk) = self.get(key) {
                net_error!("lifecycle: giving up on {:?} after {} checks (rmem {}, wmem {})",
                    key, checks, sk.rmem_alloc, sk.wmem_alloc);
            }
            self.stats.abandoned.push(key);
            return;
        }

        let delay = self.config.destroy_delay;
        self.arm_timer(key, TimerKind::Destroy, delay);
    }

    /// Close a sock no user socket will claim anymore.
    fn close_orphan(&mut self, key: SocketKey) {
        let ops = match self.ops(key) {
            Ok(ops) => ops,
            Err(_) => return,
        };

        match self.get_mut(key) {
            Some(sk) if !sk.destroy => sk.dead = true,
            _ => return,
        }

        net_debug!("lifecycle: closing orphan {:?}", key);
        ops.close(self, key);
        self.release_sock(key);
    }

    fn free_sock(&mut self, key: SocketKey) {
        self.unregister(key);
        self.timers.cancel_all(key);
        if self.socks.remove(key.key).is_some() {
            self.stats.freed += 1;
            net_debug!("lifecycle: freed {:?}", key);
        }
    }
}
