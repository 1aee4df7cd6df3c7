use crate::proto::Transport;
use crate::registry::FourTuple;
use crate::sock::{Direction, SkBuff, SocketKey};
use crate::wire::SockAddr;
use super::Stack;

/// The outcome of handing an inbound packet to the socket table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Queued to the sock, via its transport.
    Delivered(SocketKey),
    /// The sock was found but its receive buffer is full.
    Dropped(SocketKey),
    /// No sock accepts the packet.
    NoSocket,
}

impl Stack {
    /// Demultiplex a unicast packet to the best matching sock.
    ///
    /// The payload is charged to the sock's receive memory and handed to the transport's
    /// `receive` hook. A packet nobody accepts is returned to the caller as `NoSocket`, answering
    /// it (with a reset or an ICMP error) is the transport's business.
    pub fn deliver(&mut self, transport: Transport, tuple: FourTuple, payload: Vec<u8>) -> Delivery {
        let key = match self.lookup(transport, tuple) {
            Some(key) => key,
            None => {
                net_trace!("deliver: no {} socket for {:?}", transport.name(), tuple);
                return Delivery::NoSocket;
            },
        };

        if self.receive_one(key, tuple, payload) {
            Delivery::Delivered(key)
        } else {
            Delivery::Dropped(key)
        }
    }

    /// Deliver a copy of a packet to every accepting sock of the chain, for raw, broadcast and
    /// multicast traffic.
    ///
    /// Raw socks are registered under their protocol number, pass it as `tuple.local_port`. The
    /// remote port is only compared when `match_remote_port` is set. Returns the socks that
    /// received a copy.
    pub fn deliver_fanout(
        &mut self,
        transport: Transport,
        tuple: FourTuple,
        payload: &[u8],
        match_remote_port: bool,
    ) -> Vec<SocketKey> {
        let remote_port = if match_remote_port { Some(tuple.remote_port) } else { None };
        let targets: Vec<SocketKey> = match self.registry(transport) {
            Some(registry) => registry
                .exact_matches(&self.socks, tuple.local_port, tuple.local, tuple.remote, remote_port)
                .collect(),
            None => return Vec::new(),
        };

        targets.into_iter()
            .filter(|&key| self.receive_one(key, tuple, payload.to_vec()))
            .collect()
    }

    fn receive_one(&mut self, key: SocketKey, tuple: FourTuple, payload: Vec<u8>) -> bool {
        let ops = match self.ops(key) {
            Ok(ops) => ops,
            Err(_) => return false,
        };

        let fits = match self.get(key) {
            Some(sk) => sk.rmem_alloc + payload.len() + SkBuff::HEADER_SIZE <= sk.rcvbuf,
            None => false,
        };

        if !fits {
            net_debug!("deliver: receive buffer of {:?} full, dropping", key);
            return false;
        }

        let mut skb = self.alloc_buffer(Some(key), payload, Direction::Read);
        skb.stamp = Some(self.now);
        skb.remote = Some(SockAddr::new(tuple.remote, tuple.remote_port));
        ops.receive(self, key, skb);
        true
    }
}
