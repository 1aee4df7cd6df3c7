//! The per-transport table of bound socks.
//!
//! Each transport owns one [`Registry`], a fixed number of buckets indexed by the local port
//! modulo the table size. Within a bucket, socks bound to a specific local address come before
//! socks bound to the wildcard. The buckets only hold [`SocketKey`]s, the socks themselves live in
//! the arena of the [`Stack`] which is passed into every operation.
//!
//! Lookups implement the demultiplexing rules of inbound packets. A sock qualifies for a packet
//! if every part of its four-tuple that is set equals the packet's. Among the qualified socks,
//! [`lookup_best`] picks the one with the most set fields while [`lookup_exact`] returns them one
//! after the other for fan-out delivery.
//!
//! [`Registry`]: struct.Registry.html
//! [`SocketKey`]: ../sock/struct.SocketKey.html
//! [`Stack`]: ../stack/struct.Stack.html
//! [`lookup_best`]: struct.Registry.html#method.lookup_best
//! [`lookup_exact`]: struct.Registry.html#method.lookup_exact
use crate::error::{Error, Result};
use crate::managed::SlotMap;
use crate::sock::{Sock, SocketKey, TcpState};
use crate::wire::Ipv4Address;

mod port;
#[cfg(test)]
mod tests;

pub use self::port::PortCursor;

/// The hash table of one transport.
#[derive(Debug)]
pub struct Registry {
    buckets: Vec<Vec<SocketKey>>,
    inuse: usize,
    highest_inuse: usize,
}

/// A position within a bucket, for resuming a scan with [`Registry::lookup_exact`].
///
/// [`Registry::lookup_exact`]: struct.Registry.html#method.lookup_exact
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chain {
    bucket: usize,
    next: usize,
}

/// The addressing of an inbound packet, seen from this host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FourTuple {
    pub local: Ipv4Address,
    pub remote: Ipv4Address,
    pub local_port: u16,
    pub remote_port: u16,
}

/// Buckets order socks by how much of their local address is fixed.
fn specificity(addr: Ipv4Address) -> u8 {
    if addr.is_unspecified() { 0 } else { 1 }
}

impl Registry {
    /// Create a table with `size` buckets.
    ///
    /// # Panics
    /// This function panics if `size` is not a power of two.
    pub fn new(size: usize) -> Self {
        assert!(size.is_power_of_two(), "table size must be a power of two");
        Registry {
            buckets: vec![Vec::new(); size],
            inuse: 0,
            highest_inuse: 0,
        }
    }

    /// The number of buckets.
    pub fn table_size(&self) -> usize {
        self.buckets.len()
    }

    /// The number of registered socks.
    pub fn inuse(&self) -> usize {
        self.inuse
    }

    /// The most socks that were ever registered at the same time.
    pub fn highest_inuse(&self) -> usize {
        self.highest_inuse
    }

    pub fn bucket_index(&self, port: u16) -> usize {
        usize::from(port) & (self.buckets.len() - 1)
    }

    /// The bucket `port` hashes to, in scan order.
    pub fn bucket(&self, port: u16) -> &[SocketKey] {
        &self.buckets[self.bucket_index(port)]
    }

    /// Whether the sock is linked into any bucket.
    pub fn contains(&self, key: SocketKey) -> bool {
        self.buckets.iter().any(|bucket| bucket.contains(&key))
    }

    /// Link a sock into the bucket of `port`, recording `port` as its local port.
    ///
    /// The sock is placed before the first entry with a less specific local address.
    pub(crate) fn insert(&mut self, socks: &mut SlotMap<Sock>, key: SocketKey, port: u16)
        -> Result<()>
    {
        let sk = socks.get_mut(key.key).ok_or(Error::BadKey)?;
        sk.num = port;
        let rank = specificity(sk.saddr);

        let index = self.bucket_index(port);
        let bucket = &mut self.buckets[index];
        let position = bucket.iter()
            .position(|other| {
                let other_rank = socks.get(other.key)
                    .map_or(0, |other| specificity(other.saddr));
                other_rank < rank
            })
            .unwrap_or(bucket.len());
        bucket.insert(position, key);

        self.inuse += 1;
        self.highest_inuse = self.highest_inuse.max(self.inuse);
        net_trace!("registry: insert {:?} at port {} (bucket {}, position {})", key, port, index, position);
        Ok(())
    }

    /// Unlink a sock from the bucket of `port`.
    ///
    /// Returns `false` if the sock was not linked, which is not an error.
    pub(crate) fn remove(&mut self, key: SocketKey, port: u16) -> bool {
        let index = self.bucket_index(port);
        let bucket = &mut self.buckets[index];
        match bucket.iter().position(|other| *other == key) {
            Some(position) => {
                bucket.remove(position);
                self.inuse -= 1;
                net_trace!("registry: remove {:?} from port {}", key, port);
                true
            },
            None => false,
        }
    }

    /// Find the sock best matching an inbound packet.
    ///
    /// A candidate is disqualified if any of its set fields (local address, remote address,
    /// remote port) differs from the packet, or if it is dead and closed. Each matching set field
    /// scores one point. A perfect score returns immediately, otherwise the first candidate with
    /// the highest score wins.
    pub fn lookup_best(&self, socks: &SlotMap<Sock>, tuple: FourTuple) -> Option<SocketKey> {
        let mut best = None;
        let mut badness = -1;

        for &key in self.bucket(tuple.local_port) {
            let sk = match socks.get(key.key) {
                Some(sk) => sk,
                None => continue,
            };

            if sk.num != tuple.local_port {
                continue;
            }

            if sk.dead && sk.state == TcpState::Closed {
                continue;
            }

            let mut score = 0;
            if !sk.saddr.is_unspecified() {
                if sk.saddr != tuple.local {
                    continue;
                }
                score += 1;
            }

            if !sk.daddr.is_unspecified() {
                if sk.daddr != tuple.remote {
                    continue;
                }
                score += 1;
            }

            if sk.dport != 0 {
                if sk.dport != tuple.remote_port {
                    continue;
                }
                score += 1;
            }

            if score == 3 {
                return Some(key);
            }

            if score <= badness {
                continue;
            }

            best = Some(key);
            badness = score;
        }

        best
    }

    /// The start of the chain holding `port`.
    pub fn chain(&self, port: u16) -> Chain {
        Chain { bucket: self.bucket_index(port), next: 0 }
    }

    /// Find the next sock at or after `from` that accepts a packet, without scoring.
    ///
    /// The remote port is only compared if given, raw delivery has none. Returns the match and
    /// the position right after it, to continue a fan-out.
    pub fn lookup_exact(
        &self,
        socks: &SlotMap<Sock>,
        from: Chain,
        port: u16,
        local: Ipv4Address,
        remote: Ipv4Address,
        remote_port: Option<u16>,
    ) -> Option<(SocketKey, Chain)> {
        let bucket = self.buckets.get(from.bucket)?;
        for (position, &key) in bucket.iter().enumerate().skip(from.next) {
            let sk = match socks.get(key.key) {
                Some(sk) => sk,
                None => continue,
            };

            if sk.num != port {
                continue;
            }

            if sk.dead && sk.state == TcpState::Closed {
                continue;
            }

            if !sk.daddr.is_unspecified() && sk.daddr != remote {
                continue;
            }

            if !sk.saddr.is_unspecified() && sk.saddr != local {
                continue;
            }

            if let Some(remote_port) = remote_port {
                if sk.dport != 0 && sk.dport != remote_port {
                    continue;
                }
            }

            return Some((key, Chain { bucket: from.bucket, next: position + 1 }));
        }

        None
    }

    /// All socks accepting a packet, in chain order.
    pub fn exact_matches<'a>(
        &'a self,
        socks: &'a SlotMap<Sock>,
        port: u16,
        local: Ipv4Address,
        remote: Ipv4Address,
        remote_port: Option<u16>,
    ) -> impl Iterator<Item=SocketKey> + 'a {
        let mut chain = Some(self.chain(port));
        core::iter::from_fn(move || {
            let (key, next) = self.lookup_exact(socks, chain?, port, local, remote, remote_port)?;
            chain = Some(next);
            Some(key)
        })
    }
}
