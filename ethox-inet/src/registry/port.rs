use crate::error::{Error, Result};
use crate::managed::SlotMap;
use crate::sock::Sock;
use super::Registry;

/// The rotating start of ephemeral port scans.
///
/// Successive allocations start at different buckets so that a freshly released port is not
/// handed out again right away.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PortCursor {
    start: u32,
}

impl PortCursor {
    /// The range the rotating base moves within, above the reserved ports.
    pub const SPAN: u32 = 1024;

    fn offset(&self) -> u32 {
        self.start % Self::SPAN
    }

    fn advance(&mut self, by: u32) {
        self.start = (self.start + by) % Self::SPAN;
    }
}

impl Registry {
    /// Whether any registered sock, dead or alive, holds `port`.
    pub fn in_use(&self, socks: &SlotMap<Sock>, port: u16) -> bool {
        self.bucket(port)
            .iter()
            .filter_map(|key| socks.get(key.key))
            .any(|sk| sk.num == port)
    }

    /// Pick an unused local port.
    ///
    /// A `hint` of zero or in the reserved range is replaced by a base rotating above
    /// `reserved`. Every bucket is scanned once, starting after the base and wrapping, and the
    /// first empty one yields its port. If every bucket is occupied, ports hashing to the least
    /// occupied bucket are probed in strides of the table size, at most `probe_limit` times.
    /// Candidates past the top of the port space fold back above `reserved` into the same
    /// bucket.
    pub(crate) fn allocate(
        &self,
        socks: &SlotMap<Sock>,
        cursor: &mut PortCursor,
        hint: u16,
        reserved: u16,
        probe_limit: usize,
    ) -> Result<u16> {
        let size = self.table_size() as u32;
        let reserved = u32::from(reserved);

        let mut base = u32::from(hint);
        if base == 0 {
            base = reserved + 1 + cursor.offset();
        }
        if base <= reserved {
            base += reserved + cursor.offset();
        }

        let mut best = None;
        let mut best_len = usize::MAX;
        for i in 0..size {
            let candidate = match fold(base + 1 + i, reserved, size) {
                Some(candidate) => candidate,
                None => continue,
            };

            let occupied = self.bucket(candidate).len();
            if occupied == 0 {
                cursor.advance(i + 1);
                net_debug!("registry: allocated port {} from an empty bucket", candidate);
                return Ok(candidate);
            }

            if occupied < best_len {
                best = Some(candidate);
                best_len = occupied;
            }
        }

        if let Some(mut candidate) = best {
            for _ in 0..probe_limit {
                if !self.in_use(socks, candidate) {
                    net_debug!("registry: allocated probed port {}", candidate);
                    return Ok(candidate);
                }

                match fold(u32::from(candidate) + size, reserved, size) {
                    Some(next) => candidate = next,
                    None => break,
                }
            }
        }

        net_warn!("registry: no free port above {}", base);
        Err(Error::Exhausted)
    }
}

/// Map a candidate port into `(reserved, 65535]` without changing its bucket.
///
/// Ports past the top restart above `reserved`, shifted by a multiple of the table size. `None`
/// if the range can not hold a full round of buckets.
fn fold(candidate: u32, reserved: u32, size: u32) -> Option<u16> {
    let top = u32::from(u16::MAX);
    if candidate <= top {
        return u16::try_from(candidate).ok();
    }

    let span = (top.saturating_sub(reserved) / size) * size;
    if span == 0 {
        return None;
    }

    u16::try_from(reserved + 1 + (candidate - reserved - 1) % span).ok()
}
