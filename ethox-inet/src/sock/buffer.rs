use crate::time::Instant;
use crate::wire::SockAddr;
use super::SocketKey;

/// A network buffer queued on a sock.
///
/// Buffers are created by [`Stack::alloc_buffer`], which charges their true size against one of
/// the owner's memory counters, and must be handed back to [`Stack::free_buffer`] which releases
/// the charge. A buffer whose owner differs from the sock holding it in a queue is a reference to
/// that other sock, this is how a listener tracks the children awaiting `accept`.
///
/// [`Stack::alloc_buffer`]: ../stack/struct.Stack.html#method.alloc_buffer
/// [`Stack::free_buffer`]: ../stack/struct.Stack.html#method.free_buffer
#[derive(Debug)]
pub struct SkBuff {
    pub(crate) id: BufferId,
    pub(crate) owner: Option<SocketKey>,
    pub(crate) charge: Option<Direction>,
    pub(crate) link: Option<Link>,
    pub(crate) truesize: usize,
    /// The payload bytes.
    pub payload: Vec<u8>,
    /// Time of arrival, for inbound buffers.
    pub stamp: Option<Instant>,
    /// The remote endpoint the payload came from.
    pub remote: Option<SockAddr>,
}

/// Identifies a buffer while it sits on a transmit queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub(crate) u64);

/// The memory counter a buffer is charged against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Charged to `rmem_alloc`.
    Read,
    /// Charged to `wmem_alloc`.
    Write,
}

/// Transmission queues outside of any sock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Link {
    /// Waiting on the network device.
    Device,
    /// Waiting for neighbor resolution.
    Resolve,
}

impl SkBuff {
    /// Bookkeeping overhead charged on top of the payload.
    pub const HEADER_SIZE: usize = 64;

    pub fn id(&self) -> BufferId {
        self.id
    }

    /// The sock this buffer is charged to, or refers to.
    pub fn owner(&self) -> Option<SocketKey> {
        self.owner
    }

    pub fn truesize(&self) -> usize {
        self.truesize
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// The transmission queue this buffer is linked into, if any.
    pub fn link(&self) -> Option<Link> {
        self.link
    }
}
