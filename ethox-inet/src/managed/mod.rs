//! Containers with stable keys.
//!
//! Socks reference each other (a listener and its pending children, a socket and its pair) and
//! are referenced from buffers, timers and the registry buckets. All of these references are
//! [`Key`]s into one [`SlotMap`], which detects a stale reference instead of reaching a reused
//! entry.
//!
//! [`Key`]: slotmap/struct.Key.html
//! [`SlotMap`]: slotmap/struct.SlotMap.html
pub mod slotmap;

pub use self::slotmap::{Key, SlotMap};
