/// Provides a slotmap over a growable vector.
///
/// A slotmap provides a `Vec`-like interface where each entry is associated with a stable
/// index-like key. Lookup with the key will detect if an entry has been removed but does not
/// require and lifetime relation.
///
/// ## Usage
///
/// ```
/// use ethox_inet::managed::SlotMap;
///
/// let mut map = SlotMap::new();
/// let index = map.insert(42);
/// assert_eq!(map.get(index).cloned(), Some(42));
/// assert_eq!(map.remove(index), Some(42));
/// assert!(map.get(index).is_none());
/// ```
pub struct SlotMap<T> {
    slots: Vec<Slot<T>>,
    generation: Generation,
    free_top: Option<usize>,
    len: usize,
}

/// An index into a slotmap.
///
/// The index remains valid until the entry is removed. If accessing the slotmap with the index
/// again after the entry was removed will fail, even if the index where the element was previously
/// stored has been reused for another element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    idx: usize,
    generation: Generation,
}

enum Slot<T> {
    Occupied {
        generation: Generation,
        value: T,
    },
    /// Link to the next slot in the free list.
    Vacant {
        next_free: Option<usize>,
    },
}

/// The generation counter.
///
/// Has strictly positive values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Generation(u64);

impl<T> SlotMap<T> {
    /// Create an empty slotmap.
    pub fn new() -> Self {
        SlotMap {
            slots: Vec::new(),
            generation: Generation::default(),
            free_top: None,
            len: 0,
        }
    }

    /// Retrieve a value by index.
    pub fn get(&self, index: Key) -> Option<&T> {
        match self.slots.get(index.idx)? {
            Slot::Occupied { generation, value } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Retrieve a mutable value by index.
    pub fn get_mut(&mut self, index: Key) -> Option<&mut T> {
        match self.slots.get_mut(index.idx)? {
            Slot::Occupied { generation, value } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Check if the key still refers to a live entry.
    pub fn contains(&self, index: Key) -> bool {
        self.get(index).is_some()
    }

    /// Insert a value, reusing a vacant slot if there is one.
    pub fn insert(&mut self, value: T) -> Key {
        let generation = self.generation;
        self.generation.advance();
        self.len += 1;

        let entry = Slot::Occupied { generation, value };
        match self.free_top {
            Some(idx) => {
                self.free_top = match self.slots[idx] {
                    Slot::Vacant { next_free } => next_free,
                    Slot::Occupied { .. } => unreachable!("free list points to an occupied slot"),
                };
                self.slots[idx] = entry;
                Key { idx, generation }
            },
            None => {
                let idx = self.slots.len();
                self.slots.push(entry);
                Key { idx, generation }
            },
        }
    }

    /// Remove an element.
    ///
    /// Returns `None` if the provided index did not refer to an element that could be freed.
    pub fn remove(&mut self, index: Key) -> Option<T> {
        if !self.contains(index) {
            return None;
        }

        let vacant = Slot::Vacant { next_free: self.free_top };
        let old = core::mem::replace(&mut self.slots[index.idx], vacant);
        self.free_top = Some(index.idx);
        self.len -= 1;

        match old {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    /// The number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over all live entries with their keys.
    pub fn iter(&self) -> impl Iterator<Item=(Key, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| match slot {
            Slot::Occupied { generation, value } => Some((Key { idx, generation: *generation }, value)),
            Slot::Vacant { .. } => None,
        })
    }

    /// The keys of all live entries.
    pub fn keys(&self) -> impl Iterator<Item=Key> + '_ {
        self.iter().map(|(key, _)| key)
    }
}

impl<T> Default for SlotMap<T> {
    fn default() -> Self {
        SlotMap::new()
    }
}

impl Generation {
    fn advance(&mut self) {
        assert!(self.0 < u64::MAX, "generation counter exhausted");
        self.0 += 1;
    }
}

impl Default for Generation {
    fn default() -> Self {
        Generation(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple() {
        let mut map = SlotMap::new();
        let key0 = map.insert(0);
        let key1 = map.insert(1);

        assert_eq!(map.get(key0).cloned(), Some(0));
        assert_eq!(map.get(key1).cloned(), Some(1));
        assert_eq!(map.len(), 2);

        assert_eq!(map.remove(key0), Some(0));
        assert!(map.get(key0).is_none());
        assert_eq!(map.remove(key0), None);

        assert_eq!(map.get(key1).cloned(), Some(1));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn stale_key_after_reuse() {
        let mut map = SlotMap::new();
        let old = map.insert("old");
        map.remove(old);

        let new = map.insert("new");
        // Slot was reused but the generation differs.
        assert_eq!(old.idx, new.idx);
        assert!(map.get(old).is_none());
        assert_eq!(map.get(new).cloned(), Some("new"));
    }

    #[test]
    fn iteration() {
        let mut map = SlotMap::new();
        let keys: Vec<_> = (0..5).map(|i| map.insert(i)).collect();
        map.remove(keys[1]);
        map.remove(keys[3]);

        let values: Vec<_> = map.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, [0, 2, 4]);
        assert_eq!(map.keys().count(), 3);
    }
}
