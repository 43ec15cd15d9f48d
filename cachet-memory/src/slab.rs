// Copyright 2026 cachet Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt::Debug;

/// A handle that can be used to access the allocated element in [`Slab`].
///
/// Every slot carries a generation that is bumped when its element is removed, so an [`Index`] that outlived its
/// element is detected as stale instead of silently addressing the element that reused the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Index {
    slot: u32,
    generation: u32,
}

impl Index {
    /// Position of the slot in the slab.
    pub fn slot(&self) -> usize {
        self.slot as usize
    }

    /// Generation of the slot when the index was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

enum Entry<T> {
    Vacant { next: Option<u32>, generation: u32 },
    Occupied { value: T, generation: u32 },
}

/// A slab allocator addressing elements by generational [`Index`].
///
/// Removed slots are chained into a free list and reused by later insertions.
pub struct Slab<T> {
    entries: Vec<Entry<T>>,
    /// Head of the free slot list.
    free: Option<u32>,
    len: usize,
}

impl<T> Debug for Slab<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slab")
            .field("slots", &self.entries.len())
            .field("len", &self.len)
            .field("free", &self.free)
            .finish()
    }
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Slab<T> {
    /// Create an empty slab.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: None,
            len: 0,
        }
    }

    /// Create an empty slab that can hold `capacity` elements without reallocation.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            free: None,
            len: 0,
        }
    }

    /// Count of live elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if there is no live element.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Count of allocated slots, live or vacant.
    pub fn slots(&self) -> usize {
        self.entries.len()
    }

    /// Insert a new element into the slab.
    pub fn insert(&mut self, value: T) -> Index {
        self.len += 1;
        match self.free {
            Some(slot) => {
                let entry = &mut self.entries[slot as usize];
                let (next, generation) = match entry {
                    Entry::Vacant { next, generation } => (*next, *generation),
                    Entry::Occupied { .. } => unreachable!("free list points at an occupied slot: {slot}"),
                };
                *entry = Entry::Occupied { value, generation };
                self.free = next;
                tracing::trace!("[slab]: reuse slot {slot} at generation {generation}");
                Index { slot, generation }
            }
            None => {
                let slot = u32::try_from(self.entries.len()).expect("slab slots must not exceed u32::MAX");
                self.entries.push(Entry::Occupied { value, generation: 0 });
                Index { slot, generation: 0 }
            }
        }
    }

    /// Remove the element addressed by `index`.
    ///
    /// Returns `None` if the index is stale.
    pub fn remove(&mut self, index: Index) -> Option<T> {
        let entry = self.entries.get_mut(index.slot())?;
        match entry {
            Entry::Occupied { generation, .. } if *generation == index.generation => {}
            _ => return None,
        }
        let vacant = Entry::Vacant {
            next: self.free,
            generation: index.generation.wrapping_add(1),
        };
        match std::mem::replace(entry, vacant) {
            Entry::Occupied { value, .. } => {
                self.free = Some(index.slot);
                self.len -= 1;
                Some(value)
            }
            Entry::Vacant { .. } => unreachable!(),
        }
    }

    /// Get the element addressed by `index`, `None` if the index is stale.
    pub fn get(&self, index: Index) -> Option<&T> {
        match self.entries.get(index.slot())? {
            Entry::Occupied { value, generation } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Get the element addressed by `index` mutably, `None` if the index is stale.
    pub fn get_mut(&mut self, index: Index) -> Option<&mut T> {
        match self.entries.get_mut(index.slot())? {
            Entry::Occupied { value, generation } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Returns `true` if `index` addresses a live element.
    pub fn contains(&self, index: Index) -> bool {
        self.get(index).is_some()
    }

    /// Get the live index of the slot at position `slot`, `None` if the slot is vacant or out of range.
    pub fn index_at(&self, slot: usize) -> Option<Index> {
        match self.entries.get(slot)? {
            Entry::Occupied { generation, .. } => Some(Index {
                slot: slot as u32,
                generation: *generation,
            }),
            Entry::Vacant { .. } => None,
        }
    }

    /// Iterate over the live elements in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Index, &T)> {
        self.entries.iter().enumerate().filter_map(|(slot, entry)| match entry {
            Entry::Occupied { value, generation } => Some((
                Index {
                    slot: slot as u32,
                    generation: *generation,
                },
                value,
            )),
            Entry::Vacant { .. } => None,
        })
    }

    /// Remove all live elements and return them in slot order.
    ///
    /// Slot generations are kept, so indices issued before the clear stay stale forever.
    pub fn clear(&mut self) -> Vec<T> {
        let mut drained = Vec::with_capacity(self.len);
        for slot in 0..self.entries.len() {
            if let Some(index) = self.index_at(slot) {
                if let Some(value) = self.remove(index) {
                    drained.push(value);
                }
            }
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    struct Data {
        a: u64,
        b: Vec<u8>,
    }

    #[test]
    fn test_slab_basic() {
        let mut slab = Slab::new();

        let t1 = slab.insert(Data { a: 1, b: vec![1; 1024] });
        let t2 = slab.insert(Data { a: 2, b: vec![2; 1024] });

        slab.get_mut(t1).unwrap().a = 2;
        slab.get_mut(t2).unwrap().a = 1;

        let d1 = slab.remove(t1).unwrap();
        let d2 = slab.remove(t2).unwrap();

        assert_eq!(d1, Data { a: 2, b: vec![1; 1024] });
        assert_eq!(d2, Data { a: 1, b: vec![2; 1024] });
        assert!(slab.is_empty());
    }

    #[test]
    fn test_slab_stale_index() {
        let mut slab = Slab::new();

        let stale = slab.insert(1u64);
        assert_eq!(slab.remove(stale), Some(1));

        // The slot is reused with a new generation.
        let fresh = slab.insert(2u64);
        assert_eq!(stale.slot(), fresh.slot());
        assert_ne!(stale.generation(), fresh.generation());

        assert_eq!(slab.get(stale), None);
        assert_eq!(slab.remove(stale), None);
        assert_eq!(slab.get(fresh), Some(&2));
        assert_eq!(slab.len(), 1);
    }

    #[test]
    fn test_slab_clear_keeps_generations() {
        let mut slab = Slab::with_capacity(4);
        let indices = (0..4u64).map(|i| slab.insert(i)).collect::<Vec<_>>();
        assert_eq!(slab.clear(), vec![0, 1, 2, 3]);
        assert!(slab.is_empty());
        for index in indices {
            assert!(!slab.contains(index));
        }
        let index = slab.insert(42);
        assert_eq!(slab.iter().collect::<Vec<_>>(), vec![(index, &42)]);
    }

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<Slab<()>>();
    }
}
