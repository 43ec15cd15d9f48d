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

use crate::slab::{Index, Slab};

struct Node<T> {
    value: T,

    prev: Option<Index>,
    next: Option<Index>,
}

/// Doubly linked list whose nodes live in a [`Slab`] and are addressed by [`Index`].
///
/// The index returned by a push stays valid until the node is removed, however the node is moved in the list.
pub struct SlabList<T> {
    slab: Slab<Node<T>>,
    head: Option<Index>,
    tail: Option<Index>,
}

impl<T> Default for SlabList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlabList<T> {
    /// Create an empty list.
    pub const fn new() -> Self {
        Self {
            slab: Slab::new(),
            head: None,
            tail: None,
        }
    }

    /// Count of nodes.
    pub fn len(&self) -> usize {
        self.slab.len()
    }

    /// Returns `true` if empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `index` refers to a node of the list.
    pub fn contains(&self, index: Index) -> bool {
        self.slab.contains(index)
    }

    /// The value of the node at `index`.
    pub fn get(&self, index: Index) -> Option<&T> {
        self.slab.get(index).map(|node| &node.value)
    }

    /// Mutable access to the value of the node at `index`.
    pub fn get_mut(&mut self, index: Index) -> Option<&mut T> {
        self.slab.get_mut(index).map(|node| &mut node.value)
    }

    /// Index of the first node.
    pub fn front(&self) -> Option<Index> {
        self.head
    }

    /// Index of the last node.
    pub fn back(&self) -> Option<Index> {
        self.tail
    }

    /// Append `value` and return its index.
    pub fn push_back(&mut self, value: T) -> Index {
        let index = self.slab.insert(Node {
            value,
            prev: None,
            next: None,
        });
        self.link_back(index);
        index
    }

    /// Prepend `value` and return its index.
    pub fn push_front(&mut self, value: T) -> Index {
        let index = self.slab.insert(Node {
            value,
            prev: None,
            next: None,
        });
        self.link_front(index);
        index
    }

    /// Remove the first node.
    pub fn pop_front(&mut self) -> Option<T> {
        self.head.and_then(|index| self.remove(index))
    }

    /// Remove the last node.
    pub fn pop_back(&mut self) -> Option<T> {
        self.tail.and_then(|index| self.remove(index))
    }

    /// Remove a node, `None` if the index is stale.
    pub fn remove(&mut self, index: Index) -> Option<T> {
        if !self.unlink(index) {
            return None;
        }
        self.slab.remove(index).map(|node| node.value)
    }

    /// Move a node to the back. Returns `false` if the index is stale.
    pub fn move_to_back(&mut self, index: Index) -> bool {
        if self.tail == Some(index) {
            return self.slab.contains(index);
        }
        if !self.unlink(index) {
            return false;
        }
        self.link_back(index);
        true
    }

    /// Iterate from front to back.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    /// Iterate from back to front.
    pub fn iter_rev(&self) -> IterRev<'_, T> {
        IterRev {
            list: self,
            cursor: self.tail,
        }
    }

    /// Remove all nodes and return their values from front to back.
    pub fn clear(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len());
        while let Some(value) = self.pop_front() {
            values.push(value);
        }
        values
    }

    fn link_back(&mut self, index: Index) {
        let prev = self.tail;
        if let Some(node) = self.slab.get_mut(index) {
            node.prev = prev;
            node.next = None;
        }
        match prev.and_then(|prev| self.slab.get_mut(prev)) {
            Some(node) => node.next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
    }

    fn link_front(&mut self, index: Index) {
        let next = self.head;
        if let Some(node) = self.slab.get_mut(index) {
            node.prev = None;
            node.next = next;
        }
        match next.and_then(|next| self.slab.get_mut(next)) {
            Some(node) => node.prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
    }

    fn unlink(&mut self, index: Index) -> bool {
        let (prev, next) = match self.slab.get_mut(index) {
            Some(node) => (node.prev.take(), node.next.take()),
            None => return false,
        };
        match prev.and_then(|prev| self.slab.get_mut(prev)) {
            Some(node) => node.next = next,
            None => self.head = next,
        }
        match next.and_then(|next| self.slab.get_mut(next)) {
            Some(node) => node.prev = prev,
            None => self.tail = prev,
        }
        true
    }
}

/// Front to back iterator, see [`SlabList::iter`].
pub struct Iter<'a, T> {
    list: &'a SlabList<T>,
    cursor: Option<Index>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (Index, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let node = self.list.slab.get(index)?;
        self.cursor = node.next;
        Some((index, &node.value))
    }
}

/// Back to front iterator, see [`SlabList::iter_rev`].
pub struct IterRev<'a, T> {
    list: &'a SlabList<T>,
    cursor: Option<Index>,
}

impl<'a, T> Iterator for IterRev<'a, T> {
    type Item = (Index, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let node = self.list.slab.get(index)?;
        self.cursor = node.prev;
        Some((index, &node.value))
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;

    fn dump(list: &SlabList<u64>) -> Vec<u64> {
        list.iter().map(|(_, v)| *v).collect_vec()
    }

    #[test]
    fn test_slab_list_basic() {
        let mut list = SlabList::new();
        let i1 = list.push_back(1);
        let i2 = list.push_back(2);
        let i3 = list.push_back(3);
        list.push_front(0);
        assert_eq!(dump(&list), vec![0, 1, 2, 3]);
        assert_eq!(list.iter_rev().map(|(_, v)| *v).collect_vec(), vec![3, 2, 1, 0]);

        assert!(list.move_to_back(i1));
        assert_eq!(dump(&list), vec![0, 2, 3, 1]);

        assert_eq!(list.remove(i2), Some(2));
        assert_eq!(list.remove(i2), None);
        assert!(!list.move_to_back(i2));
        assert_eq!(dump(&list), vec![0, 3, 1]);

        assert_eq!(list.pop_front(), Some(0));
        assert_eq!(list.pop_back(), Some(1));
        assert_eq!(list.get(i3), Some(&3));
        assert_eq!(list.front(), Some(i3));
        assert_eq!(list.back(), Some(i3));

        assert_eq!(list.clear(), vec![3]);
        assert!(list.is_empty());
        assert_eq!(list.front(), None);
        assert_eq!(list.back(), None);
    }

    #[test]
    fn test_slab_list_move_tail_is_noop() {
        let mut list = SlabList::new();
        list.push_back(1);
        let i2 = list.push_back(2);
        assert!(list.move_to_back(i2));
        assert_eq!(dump(&list), vec![1, 2]);
    }
}
