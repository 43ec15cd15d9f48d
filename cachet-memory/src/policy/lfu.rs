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

use std::collections::BTreeMap;

use cachet_common::strict_assert;
use serde::{Deserialize, Serialize};

use super::ReplacementPolicy;
use crate::slab::{Index, Slab};

/// Lfu replacement algorithm config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LfuConfig {}

struct Node<T> {
    element: T,
    freq: u64,
    /// Insertion sequence, breaks frequency ties.
    seq: u64,
}

/// Evicts the least frequently accessed element, the earliest inserted one among equals.
///
/// Elements are ordered by `(frequency, insertion sequence)`. The insertion sequence never changes for the lifetime
/// of an element, so an update keeps its place among the elements of the same frequency.
pub struct Lfu<T> {
    slab: Slab<Node<T>>,
    order: BTreeMap<(u64, u64), Index>,
    seq: u64,
}

impl<T> Default for Lfu<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Lfu<T> {
    /// Create an empty policy.
    pub fn new() -> Self {
        Self {
            slab: Slab::new(),
            order: BTreeMap::new(),
            seq: 0,
        }
    }

    /// Access frequency of the element at `index`.
    pub fn frequency(&self, index: Index) -> Option<u64> {
        self.slab.get(index).map(|node| node.freq)
    }

    fn bump(&mut self, index: Index) -> bool {
        let Some(node) = self.slab.get_mut(index) else {
            return false;
        };
        let removed = self.order.remove(&(node.freq, node.seq));
        strict_assert!(removed.is_some());
        node.freq = node.freq.saturating_add(1);
        self.order.insert((node.freq, node.seq), index);
        true
    }
}

impl<T> ReplacementPolicy<T> for Lfu<T>
where
    T: Send + Sync + 'static,
{
    fn add(&mut self, element: T) -> Index {
        self.seq += 1;
        let seq = self.seq;
        let index = self.slab.insert(Node { element, freq: 1, seq });
        self.order.insert((1, seq), index);
        index
    }

    fn touch(&mut self, index: Index) {
        self.bump(index);
    }

    fn update(&mut self, index: Index, element: T) -> bool {
        match self.slab.get_mut(index) {
            Some(node) => node.element = element,
            None => return false,
        }
        self.bump(index)
    }

    fn remove(&mut self, index: Index) -> Option<T> {
        let node = self.slab.remove(index)?;
        self.order.remove(&(node.freq, node.seq));
        Some(node.element)
    }

    fn evict_next(&mut self) -> Option<T> {
        let (_, index) = self.order.pop_first()?;
        self.slab.remove(index).map(|node| node.element)
    }

    fn peek(&self, index: Index) -> Option<&T> {
        self.slab.get(index).map(|node| &node.element)
    }

    fn peek_all(&self) -> Vec<&T> {
        self.order
            .values()
            .filter_map(|index| self.slab.get(*index))
            .map(|node| &node.element)
            .collect()
    }

    fn clear(&mut self) -> Vec<T> {
        let mut nodes = self.slab.clear();
        nodes.sort_by_key(|node| (node.freq, node.seq));
        self.order.clear();
        nodes.into_iter().map(|node| node.element).collect()
    }

    fn len(&self) -> usize {
        self.slab.len()
    }
}
