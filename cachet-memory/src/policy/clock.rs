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

use serde::{Deserialize, Serialize};

use super::ReplacementPolicy;
use crate::slab::{Index, Slab};

/// Clock replacement algorithm config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClockConfig {}

struct Node<T> {
    element: T,
    referenced: bool,
}

/// Second chance replacement.
///
/// The slots of the slab form the circle. The hand sweeps over them: a referenced element loses its reference bit and
/// survives, the first unreferenced one is evicted. `touch` sets the reference bit.
pub struct Clock<T> {
    slab: Slab<Node<T>>,
    hand: usize,
}

impl<T> Default for Clock<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clock<T> {
    /// Create an empty ring.
    pub fn new() -> Self {
        Self {
            slab: Slab::new(),
            hand: 0,
        }
    }

    fn advance(&mut self) {
        self.hand += 1;
        if self.hand >= self.slab.slots() {
            self.hand = 0;
        }
    }
}

impl<T> ReplacementPolicy<T> for Clock<T>
where
    T: Send + Sync + 'static,
{
    fn add(&mut self, element: T) -> Index {
        self.slab.insert(Node {
            element,
            referenced: false,
        })
    }

    fn touch(&mut self, index: Index) {
        if let Some(node) = self.slab.get_mut(index) {
            node.referenced = true;
        }
    }

    fn update(&mut self, index: Index, element: T) -> bool {
        match self.slab.get_mut(index) {
            Some(node) => {
                node.element = element;
                node.referenced = true;
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, index: Index) -> Option<T> {
        self.slab.remove(index).map(|node| node.element)
    }

    fn evict_next(&mut self) -> Option<T> {
        if self.slab.is_empty() {
            return None;
        }
        if self.hand >= self.slab.slots() {
            self.hand = 0;
        }
        // Terminates within two rounds: the first one clears every reference bit.
        loop {
            if let Some(index) = self.slab.index_at(self.hand) {
                let node = self.slab.get_mut(index)?;
                if !node.referenced {
                    self.advance();
                    return self.slab.remove(index).map(|node| node.element);
                }
                node.referenced = false;
            }
            self.advance();
        }
    }

    fn peek(&self, index: Index) -> Option<&T> {
        self.slab.get(index).map(|node| &node.element)
    }

    /// Elements in scan order, starting at the hand.
    fn peek_all(&self) -> Vec<&T> {
        let slots = self.slab.slots();
        (0..slots)
            .map(|offset| (self.hand + offset) % slots)
            .filter_map(|slot| self.slab.index_at(slot))
            .filter_map(|index| self.slab.get(index))
            .map(|node| &node.element)
            .collect()
    }

    fn clear(&mut self) -> Vec<T> {
        self.hand = 0;
        self.slab.clear().into_iter().map(|node| node.element).collect()
    }

    fn len(&self) -> usize {
        self.slab.len()
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;
    use crate::policy::test_utils::{drain, dump};

    #[test]
    fn test_clock_second_chance() {
        let mut clock = Clock::new();
        let indices = (0..4u64).map(|i| clock.add(i)).collect_vec();

        clock.touch(indices[0]);
        clock.touch(indices[1]);

        // 0 and 1 lose their bits, 2 goes.
        assert_eq!(clock.evict_next(), Some(2));
        assert_eq!(dump(&clock), vec![3, 0, 1]);

        // The freed slot is reused behind the hand.
        let i4 = clock.add(4);
        clock.touch(i4);
        assert_eq!(clock.evict_next(), Some(3));
        assert_eq!(clock.evict_next(), Some(0));
        assert_eq!(drain(&mut clock), vec![1, 4]);
    }

    #[test]
    fn test_clock_all_referenced() {
        let mut clock = Clock::new();
        let indices = (0..3u64).map(|i| clock.add(i)).collect_vec();
        for index in &indices {
            clock.touch(*index);
        }
        assert_eq!(clock.evict_next(), Some(0));
        assert!(clock.update(indices[1], 10));
        assert_eq!(clock.evict_next(), Some(2));
        assert_eq!(clock.evict_next(), Some(10));
        assert!(clock.is_empty());
    }
}
