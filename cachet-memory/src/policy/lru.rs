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
use crate::{list::SlabList, slab::Index};

/// Lru replacement algorithm config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LruConfig {}

/// Evicts the least recently accessed element.
///
/// The list is kept in access order: the front is the coldest element, the back the hottest one.
pub struct Lru<T> {
    list: SlabList<T>,
}

impl<T> Default for Lru<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Lru<T> {
    /// Create an empty policy.
    pub fn new() -> Self {
        Self { list: SlabList::new() }
    }
}

impl<T> ReplacementPolicy<T> for Lru<T>
where
    T: Send + Sync + 'static,
{
    fn add(&mut self, element: T) -> Index {
        self.list.push_back(element)
    }

    fn touch(&mut self, index: Index) {
        self.list.move_to_back(index);
    }

    fn update(&mut self, index: Index, element: T) -> bool {
        match self.list.get_mut(index) {
            Some(slot) => *slot = element,
            None => return false,
        }
        self.list.move_to_back(index)
    }

    fn remove(&mut self, index: Index) -> Option<T> {
        self.list.remove(index)
    }

    fn evict_next(&mut self) -> Option<T> {
        self.list.pop_front()
    }

    fn peek(&self, index: Index) -> Option<&T> {
        self.list.get(index)
    }

    fn peek_all(&self) -> Vec<&T> {
        self.list.iter().map(|(_, element)| element).collect()
    }

    fn clear(&mut self) -> Vec<T> {
        self.list.clear()
    }

    fn len(&self) -> usize {
        self.list.len()
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;
    use crate::policy::test_utils::{drain, dump};

    #[test]
    fn test_lru() {
        let mut lru = Lru::new();
        let indices = (0..4u64).map(|i| lru.add(i)).collect_vec();

        // 1, 2, 3, 0
        lru.touch(indices[0]);
        assert_eq!(dump(&lru), vec![1, 2, 3, 0]);

        // 2, 3, 0, 10
        assert!(lru.update(indices[1], 10));
        assert_eq!(dump(&lru), vec![2, 3, 0, 10]);

        assert_eq!(lru.evict_next(), Some(2));
        assert_eq!(lru.remove(indices[0]), Some(0));
        lru.touch(indices[3]);
        assert_eq!(drain(&mut lru), vec![10, 3]);
    }
}
