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

/// Mru replacement algorithm config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MruConfig {}

/// Evicts the most recently accessed element.
///
/// Suits cyclic scans larger than the cache, where the element just used is the one needed last.
pub struct Mru<T> {
    list: SlabList<T>,
}

impl<T> Default for Mru<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mru<T> {
    /// Create an empty policy.
    pub fn new() -> Self {
        Self { list: SlabList::new() }
    }
}

impl<T> ReplacementPolicy<T> for Mru<T>
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
        self.list.pop_back()
    }

    fn peek(&self, index: Index) -> Option<&T> {
        self.list.get(index)
    }

    fn peek_all(&self) -> Vec<&T> {
        self.list.iter_rev().map(|(_, element)| element).collect()
    }

    fn clear(&mut self) -> Vec<T> {
        self.list.clear()
    }

    fn len(&self) -> usize {
        self.list.len()
    }
}
