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

/// Lifo replacement algorithm config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifoConfig {}

/// Evicts the latest inserted element first.
pub struct Lifo<T> {
    stack: SlabList<T>,
}

impl<T> Default for Lifo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Lifo<T> {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self { stack: SlabList::new() }
    }
}

impl<T> ReplacementPolicy<T> for Lifo<T>
where
    T: Send + Sync + 'static,
{
    fn add(&mut self, element: T) -> Index {
        self.stack.push_back(element)
    }

    fn touch(&mut self, _: Index) {}

    fn update(&mut self, index: Index, element: T) -> bool {
        match self.stack.get_mut(index) {
            Some(slot) => {
                *slot = element;
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, index: Index) -> Option<T> {
        self.stack.remove(index)
    }

    fn evict_next(&mut self) -> Option<T> {
        self.stack.pop_back()
    }

    fn peek(&self, index: Index) -> Option<&T> {
        self.stack.get(index)
    }

    fn peek_all(&self) -> Vec<&T> {
        self.stack.iter_rev().map(|(_, element)| element).collect()
    }

    fn clear(&mut self) -> Vec<T> {
        self.stack.clear()
    }

    fn len(&self) -> usize {
        self.stack.len()
    }
}
