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

use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::ReplacementPolicy;
use crate::slab::{Index, Slab};

/// Random replacement algorithm config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RandomConfig {
    /// Seed of the victim sampler. Seeded from the OS if absent.
    pub seed: Option<u64>,
}

struct Node<T> {
    element: T,
    /// Position in the dense index vector.
    pos: usize,
}

/// Evicts a uniformly sampled element.
pub struct Random<T> {
    slab: Slab<Node<T>>,
    dense: Vec<Index>,
    rng: SmallRng,
}

impl<T> Random<T> {
    /// Create an empty policy, seeded from the config if it has a seed.
    pub fn new(config: &RandomConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        Self {
            slab: Slab::new(),
            dense: Vec::new(),
            rng,
        }
    }
}

impl<T> ReplacementPolicy<T> for Random<T>
where
    T: Send + Sync + 'static,
{
    fn add(&mut self, element: T) -> Index {
        let index = self.slab.insert(Node {
            element,
            pos: self.dense.len(),
        });
        self.dense.push(index);
        index
    }

    fn touch(&mut self, _: Index) {}

    fn update(&mut self, index: Index, element: T) -> bool {
        match self.slab.get_mut(index) {
            Some(node) => {
                node.element = element;
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, index: Index) -> Option<T> {
        let node = self.slab.remove(index)?;
        self.dense.swap_remove(node.pos);
        if let Some(moved) = self.dense.get(node.pos).copied() {
            if let Some(moved) = self.slab.get_mut(moved) {
                moved.pos = node.pos;
            }
        }
        Some(node.element)
    }

    fn evict_next(&mut self) -> Option<T> {
        if self.dense.is_empty() {
            return None;
        }
        let pos = self.rng.random_range(0..self.dense.len());
        let index = self.dense[pos];
        self.remove(index)
    }

    fn peek(&self, index: Index) -> Option<&T> {
        self.slab.get(index).map(|node| &node.element)
    }

    /// Elements in no particular order.
    fn peek_all(&self) -> Vec<&T> {
        self.dense
            .iter()
            .filter_map(|index| self.slab.get(*index))
            .map(|node| &node.element)
            .collect()
    }

    fn clear(&mut self) -> Vec<T> {
        self.dense.clear();
        self.slab.clear().into_iter().map(|node| node.element).collect()
    }

    fn len(&self) -> usize {
        self.dense.len()
    }
}
