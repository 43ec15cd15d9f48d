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

use crate::slab::Index;

/// Cache replacement algorithm abstraction.
///
/// A [`ReplacementPolicy`] knows nothing about cache keys and values. It orders opaque elements and addresses each of
/// them with the [`Index`] returned by [`ReplacementPolicy::add`]. The index stays valid until the element leaves the
/// policy by [`ReplacementPolicy::remove`], [`ReplacementPolicy::evict_next`] or [`ReplacementPolicy::clear`]. After
/// that, every operation given the stale index must be a no-op.
///
/// Implementations are not required to be thread safe. The entry store serializes all calls to one instance.
///
/// Third-party algorithms implement this trait and are handed to the cache builder as a boxed trait object.
pub trait ReplacementPolicy<T>: Send + Sync + 'static {
    /// Take a new element and return its index.
    fn add(&mut self, element: T) -> Index;

    /// Record an access to the element.
    fn touch(&mut self, index: Index);

    /// Replace the element at `index`.
    ///
    /// Returns `false` if the index is stale. The element is dropped in that case.
    fn update(&mut self, index: Index, element: T) -> bool;

    /// Remove the element at `index`, `None` if the index is stale.
    fn remove(&mut self, index: Index) -> Option<T>;

    /// Choose a victim, remove it and return it. `None` if the policy is empty.
    fn evict_next(&mut self) -> Option<T>;

    /// Get the element at `index` without recording an access.
    fn peek(&self, index: Index) -> Option<&T>;

    /// Get all elements, in eviction order where the algorithm has one.
    fn peek_all(&self) -> Vec<&T>;

    /// Remove all elements and return them.
    fn clear(&mut self) -> Vec<T>;

    /// Count of elements held by the policy.
    fn len(&self) -> usize;

    /// Returns `true` if the policy holds no element.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Config of the built-in replacement policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyConfig {
    /// First in, first out.
    Fifo(FifoConfig),
    /// Last in, first out.
    Lifo(LifoConfig),
    /// Least recently used.
    Lru(LruConfig),
    /// Most recently used.
    Mru(MruConfig),
    /// Least frequently used.
    Lfu(LfuConfig),
    /// Second chance clock.
    Clock(ClockConfig),
    /// Uniform random.
    Random(RandomConfig),
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::Lru(LruConfig::default())
    }
}

impl PolicyConfig {
    /// Build the replacement policy described by the config.
    pub fn build<T>(&self) -> Box<dyn ReplacementPolicy<T>>
    where
        T: Send + Sync + 'static,
    {
        match self {
            PolicyConfig::Fifo(_) => Box::new(Fifo::new()),
            PolicyConfig::Lifo(_) => Box::new(Lifo::new()),
            PolicyConfig::Lru(_) => Box::new(Lru::new()),
            PolicyConfig::Mru(_) => Box::new(Mru::new()),
            PolicyConfig::Lfu(_) => Box::new(Lfu::new()),
            PolicyConfig::Clock(_) => Box::new(Clock::new()),
            PolicyConfig::Random(config) => Box::new(Random::new(config)),
        }
    }
}

macro_rules! impl_from_config {
    ($($variant:ident($config:ty)),* $(,)?) => {
        $(
            impl From<$config> for PolicyConfig {
                fn from(value: $config) -> PolicyConfig {
                    PolicyConfig::$variant(value)
                }
            }
        )*
    };
}

impl_from_config! {
    Fifo(FifoConfig),
    Lifo(LifoConfig),
    Lru(LruConfig),
    Mru(MruConfig),
    Lfu(LfuConfig),
    Clock(ClockConfig),
    Random(RandomConfig),
}

/// Second-chance clock.
pub mod clock;
/// First in, first out.
pub mod fifo;
/// Least frequently used.
pub mod lfu;
/// Last in, first out.
pub mod lifo;
/// Least recently used.
pub mod lru;
/// Most recently used.
pub mod mru;
/// Uniform random victims.
pub mod random;

pub use clock::{Clock, ClockConfig};
pub use fifo::{Fifo, FifoConfig};
pub use lfu::{Lfu, LfuConfig};
pub use lifo::{Lifo, LifoConfig};
pub use lru::{Lru, LruConfig};
pub use mru::{Mru, MruConfig};
pub use random::{Random, RandomConfig};

#[cfg(test)]
pub(crate) mod test_utils {
    use super::ReplacementPolicy;

    pub fn dump<P>(policy: &P) -> Vec<u64>
    where
        P: ReplacementPolicy<u64> + ?Sized,
    {
        policy.peek_all().into_iter().copied().collect()
    }

    /// Evict until empty and return the victims in eviction order.
    pub fn drain<P>(policy: &mut P) -> Vec<u64>
    where
        P: ReplacementPolicy<u64> + ?Sized,
    {
        std::iter::from_fn(|| policy.evict_next()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{test_utils::drain, *};

    #[test]
    fn test_policy_config_serde() {
        let configs: Vec<PolicyConfig> = vec![
            LruConfig::default().into(),
            LfuConfig::default().into(),
            RandomConfig { seed: Some(7) }.into(),
        ];
        let json = serde_json::to_string(&configs).unwrap();
        let decoded: Vec<PolicyConfig> = serde_json::from_str(&json).unwrap();
        assert_eq!(configs, decoded);
    }

    #[test]
    fn test_stale_index_is_noop() {
        let configs: Vec<PolicyConfig> = vec![
            FifoConfig::default().into(),
            LifoConfig::default().into(),
            LruConfig::default().into(),
            MruConfig::default().into(),
            LfuConfig::default().into(),
            ClockConfig::default().into(),
            RandomConfig { seed: Some(1) }.into(),
        ];
        for config in configs {
            let mut policy = config.build::<u64>();
            let stale = policy.add(1);
            assert_eq!(policy.remove(stale), Some(1));
            let fresh = policy.add(2);

            policy.touch(stale);
            assert!(!policy.update(stale, 3), "{config:?}");
            assert_eq!(policy.remove(stale), None);
            assert_eq!(policy.peek(stale), None);
            assert_eq!(policy.peek(fresh), Some(&2));
            assert_eq!(policy.len(), 1);

            assert!(policy.update(fresh, 4));
            assert_eq!(drain(policy.as_mut()), vec![4]);
            assert!(policy.is_empty());
        }
    }
}
