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

use std::{fmt::Debug, hash::Hash, sync::Arc};

use cachet_common::{code::Key, strict_assert, strict_assert_eq};
use equivalent::Equivalent;
use hashbrown::HashMap;

use crate::{
    entry::{CacheEntry, EntryAttributes},
    policy::ReplacementPolicy,
    slab::Index,
};

struct Slot<K, V> {
    entry: CacheEntry<K, V>,
    index: Index,
}

/// The result of [`EntryStore::put`].
#[derive(Debug)]
pub struct PutOutcome<K, V> {
    /// The entry replaced by the put, if the key was present.
    pub old: Option<CacheEntry<K, V>>,
    /// Snapshot of the written entry.
    pub new: CacheEntry<K, V>,
    /// Entries evicted to make room, in eviction order.
    ///
    /// An entry that does not fit the limits even in an empty store is evicted right away and reported here too.
    pub evicted: Vec<CacheEntry<K, V>>,
}

/// Owner of the key to entry mapping and of the replacement policy.
///
/// Every live entry holds exactly one valid index of the policy, and the policy holds the key of every live entry and
/// nothing else.
///
/// [`EntryStore`] is not synchronized. The cache engine serializes all access with one lock. It can be used directly
/// by callers that serialize access on their own.
pub struct EntryStore<K, V> {
    map: HashMap<K, Slot<K, V>>,
    policy: Box<dyn ReplacementPolicy<K>>,

    max_entries: usize,
    max_volume: u64,
    // Wide enough that the sum of any number of `u64` sizes never overflows.
    volume: u128,
}

impl<K, V> Debug for EntryStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStore")
            .field("len", &self.map.len())
            .field("volume", &self.volume)
            .field("max_entries", &self.max_entries)
            .field("max_volume", &self.max_volume)
            .finish()
    }
}

impl<K, V> EntryStore<K, V>
where
    K: Key,
{
    /// Create an empty store. `usize::MAX` and `u64::MAX` leave the limits unbounded.
    pub fn new(policy: Box<dyn ReplacementPolicy<K>>, max_entries: usize, max_volume: u64) -> Self {
        Self {
            map: HashMap::new(),
            policy,
            max_entries,
            max_volume,
            volume: 0,
        }
    }

    /// Count of live entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Sum of the sizes of the live entries, saturated at `u64::MAX`.
    pub fn volume(&self) -> u64 {
        u64::try_from(self.volume).unwrap_or(u64::MAX)
    }

    /// Entry count limit.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Volume limit.
    pub fn max_volume(&self) -> u64 {
        self.max_volume
    }

    /// Read access to the replacement policy.
    pub fn policy(&self) -> &dyn ReplacementPolicy<K> {
        self.policy.as_ref()
    }

    /// The entry of `key`, live or stale.
    pub fn get<Q>(&self, key: &Q) -> Option<&CacheEntry<K, V>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.map.get(key).map(|slot| &slot.entry)
    }

    /// Returns `true` if `key` has an entry, live or stale.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// The policy index held by the entry of `key`.
    pub fn index_of<Q>(&self, key: &Q) -> Option<Index>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.map.get(key).map(|slot| slot.index)
    }

    /// Iterate over the live entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry<K, V>> {
        self.map.values().map(|slot| &slot.entry)
    }

    /// Record a successful read of `key` and return a snapshot of its entry.
    pub fn touch<Q>(&mut self, key: &Q, now: u64) -> Option<CacheEntry<K, V>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let slot = self.map.get_mut(key)?;
        slot.entry.access(now);
        self.policy.touch(slot.index);
        Some(slot.entry.clone())
    }

    /// Insert or replace the value of `key`, evicting entries as needed to stay within the limits.
    ///
    /// `record_access` stamps the last access time on a replaced entry. Explicit writes pass `true`, writes merged from
    /// a load pass `false`.
    pub fn put(
        &mut self,
        key: K,
        value: Arc<V>,
        attrs: &EntryAttributes,
        expires: Option<u64>,
        now: u64,
        record_access: bool,
    ) -> PutOutcome<K, V> {
        if !self.admits(attrs.size) {
            // Never fits, drop the previous value too so the store does not serve a stale one.
            let old = self.remove(&key);
            let mut new = CacheEntry::new(key, value, attrs, expires, now);
            if let Some(old) = old.as_ref() {
                new.created = old.created;
                new.version = old.version + 1;
            }
            tracing::trace!("[store]: entry {:?} exceeds the limits, evicted immediately", new.key);
            return PutOutcome {
                old,
                evicted: vec![new.clone()],
                new,
            };
        }

        let mut evicted = vec![];

        let (old, new) = match self.map.get_mut(&key) {
            Some(slot) => {
                let old = slot.entry.clone();
                slot.entry.update(value, attrs, expires, now);
                if record_access {
                    slot.entry.accessed = now.max(slot.entry.accessed);
                }
                self.volume = self.volume - old.size as u128 + attrs.size as u128;
                if !self.policy.update(slot.index, key.clone()) {
                    tracing::warn!("[store]: stale policy index {:?} of key {key:?}, re-adding", slot.index);
                    slot.index = self.policy.add(key.clone());
                }
                (Some(old), slot.entry.clone())
            }
            None => {
                while self.exceeds(self.max_entries.saturating_sub(1), self.max_volume.saturating_sub(attrs.size)) {
                    match self.evict_one() {
                        Some(entry) => evicted.push(entry),
                        None => break,
                    }
                }
                let entry = CacheEntry::new(key.clone(), value, attrs, expires, now);
                let new = entry.clone();
                let index = self.policy.add(key.clone());
                self.volume += attrs.size as u128;
                self.map.insert(key, Slot { entry, index });
                (None, new)
            }
        };

        // A replacement may have grown the volume.
        evicted.extend(self.trim_to(self.max_entries, self.max_volume));

        self.check_consistency();

        PutOutcome { old, new, evicted }
    }

    /// Remove the entry of `key`.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<CacheEntry<K, V>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let slot = self.map.remove(key)?;
        let removed = self.policy.remove(slot.index);
        strict_assert!(removed.is_some());
        self.volume -= slot.entry.size as u128;
        Some(slot.entry)
    }

    /// Remove all entries matching `predicate`.
    pub fn remove_if<F>(&mut self, mut predicate: F) -> Vec<CacheEntry<K, V>>
    where
        F: FnMut(&CacheEntry<K, V>) -> bool,
    {
        let keys = self
            .map
            .values()
            .filter(|slot| predicate(&slot.entry))
            .map(|slot| slot.entry.key.clone())
            .collect::<Vec<_>>();
        keys.iter().filter_map(|key| self.remove(key)).collect()
    }

    /// Remove all entries and return them, in eviction order where the policy has one.
    pub fn clear(&mut self) -> Vec<CacheEntry<K, V>> {
        let keys = self.policy.clear();
        let mut entries = keys
            .iter()
            .filter_map(|key| self.map.remove(key))
            .map(|slot| slot.entry)
            .collect::<Vec<_>>();
        strict_assert!(self.map.is_empty());
        entries.extend(self.map.drain().map(|(_, slot)| slot.entry));
        self.volume = 0;
        entries
    }

    /// Evict entries in policy order until the store holds at most `max_entries` entries and `max_volume` volume.
    pub fn trim_to(&mut self, max_entries: usize, max_volume: u64) -> Vec<CacheEntry<K, V>> {
        let mut evicted = vec![];
        while self.exceeds(max_entries, max_volume) {
            match self.evict_one() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    /// Change the limits and evict what no longer fits.
    pub fn set_limits(&mut self, max_entries: usize, max_volume: u64) -> Vec<CacheEntry<K, V>> {
        self.max_entries = max_entries;
        self.max_volume = max_volume;
        self.trim_to(max_entries, max_volume)
    }

    fn admits(&self, size: u64) -> bool {
        self.max_entries > 0 && size <= self.max_volume
    }

    fn exceeds(&self, max_entries: usize, max_volume: u64) -> bool {
        self.map.len() > max_entries || self.volume > max_volume as u128
    }

    fn evict_one(&mut self) -> Option<CacheEntry<K, V>> {
        loop {
            let key = self.policy.evict_next()?;
            match self.map.remove(&key) {
                Some(slot) => {
                    self.volume -= slot.entry.size as u128;
                    tracing::trace!("[store]: evict {key:?}");
                    return Some(slot.entry);
                }
                None => {
                    strict_assert!(false, "policy evicted unknown key {key:?}");
                    tracing::warn!("[store]: policy evicted unknown key {key:?}");
                }
            }
        }
    }

    fn check_consistency(&self) {
        strict_assert_eq!(self.map.len(), self.policy.len());
        #[cfg(feature = "strict_assertions")]
        for (key, slot) in self.map.iter() {
            assert_eq!(self.policy.peek(slot.index), Some(key));
        }
    }
}
