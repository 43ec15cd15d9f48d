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

use std::{fmt::Debug, sync::Arc, time::Duration};

/// Per-write attributes of a cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryAttributes {
    /// Time to live of the entry. `None` falls back to the default timeout of the cache.
    pub timeout: Option<Duration>,
    /// Load cost hint.
    pub cost: f64,
    /// Footprint hint, accounted against the volume limit of the cache.
    pub size: u64,
}

impl Default for EntryAttributes {
    fn default() -> Self {
        Self {
            timeout: None,
            cost: 0.0,
            size: 1,
        }
    }
}

impl EntryAttributes {
    /// Set the time to live.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the load cost hint.
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Set the footprint hint.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }
}

/// One key/value mapping of the cache with its metadata.
///
/// All timestamps are milliseconds taken from the clock of the cache.
///
/// The entries handed out by the cache are snapshots. They share the value with the stored entry, but the metadata
/// reflects the moment the snapshot was taken.
pub struct CacheEntry<K, V> {
    pub(crate) key: K,
    pub(crate) value: Arc<V>,

    pub(crate) created: u64,
    pub(crate) accessed: u64,
    pub(crate) updated: u64,
    pub(crate) expires: Option<u64>,

    pub(crate) hits: u64,
    pub(crate) cost: f64,
    pub(crate) size: u64,
    pub(crate) version: u64,
}

impl<K, V> Clone for CacheEntry<K, V>
where
    K: Clone,
{
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
            created: self.created,
            accessed: self.accessed,
            updated: self.updated,
            expires: self.expires,
            hits: self.hits,
            cost: self.cost,
            size: self.size,
            version: self.version,
        }
    }
}

impl<K, V> Debug for CacheEntry<K, V>
where
    K: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("created", &self.created)
            .field("accessed", &self.accessed)
            .field("updated", &self.updated)
            .field("expires", &self.expires)
            .field("hits", &self.hits)
            .field("cost", &self.cost)
            .field("size", &self.size)
            .field("version", &self.version)
            .finish()
    }
}

impl<K, V> CacheEntry<K, V> {
    pub(crate) fn new(key: K, value: Arc<V>, attrs: &EntryAttributes, expires: Option<u64>, now: u64) -> Self {
        Self {
            key,
            value,
            created: now,
            accessed: now,
            updated: now,
            expires,
            hits: 0,
            cost: attrs.cost,
            size: attrs.size,
            version: 1,
        }
    }

    /// Replace the value in place, keeping the creation time.
    pub(crate) fn update(&mut self, value: Arc<V>, attrs: &EntryAttributes, expires: Option<u64>, now: u64) {
        self.value = value;
        self.updated = now.max(self.created);
        self.expires = expires;
        self.cost = attrs.cost;
        self.size = attrs.size;
        self.version += 1;
    }

    /// Record an access.
    pub(crate) fn access(&mut self, now: u64) {
        self.accessed = now.max(self.accessed);
        self.hits += 1;
    }

    /// Key of the entry.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Value of the entry.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Shared value of the entry.
    pub fn value_arc(&self) -> &Arc<V> {
        &self.value
    }

    /// Time of the first write of the key.
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Time of the last recorded access.
    pub fn accessed(&self) -> u64 {
        self.accessed
    }

    /// Time of the last write of the value.
    pub fn updated(&self) -> u64 {
        self.updated
    }

    /// Absolute expiration time, `None` if the entry never expires by time.
    pub fn expires(&self) -> Option<u64> {
        self.expires
    }

    /// Count of recorded reads.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Load cost hint.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Size accounted against the volume limit.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Starts at 1 and grows on every value replacement of the same key.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Consume the entry and return its key and shared value.
    pub fn into_parts(self) -> (K, Arc<V>) {
        (self.key, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_update_bumps_version() {
        let attrs = EntryAttributes::default();
        let mut entry = CacheEntry::new(1u64, Arc::new("a".to_string()), &attrs, None, 100);
        assert_eq!(entry.version(), 1);
        assert_eq!(entry.size(), 1);

        entry.access(120);
        entry.update(Arc::new("b".to_string()), &attrs.clone().with_size(4), Some(300), 150);

        assert_eq!(entry.value(), "b");
        assert_eq!(entry.version(), 2);
        assert_eq!(entry.hits(), 1);
        assert_eq!(entry.created(), 100);
        assert_eq!(entry.accessed(), 120);
        assert_eq!(entry.updated(), 150);
        assert_eq!(entry.expires(), Some(300));
        assert_eq!(entry.size(), 4);
    }

    #[test]
    fn test_entry_clock_skew() {
        let attrs = EntryAttributes::default();
        let mut entry = CacheEntry::new(1u64, Arc::new(()), &attrs, None, 100);
        entry.update(Arc::new(()), &attrs, None, 50);
        assert!(entry.updated() >= entry.created());
    }
}
