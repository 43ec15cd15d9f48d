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

use crate::entry::CacheEntry;

/// Decides whether a cache entry is stale.
///
/// Expiration is checked lazily on reads and eagerly by the expiration sweep of the cache.
pub trait ExpirationPolicy<K, V>: Send + Sync + 'static {
    /// Absolute expiration time stamped on a write at `now`.
    ///
    /// `timeout` is the per-write timeout, `None` if the write did not ask for one.
    fn expiration_time(&self, now: u64, timeout: Option<Duration>) -> Option<u64>;

    /// Returns `true` if the entry is stale at `now`.
    fn is_expired(&self, entry: &CacheEntry<K, V>, now: u64) -> bool {
        entry.expires().is_some_and(|expires| now >= expires)
    }

    /// The time the entry is known to expire at, `None` for never.
    fn next_expiration_time(&self, entry: &CacheEntry<K, V>) -> Option<u64> {
        entry.expires()
    }
}

fn deadline(now: u64, timeout: Duration) -> u64 {
    now.saturating_add(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
}

/// Expires entries at the absolute time stamped on write, from the per-write timeout or the default one.
#[derive(Debug, Clone, Default)]
pub struct TimeoutExpiration {
    default_timeout: Option<Duration>,
}

impl TimeoutExpiration {
    /// Entries written without a timeout expire after `default_timeout`, or never if it is `None`.
    pub fn new(default_timeout: Option<Duration>) -> Self {
        Self { default_timeout }
    }

    /// Timeout applied to the entries written without one.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }
}

impl<K, V> ExpirationPolicy<K, V> for TimeoutExpiration {
    fn expiration_time(&self, now: u64, timeout: Option<Duration>) -> Option<u64> {
        timeout.or(self.default_timeout).map(|timeout| deadline(now, timeout))
    }
}

/// Filter deciding entry staleness, called with the entry and the current time.
pub type ExpirationPredicate<K, V> = Arc<dyn Fn(&CacheEntry<K, V>, u64) -> bool + Send + Sync + 'static>;

/// Expires entries rejected by an injected filter, in addition to the stamped expiration times.
///
/// The filter is only evaluated when an entry is checked, so [`ExpirationPolicy::next_expiration_time`] only knows
/// about the stamped time.
pub struct PredicateExpiration<K, V> {
    timeout: TimeoutExpiration,
    predicate: ExpirationPredicate<K, V>,
}

impl<K, V> Debug for PredicateExpiration<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateExpiration")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<K, V> PredicateExpiration<K, V> {
    /// Expire entries after `default_timeout` or once `predicate` returns `true`, whichever comes first.
    pub fn new<F>(default_timeout: Option<Duration>, predicate: F) -> Self
    where
        F: Fn(&CacheEntry<K, V>, u64) -> bool + Send + Sync + 'static,
    {
        Self {
            timeout: TimeoutExpiration::new(default_timeout),
            predicate: Arc::new(predicate),
        }
    }
}

impl<K, V> ExpirationPolicy<K, V> for PredicateExpiration<K, V>
where
    K: 'static,
    V: 'static,
{
    fn expiration_time(&self, now: u64, timeout: Option<Duration>) -> Option<u64> {
        <TimeoutExpiration as ExpirationPolicy<K, V>>::expiration_time(&self.timeout, now, timeout)
    }

    fn is_expired(&self, entry: &CacheEntry<K, V>, now: u64) -> bool {
        entry.expires().is_some_and(|expires| now >= expires) || (self.predicate)(entry, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryAttributes;

    fn entry(expires: Option<u64>, now: u64) -> CacheEntry<u64, u64> {
        CacheEntry::new(1, Arc::new(1), &EntryAttributes::default(), expires, now)
    }

    #[test]
    fn test_timeout_expiration() {
        let policy = TimeoutExpiration::new(Some(Duration::from_millis(100)));
        let policy: &dyn ExpirationPolicy<u64, u64> = &policy;

        assert_eq!(policy.expiration_time(1000, None), Some(1100));
        assert_eq!(policy.expiration_time(1000, Some(Duration::from_millis(1))), Some(1001));
        assert_eq!(policy.expiration_time(u64::MAX - 1, None), Some(u64::MAX));

        let e = entry(policy.expiration_time(1000, None), 1000);
        assert!(!policy.is_expired(&e, 1099));
        assert!(policy.is_expired(&e, 1100));
        assert_eq!(policy.next_expiration_time(&e), Some(1100));
    }

    #[test]
    fn test_never_expires() {
        let policy = TimeoutExpiration::default();
        let policy: &dyn ExpirationPolicy<u64, u64> = &policy;
        assert_eq!(policy.expiration_time(1000, None), None);
        assert!(!policy.is_expired(&entry(None, 0), u64::MAX));
    }

    #[test]
    fn test_predicate_expiration() {
        let policy = PredicateExpiration::new(None, |entry: &CacheEntry<u64, u64>, now| now - entry.accessed() > 10);

        assert_eq!(policy.expiration_time(1000, None), None);
        assert_eq!(policy.expiration_time(1000, Some(Duration::from_millis(5))), Some(1005));

        let e = entry(None, 100);
        assert!(!policy.is_expired(&e, 110));
        assert!(policy.is_expired(&e, 111));

        // Stamped times are still honored.
        let e = entry(Some(105), 100);
        assert!(policy.is_expired(&e, 105));
        assert_eq!(policy.next_expiration_time(&e), Some(105));
    }
}
