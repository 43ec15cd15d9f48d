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

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use cachet_common::{event::Origin, metrics::Metrics};
use serde::{Deserialize, Serialize};

use crate::{
    entry::CacheEntry,
    hook::{HookToken, MutationHook, Operation, Outcome},
};

/// Point-in-time copy of the statistics of a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    /// Reads that found a live entry.
    pub hits: u64,
    /// Reads that found no live entry.
    pub misses: u64,
    /// Misses caused by a stale entry, included in `misses`.
    pub expired_misses: u64,
    /// Explicit writes.
    pub puts: u64,
    /// Writes merged from loads.
    pub loads: u64,
    /// Writes that replaced a present value.
    pub replaces: u64,
    /// Entries removed explicitly.
    pub removes: u64,
    /// Entries evicted by the replacement policy.
    pub evictions: u64,
    /// Entries removed because they expired.
    pub expirations: u64,
    /// Calls of `clear`.
    pub clears: u64,
    /// Calls of `trim` and `resize`.
    pub trims: u64,
    /// Calls of `purge`.
    pub purges: u64,
}

impl StatisticsSnapshot {
    /// `hits / (hits + misses)`, `0.0` without any read.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired_misses: AtomicU64,
    puts: AtomicU64,
    loads: AtomicU64,
    replaces: AtomicU64,
    removes: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    clears: AtomicU64,
    trims: AtomicU64,
    purges: AtomicU64,
}

/// Mutation hook maintaining the statistics of the cache.
///
/// Registered at [`crate::hook::Stage::Statistics`]. Every count is mirrored into the `metrics` handles of the cache.
#[derive(Debug)]
pub struct StatisticsHook {
    counters: Counters,
    metrics: Arc<Metrics>,
}

impl StatisticsHook {
    /// Create zeroed statistics mirrored into `metrics`.
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            counters: Counters::default(),
            metrics,
        }
    }

    /// Copy the current counters. Counters are read independently.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let c = &self.counters;
        StatisticsSnapshot {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            expired_misses: c.expired_misses.load(Ordering::Relaxed),
            puts: c.puts.load(Ordering::Relaxed),
            loads: c.loads.load(Ordering::Relaxed),
            replaces: c.replaces.load(Ordering::Relaxed),
            removes: c.removes.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            expirations: c.expirations.load(Ordering::Relaxed),
            clears: c.clears.load(Ordering::Relaxed),
            trims: c.trims.load(Ordering::Relaxed),
            purges: c.purges.load(Ordering::Relaxed),
        }
    }

    fn written<K, V>(&self, origin: Origin, old: Option<&CacheEntry<K, V>>, evicted: usize) {
        match origin {
            Origin::User => {
                self.counters.puts.fetch_add(1, Ordering::Relaxed);
                self.metrics.put.increment(1);
            }
            Origin::Loader => {
                self.counters.loads.fetch_add(1, Ordering::Relaxed);
                self.metrics.load.increment(1);
            }
        }
        if old.is_some() {
            self.replaced();
        }
        self.evicted(evicted);
    }

    fn replaced(&self) {
        self.counters.replaces.fetch_add(1, Ordering::Relaxed);
        self.metrics.replace.increment(1);
    }

    fn removed(&self, count: usize) {
        self.counters.removes.fetch_add(count as u64, Ordering::Relaxed);
        self.metrics.remove.increment(count as u64);
    }

    fn evicted(&self, count: usize) {
        self.counters.evictions.fetch_add(count as u64, Ordering::Relaxed);
        self.metrics.evict.increment(count as u64);
    }

    fn expired(&self, count: usize) {
        self.counters.expirations.fetch_add(count as u64, Ordering::Relaxed);
        self.metrics.expire.increment(count as u64);
    }
}

impl<K, V> MutationHook<K, V> for StatisticsHook {
    fn name(&self) -> &str {
        "statistics"
    }

    fn after(&self, token: &HookToken, outcome: &Outcome<'_, K, V>) -> anyhow::Result<()> {
        let c = &self.counters;
        match outcome {
            Outcome::Clear { removed } => {
                c.clears.fetch_add(1, Ordering::Relaxed);
                self.metrics.clear.increment(1);
                self.removed(removed.len());
            }
            Outcome::Put {
                origin, old, evicted, ..
            } => self.written(*origin, *old, evicted.len()),
            Outcome::PutAll { origin, puts } => {
                for put in puts.iter() {
                    self.written(*origin, put.old.as_ref(), put.evicted.len());
                }
            }
            Outcome::Remove { removed, .. } => self.removed(removed.iter().count()),
            Outcome::RemoveAll { removed } => self.removed(removed.len()),
            Outcome::Replace { evicted, .. } => {
                self.replaced();
                self.evicted(evicted.len());
            }
            Outcome::Trim { evicted } => {
                c.trims.fetch_add(1, Ordering::Relaxed);
                self.evicted(evicted.len());
            }
            Outcome::Purge { expired, evicted } => {
                c.purges.fetch_add(1, Ordering::Relaxed);
                self.expired(expired.len());
                self.evicted(evicted.len());
            }
            Outcome::Expire { expired } => self.expired(expired.len()),
            Outcome::GetHit { .. } => {
                c.hits.fetch_add(1, Ordering::Relaxed);
                self.metrics.hit.increment(1);
            }
            Outcome::GetMiss { expired, .. } => {
                c.misses.fetch_add(1, Ordering::Relaxed);
                if *expired {
                    c.expired_misses.fetch_add(1, Ordering::Relaxed);
                }
                self.metrics.miss.increment(1);
            }
        }

        let elapsed = token.elapsed().as_secs_f64();
        match token.operation() {
            Operation::Get => self.metrics.get_duration.record(elapsed),
            Operation::Put | Operation::PutAll | Operation::Replace => self.metrics.put_duration.record(elapsed),
            Operation::Remove | Operation::RemoveAll => self.metrics.remove_duration.record(elapsed),
            _ => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cachet_common::clock::MockClock;

    use super::*;
    use crate::{
        entry::EntryAttributes,
        hook::{HookChain, LogErrorHandler, Stage},
    };

    fn entry(key: u64) -> CacheEntry<u64, u64> {
        CacheEntry::new(key, Arc::new(key), &EntryAttributes::default(), None, 0)
    }

    #[test]
    fn test_statistics_hook() {
        let hook = Arc::new(StatisticsHook::new(Arc::new(Metrics::noop())));
        let chain: HookChain<u64, u64> = HookChain::new(
            vec![(Stage::Statistics, hook.clone() as Arc<dyn MutationHook<u64, u64>>)],
            Arc::new(MockClock::default()),
            Arc::new(LogErrorHandler),
            Arc::new(Metrics::noop()),
        );

        let (e1, e2, e3) = (entry(1), entry(2), entry(3));

        let token = chain.before(Operation::Put);
        chain.after(
            &token,
            &Outcome::Put {
                origin: Origin::User,
                old: None,
                new: &e1,
                evicted: std::slice::from_ref(&e2),
            },
        );
        chain.after(
            &token,
            &Outcome::Put {
                origin: Origin::Loader,
                old: Some(&e1),
                new: &e1,
                evicted: &[],
            },
        );

        let token = chain.before(Operation::Get);
        chain.after(&token, &Outcome::GetHit { entry: &e1 });
        chain.after(&token, &Outcome::GetMiss { key: &4, expired: true });
        chain.after(&token, &Outcome::GetMiss { key: &5, expired: false });

        let token = chain.before(Operation::Purge);
        chain.after(
            &token,
            &Outcome::Purge {
                expired: std::slice::from_ref(&e3),
                evicted: &[],
            },
        );

        let token = chain.before(Operation::Remove);
        chain.after(&token, &Outcome::Remove { key: &9, removed: None });
        chain.after(&token, &Outcome::Remove { key: &1, removed: Some(&e1) });

        let snapshot = hook.snapshot();
        assert_eq!(
            snapshot,
            StatisticsSnapshot {
                hits: 1,
                misses: 2,
                expired_misses: 1,
                puts: 1,
                loads: 1,
                replaces: 1,
                removes: 1,
                evictions: 1,
                expirations: 1,
                clears: 0,
                trims: 0,
                purges: 1,
            }
        );
        assert!((snapshot.hit_ratio() - 1.0 / 3.0).abs() < f64::EPSILON);
    }
}
