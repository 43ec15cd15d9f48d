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

use std::{
    fmt::Debug,
    future::Future,
    hash::Hash,
    ops::ControlFlow,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::{Duration, Instant},
};

use cachet_common::{
    clock::Clock,
    code::{Key, Value},
    error::{Error, ErrorKind, Result},
    event::Origin,
    metrics::Metrics,
    spawn::Executor,
};
use equivalent::Equivalent;
use futures::{future::try_join_all, FutureExt};
use hashbrown::HashMap;
use itertools::Itertools;
use parking_lot::RwLock;
use pin_project::pin_project;

use crate::{
    entry::{CacheEntry, EntryAttributes},
    expiration::ExpirationPolicy,
    hook::{HookChain, Operation, Outcome},
    loader::{Load, LoadContext, LoadResult, Loader, LoaderCoordinator},
    state::{RunState, State},
    statistics::{StatisticsHook, StatisticsSnapshot},
    store::{EntryStore, PutOutcome},
};

/// Parts of a cache engine, assembled by [`crate::builder::CacheBuilder`].
pub(crate) struct EngineParts<K, V> {
    pub name: String,
    pub store: EntryStore<K, V>,
    pub expiration: Arc<dyn ExpirationPolicy<K, V>>,
    pub hooks: HookChain<K, V>,
    pub statistics: Arc<StatisticsHook>,
    pub loader: Option<Arc<dyn Loader<K, V>>>,
    pub executor: Arc<dyn Executor>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<Metrics>,
    pub sweep_interval: Option<Duration>,
}

struct Inner<K, V> {
    name: String,

    store: RwLock<EntryStore<K, V>>,
    expiration: Arc<dyn ExpirationPolicy<K, V>>,
    hooks: HookChain<K, V>,
    statistics: Arc<StatisticsHook>,

    coordinator: Arc<LoaderCoordinator<K, V>>,
    loader: Option<Arc<dyn Loader<K, V>>>,

    state: Arc<RunState>,
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    sweep_interval: Option<Duration>,
}

enum Lookup<K, V> {
    Hit(CacheEntry<K, V>),
    Miss,
}

impl<K, V> Inner<K, V>
where
    K: Key,
    V: Value,
{
    /// Check availability, starting the engine on first use.
    fn running(self: &Arc<Self>, strict: bool) -> Result<bool> {
        let res = self.state.is_running_lazy_start(strict, || self.start_background());
        if !matches!(res, Ok(true)) {
            // A failed start leaves nothing to drain.
            self.coordinator.state_may_drain();
        }
        res
    }

    fn start_background(self: &Arc<Self>) -> Result<()> {
        let Some(interval) = self.sweep_interval else {
            return Ok(());
        };

        let weak = Arc::downgrade(self);
        let name = self.name.clone();
        self.executor
            .spawn_periodic(
                interval,
                Box::new(move || {
                    let Some(inner) = weak.upgrade().filter(|inner| !inner.state.is_at_least(State::Shutdown)) else {
                        tracing::debug!("[engine]: sweeper of {name} exits");
                        return ControlFlow::Break(());
                    };
                    let expired = inner.expire();
                    if expired > 0 {
                        tracing::trace!("[engine]: sweep of {name} expired {expired} entries");
                    }
                    ControlFlow::Continue(())
                }),
            )
            .map_err(|e| e.with_context("task", "sweeper"))
    }

    fn record_usage(&self, store: &EntryStore<K, V>) {
        self.metrics.entries.set(store.len() as f64);
        self.metrics.volume.set(store.volume() as f64);
    }

    fn is_live(&self, entry: &CacheEntry<K, V>, now: u64) -> bool {
        !self.expiration.is_expired(entry, now)
    }

    /// Read `key`, removing it if it turns out to be stale. Fires the hit or miss outcome.
    fn lookup(&self, key: &K) -> Lookup<K, V> {
        let token = self.hooks.before(Operation::Get);
        let now = self.clock.now();

        let (hit, expired) = {
            let mut store = self.store.write();
            match store.get(key).map(|entry| self.is_live(entry, now)) {
                Some(true) => (store.touch(key, now), None),
                Some(false) => {
                    let expired = store.remove(key);
                    self.record_usage(&store);
                    (None, expired)
                }
                None => (None, None),
            }
        };

        if let Some(expired) = expired.as_ref() {
            self.hooks.after(
                &token,
                &Outcome::Expire {
                    expired: std::slice::from_ref(expired),
                },
            );
        }

        match hit {
            Some(entry) => {
                self.hooks.after(&token, &Outcome::GetHit { entry: &entry });
                Lookup::Hit(entry)
            }
            None => {
                self.hooks.after(
                    &token,
                    &Outcome::GetMiss {
                        key,
                        expired: expired.is_some(),
                    },
                );
                Lookup::Miss
            }
        }
    }

    /// Live entry of `key` without side effects.
    fn live(&self, key: &K) -> Option<CacheEntry<K, V>> {
        let now = self.clock.now();
        self.store
            .read()
            .get(key)
            .filter(|entry| self.is_live(entry, now))
            .cloned()
    }

    fn write(&self, key: K, value: Arc<V>, attrs: &EntryAttributes, origin: Origin) -> PutOutcome<K, V> {
        let token = self.hooks.before(Operation::Put);
        let now = self.clock.now();
        let expires = self.expiration.expiration_time(now, attrs.timeout);

        let outcome = {
            let mut store = self.store.write();
            let outcome = store.put(key, value, attrs, expires, now, origin == Origin::User);
            self.record_usage(&store);
            outcome
        };

        self.hooks.after(
            &token,
            &Outcome::Put {
                origin,
                old: outcome.old.as_ref(),
                new: &outcome.new,
                evicted: &outcome.evicted,
            },
        );
        outcome
    }

    /// Remove the expired entries.
    fn expire(&self) -> usize {
        let token = self.hooks.before(Operation::Expire);
        let now = self.clock.now();

        let expired = {
            let mut store = self.store.write();
            let expired = store.remove_if(|entry| self.expiration.is_expired(entry, now));
            self.record_usage(&store);
            expired
        };

        self.hooks.after(&token, &Outcome::Expire { expired: &expired });
        expired.len()
    }

    /// Attach to the load of `key`, or start one written with `attrs` unless the loader changes them.
    fn load(self: &Arc<Self>, key: &K, attrs: EntryAttributes, forced: bool) -> Result<Load<K, V>> {
        let Some(loader) = self.loader.clone() else {
            return Err(Error::new(ErrorKind::Config, "no loader configured").with_context("cache", &self.name));
        };

        let inner = self.clone();
        let k = key.clone();
        self.coordinator.load(key, move |cancelled| {
            async move {
                let ctx = LoadContext::new(attrs, forced, inner.executor.clone(), cancelled);

                let started = Instant::now();
                let res = loader.load(&k, ctx.clone()).await;
                inner.metrics.load_duration.record(started.elapsed().as_secs_f64());

                match res {
                    Ok(Some(value)) => {
                        let outcome = inner.write(k, Arc::new(value), &ctx.attributes(), Origin::Loader);
                        Ok(Some(outcome.new))
                    }
                    Ok(None) => Ok(None),
                    Err(e) => {
                        inner.metrics.load_failure.increment(1);
                        Err(Error::loader(e)
                            .with_context("cache", &inner.name)
                            .with_context("key", format!("{k:?}")))
                    }
                }
            }
            .boxed()
        })
    }
}

/// The cache entry engine.
///
/// Stores entries under a pluggable replacement policy and expiration policy, deduplicates the concurrent loads of
/// missing values, and brackets every mutation with the hook chain.
///
/// All mutations are serialized by one lock around the store. Hooks and listeners run after the lock is released, on
/// the mutating thread. Loads run on the executor of the cache, never under the lock.
///
/// Operations that need the cache (reads that count, writes, loads) fail with [`ErrorKind::Unavailable`] once the
/// cache is shut down. Maintenance operations and side-effect free reads quietly do nothing instead. The first
/// operation starts the cache if [`CacheEngine::start`] was never called.
pub struct CacheEngine<K, V>
where
    K: Key,
    V: Value,
{
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for CacheEngine<K, V>
where
    K: Key,
    V: Value,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> Debug for CacheEngine<K, V>
where
    K: Key,
    V: Value,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("name", &self.inner.name)
            .field("state", &self.inner.state.get())
            .field("store", &*self.inner.store.read())
            .field("coordinator", &self.inner.coordinator)
            .field("hooks", &self.inner.hooks)
            .finish()
    }
}

impl<K, V> CacheEngine<K, V>
where
    K: Key,
    V: Value,
{
    pub(crate) fn new(parts: EngineParts<K, V>) -> Self {
        let state = Arc::new(RunState::new());
        let coordinator = Arc::new(LoaderCoordinator::new(parts.executor.clone(), state.clone()));
        parts.metrics.entries.set(parts.store.len() as f64);
        parts.metrics.volume.set(parts.store.volume() as f64);
        let inner = Inner {
            name: parts.name,
            store: RwLock::new(parts.store),
            expiration: parts.expiration,
            hooks: parts.hooks,
            statistics: parts.statistics,
            coordinator,
            loader: parts.loader,
            state,
            executor: parts.executor,
            clock: parts.clock,
            metrics: parts.metrics,
            sweep_interval: parts.sweep_interval,
        };
        Self { inner: Arc::new(inner) }
    }

    /// Name of the cache.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Start the cache. Idempotent.
    ///
    /// Submits the background expiration sweep to the executor if a sweep interval is configured. A failed start is
    /// terminal: the cache moves to [`State::Shutdown`] and the error is returned.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::start"))]
    pub fn start(&self) -> Result<()> {
        self.inner.running(true).map(|_| ())
    }

    /// Get the value of `key`.
    ///
    /// The returned future is ready right away on a hit. On a miss it waits for the single-flight load of the key,
    /// or resolves to `None` if the cache has no loader. A stale entry found on the way is removed and counted as an
    /// expired miss.
    pub fn get(&self, key: &K) -> Get<K, V> {
        self.get_with(key, EntryAttributes::default())
    }

    /// Get the value of `key`, loading it with `attrs` on a miss.
    ///
    /// `attrs` only apply if this call starts the load. A caller joining a pending load gets the entry written by it.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::get_with"))]
    pub fn get_with(&self, key: &K, attrs: EntryAttributes) -> Get<K, V> {
        if let Err(e) = self.inner.running(true) {
            return Get::Ready(Some(Err(e)));
        }
        match self.inner.lookup(key) {
            Lookup::Hit(entry) => Get::Ready(Some(Ok(Some(entry)))),
            Lookup::Miss if self.inner.loader.is_none() => Get::Ready(Some(Ok(None))),
            Lookup::Miss => match self.inner.load(key, attrs, false) {
                Ok(load) => Get::Load(load),
                Err(e) => Get::Ready(Some(Err(e))),
            },
        }
    }

    /// Blocking variant of [`CacheEngine::get`].
    ///
    /// Parks the calling thread until the load completes. Must not be called from an asynchronous context.
    pub fn get_blocking(&self, key: &K) -> LoadResult<K, V> {
        futures::executor::block_on(self.get(key))
    }

    /// Get the value of `key` if it is cached, never loading it.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::get_if_present"))]
    pub fn get_if_present(&self, key: &K) -> Result<Option<CacheEntry<K, V>>> {
        self.inner.running(true)?;
        match self.inner.lookup(key) {
            Lookup::Hit(entry) => Ok(Some(entry)),
            Lookup::Miss => Ok(None),
        }
    }

    /// Get the live entry of `key` without recording an access.
    ///
    /// `None` if the cache is not available.
    pub fn peek<Q>(&self, key: &Q) -> Option<CacheEntry<K, V>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        if !self.inner.running(false).unwrap_or(false) {
            return None;
        }
        let now = self.inner.clock.now();
        self.inner
            .store
            .read()
            .get(key)
            .filter(|entry| self.inner.is_live(entry, now))
            .cloned()
    }

    /// Returns `true` if `key` has a live entry. `false` if the cache is not available.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        if !self.inner.running(false).unwrap_or(false) {
            return false;
        }
        let now = self.inner.clock.now();
        self.inner
            .store
            .read()
            .get(key)
            .is_some_and(|entry| self.inner.is_live(entry, now))
    }

    /// Put `value` for `key` with the default attributes and return the written entry.
    pub fn put(&self, key: K, value: V) -> Result<CacheEntry<K, V>> {
        self.put_with(key, value, EntryAttributes::default())
    }

    /// Put `value` for `key` and return the written entry.
    ///
    /// The written entry may have been evicted right away if it does not fit the limits of the cache.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::put_with"))]
    pub fn put_with(&self, key: K, value: V, attrs: EntryAttributes) -> Result<CacheEntry<K, V>> {
        self.inner.running(true)?;
        let outcome = self.inner.write(key, Arc::new(value), &attrs, Origin::User);
        Ok(outcome.new)
    }

    /// Put `value` for `key` unless it has a live entry.
    ///
    /// Returns the present entry, or `None` if the value has been written.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::put_if_absent"))]
    pub fn put_if_absent(&self, key: K, value: V) -> Result<Option<CacheEntry<K, V>>> {
        self.inner.running(true)?;

        let inner = &self.inner;
        let token = inner.hooks.before(Operation::Put);
        let now = inner.clock.now();
        let attrs = EntryAttributes::default();

        let (expired, outcome) = {
            let mut store = inner.store.write();
            let expired = match store.get(&key).map(|entry| inner.is_live(entry, now)) {
                Some(true) => return Ok(store.get(&key).cloned()),
                Some(false) => store.remove(&key),
                None => None,
            };
            let expires = inner.expiration.expiration_time(now, attrs.timeout);
            let outcome = store.put(key, Arc::new(value), &attrs, expires, now, true);
            inner.record_usage(&store);
            (expired, outcome)
        };

        if let Some(expired) = expired.as_ref() {
            inner.hooks.after(
                &token,
                &Outcome::Expire {
                    expired: std::slice::from_ref(expired),
                },
            );
        }
        inner.hooks.after(
            &token,
            &Outcome::Put {
                origin: Origin::User,
                old: outcome.old.as_ref(),
                new: &outcome.new,
                evicted: &outcome.evicted,
            },
        );
        Ok(None)
    }

    /// Put a batch of values under one lock.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::put_all"))]
    pub fn put_all<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.inner.running(true)?;

        let inner = &self.inner;
        let token = inner.hooks.before(Operation::PutAll);
        let now = inner.clock.now();
        let attrs = EntryAttributes::default();
        let expires = inner.expiration.expiration_time(now, attrs.timeout);

        let puts = {
            let mut store = inner.store.write();
            let puts = entries
                .into_iter()
                .map(|(key, value)| store.put(key, Arc::new(value), &attrs, expires, now, true))
                .collect_vec();
            inner.record_usage(&store);
            puts
        };

        inner.hooks.after(
            &token,
            &Outcome::PutAll {
                origin: Origin::User,
                puts: &puts,
            },
        );
        Ok(())
    }

    /// Replace the value of `key` only if it has a live entry. Returns the replaced entry.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::replace"))]
    pub fn replace(&self, key: K, value: V) -> Result<Option<CacheEntry<K, V>>> {
        self.inner.running(true)?;

        let inner = &self.inner;
        let token = inner.hooks.before(Operation::Replace);
        let now = inner.clock.now();
        let attrs = EntryAttributes::default();

        let res = {
            let mut store = inner.store.write();
            let res = match store.get(&key).map(|entry| inner.is_live(entry, now)) {
                Some(true) => {
                    let expires = inner.expiration.expiration_time(now, attrs.timeout);
                    Ok(store.put(key, Arc::new(value), &attrs, expires, now, true))
                }
                Some(false) => Err(store.remove(&key)),
                None => Err(None),
            };
            inner.record_usage(&store);
            res
        };

        match res {
            Ok(outcome) => {
                let Some(old) = outcome.old.as_ref() else {
                    return Ok(None);
                };
                inner.hooks.after(
                    &token,
                    &Outcome::Replace {
                        old,
                        new: &outcome.new,
                        evicted: &outcome.evicted,
                    },
                );
                Ok(outcome.old)
            }
            Err(Some(expired)) => {
                inner.hooks.after(
                    &token,
                    &Outcome::Expire {
                        expired: std::slice::from_ref(&expired),
                    },
                );
                Ok(None)
            }
            Err(None) => Ok(None),
        }
    }

    /// Remove the entry of `key` and return it.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::remove"))]
    pub fn remove(&self, key: &K) -> Result<Option<CacheEntry<K, V>>> {
        self.inner.running(true)?;

        let inner = &self.inner;
        let token = inner.hooks.before(Operation::Remove);
        let removed = {
            let mut store = inner.store.write();
            let removed = store.remove(key);
            inner.record_usage(&store);
            removed
        };
        inner.hooks.after(
            &token,
            &Outcome::Remove {
                key,
                removed: removed.as_ref(),
            },
        );
        Ok(removed)
    }

    /// Remove the entries of `keys` and return the removed ones.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::remove_all"))]
    pub fn remove_all<'a, I>(&self, keys: I) -> Result<Vec<CacheEntry<K, V>>>
    where
        I: IntoIterator<Item = &'a K>,
    {
        self.inner.running(true)?;

        let inner = &self.inner;
        let token = inner.hooks.before(Operation::RemoveAll);
        let removed = {
            let mut store = inner.store.write();
            let removed = keys.into_iter().filter_map(|key| store.remove(key)).collect_vec();
            inner.record_usage(&store);
            removed
        };
        inner.hooks.after(&token, &Outcome::RemoveAll { removed: &removed });
        Ok(removed)
    }

    /// Remove all entries. No-op if the cache is not available.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::clear"))]
    pub fn clear(&self) {
        if !self.inner.running(false).unwrap_or(false) {
            return;
        }

        let inner = &self.inner;
        let token = inner.hooks.before(Operation::Clear);
        let removed = {
            let mut store = inner.store.write();
            let removed = store.clear();
            inner.record_usage(&store);
            removed
        };
        inner.hooks.after(&token, &Outcome::Clear { removed: &removed });
    }

    /// Remove all expired entries and return how many. `0` if the cache is not available.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::evict"))]
    pub fn evict(&self) -> usize {
        if !self.inner.running(false).unwrap_or(false) {
            return 0;
        }
        self.inner.expire()
    }

    /// Evict entries in policy order until at most `max_entries` remain. Returns how many were evicted.
    ///
    /// The limits of the cache are left unchanged. `0` if the cache is not available.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::trim"))]
    pub fn trim(&self, max_entries: usize) -> usize {
        if !self.inner.running(false).unwrap_or(false) {
            return 0;
        }

        let inner = &self.inner;
        let token = inner.hooks.before(Operation::Trim);
        let evicted = {
            let mut store = inner.store.write();
            let evicted = store.trim_to(max_entries, u64::MAX);
            inner.record_usage(&store);
            evicted
        };
        inner.hooks.after(&token, &Outcome::Trim { evicted: &evicted });
        evicted.len()
    }

    /// Remove all expired entries, then evict what exceeds the limits. Returns how many entries left.
    ///
    /// `0` if the cache is not available.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::purge"))]
    pub fn purge(&self) -> usize {
        if !self.inner.running(false).unwrap_or(false) {
            return 0;
        }

        let inner = &self.inner;
        let token = inner.hooks.before(Operation::Purge);
        let now = inner.clock.now();
        let (expired, evicted) = {
            let mut store = inner.store.write();
            let expired = store.remove_if(|entry| inner.expiration.is_expired(entry, now));
            let (max_entries, max_volume) = (store.max_entries(), store.max_volume());
            let evicted = store.trim_to(max_entries, max_volume);
            inner.record_usage(&store);
            (expired, evicted)
        };
        inner.hooks.after(
            &token,
            &Outcome::Purge {
                expired: &expired,
                evicted: &evicted,
            },
        );
        expired.len() + evicted.len()
    }

    /// Change the limits of the cache, evicting what no longer fits.
    ///
    /// `usize::MAX` and `u64::MAX` leave the limits unbounded. No-op if the cache is not available.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::resize"))]
    pub fn resize(&self, max_entries: usize, max_volume: u64) {
        if !self.inner.running(false).unwrap_or(false) {
            return;
        }

        let inner = &self.inner;
        let token = inner.hooks.before(Operation::Trim);
        let evicted = {
            let mut store = inner.store.write();
            let evicted = store.set_limits(max_entries, max_volume);
            inner.record_usage(&store);
            evicted
        };
        tracing::debug!(
            "[engine]: resize {} to {max_entries} entries and {max_volume} volume, {} evicted",
            inner.name,
            evicted.len()
        );
        inner.hooks.after(&token, &Outcome::Trim { evicted: &evicted });
    }

    /// Load `key` unless it has a live entry.
    ///
    /// Unlike [`CacheEngine::get`], the read is not counted as a hit or a miss.
    pub fn load(&self, key: &K) -> Get<K, V> {
        self.load_with(key, EntryAttributes::default())
    }

    /// Load `key` with `attrs` unless it has a live entry.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::load_with"))]
    pub fn load_with(&self, key: &K, attrs: EntryAttributes) -> Get<K, V> {
        if let Err(e) = self.inner.running(true) {
            return Get::Ready(Some(Err(e)));
        }
        if let Some(entry) = self.inner.live(key) {
            return Get::Ready(Some(Ok(Some(entry))));
        }
        match self.inner.load(key, attrs, false) {
            Ok(load) => Get::Load(load),
            Err(e) => Get::Ready(Some(Err(e))),
        }
    }

    /// Load `key` even if it has a live entry.
    ///
    /// Joins the load of `key` if one is already in flight.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::load_force"))]
    pub fn load_force(&self, key: &K) -> Get<K, V> {
        if let Err(e) = self.inner.running(true) {
            return Get::Ready(Some(Err(e)));
        }
        match self.inner.load(key, EntryAttributes::default(), true) {
            Ok(load) => Get::Load(load),
            Err(e) => Get::Ready(Some(Err(e))),
        }
    }

    /// Load all `keys` concurrently and return the entries of the keys that have a value.
    ///
    /// Fails with the first failed load.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::load_all"))]
    pub async fn load_all<I>(&self, keys: I) -> Result<HashMap<K, CacheEntry<K, V>>>
    where
        I: IntoIterator<Item = K>,
    {
        let gets = keys.into_iter().unique().map(|key| self.load(&key)).collect_vec();
        let entries = try_join_all(gets).await?;
        Ok(entries
            .into_iter()
            .flatten()
            .map(|entry| (entry.key().clone(), entry))
            .collect())
    }

    /// Count of entries.
    pub fn len(&self) -> usize {
        self.inner.store.read().len()
    }

    /// Returns `true` if the cache holds no entry.
    pub fn is_empty(&self) -> bool {
        self.inner.store.read().is_empty()
    }

    /// Sum of the sizes of the entries.
    pub fn volume(&self) -> u64 {
        self.inner.store.read().volume()
    }

    /// Entry count limit.
    pub fn max_entries(&self) -> usize {
        self.inner.store.read().max_entries()
    }

    /// Volume limit.
    pub fn max_volume(&self) -> u64 {
        self.inner.store.read().max_volume()
    }

    /// Keys in eviction order where the replacement policy has one.
    pub fn keys(&self) -> Vec<K> {
        self.inner
            .store
            .read()
            .policy()
            .peek_all()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Count of loads in flight.
    pub fn pending_loads(&self) -> usize {
        self.inner.coordinator.pending()
    }

    /// Snapshot of the statistics.
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.inner.statistics.snapshot()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.inner.state.get()
    }

    /// Stop accepting work. Pending loads complete normally.
    ///
    /// The cache terminates once the last pending load is gone. Returns `false` if it was already shut down.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::shutdown"))]
    pub fn shutdown(&self) -> bool {
        let res = self.inner.state.shutdown();
        if res {
            tracing::debug!(
                "[engine]: shutdown {} with {} pending loads",
                self.inner.name,
                self.inner.coordinator.pending()
            );
        }
        self.inner.coordinator.state_may_drain();
        res
    }

    /// Stop accepting work and cancel the pending loads. Their waiters observe [`ErrorKind::Cancelled`].
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "cachet::memory::engine::shutdown_now"))]
    pub fn shutdown_now(&self) -> bool {
        let res = self.inner.state.shutdown();
        self.inner.coordinator.cancel_all();
        res
    }

    /// Block until the cache is terminated or `timeout` elapsed. Returns `true` if terminated.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        self.inner.state.await_termination(timeout)
    }

    /// Wait until the cache is terminated, or `timeout` elapsed if given. Returns `true` if terminated.
    pub async fn terminated(&self, timeout: Option<Duration>) -> bool {
        self.inner.state.terminated(timeout).await
    }
}

/// The future of [`CacheEngine::get`] and the loads.
#[must_use]
#[pin_project(project = GetProj)]
pub enum Get<K, V>
where
    K: Key,
    V: Value,
{
    /// Resolved without waiting.
    Ready(Option<LoadResult<K, V>>),
    /// Waiting for a load.
    Load(#[pin] Load<K, V>),
}

impl<K, V> Debug for Get<K, V>
where
    K: Key,
    V: Value,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(res) => f.debug_tuple("Ready").field(res).finish(),
            Self::Load(load) => f.debug_tuple("Load").field(load).finish(),
        }
    }
}

impl<K, V> Future for Get<K, V>
where
    K: Key,
    V: Value,
{
    type Output = LoadResult<K, V>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            GetProj::Ready(res) => match res.take() {
                Some(res) => Poll::Ready(res),
                None => panic!("`Get` polled after completion"),
            },
            GetProj::Load(load) => load.poll(cx),
        }
    }
}

impl<K, V> Get<K, V>
where
    K: Key,
    V: Value,
{
    /// Returns `true` if the result is not available yet.
    pub fn need_await(&self) -> bool {
        matches!(self, Self::Load(_))
    }

    /// Take the result if it is available without waiting.
    pub fn try_unwrap(self) -> std::result::Result<LoadResult<K, V>, Self> {
        match self {
            Self::Ready(Some(res)) => Ok(res),
            _ => Err(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use cachet_common::clock::MockClock;
    use parking_lot::Mutex;

    use super::*;
    use crate::{
        builder::CacheBuilder,
        hook::{HookToken, MutationHook, Stage},
    };

    #[derive(Default)]
    struct Trace(Mutex<Vec<String>>);

    impl MutationHook<u64, u64> for Trace {
        fn after(&self, token: &HookToken, outcome: &Outcome<'_, u64, u64>) -> anyhow::Result<()> {
            let kind = match outcome {
                Outcome::Put { .. } => "put",
                Outcome::Replace { .. } => "replace",
                Outcome::Expire { .. } => "expire",
                Outcome::GetHit { .. } => "hit",
                Outcome::GetMiss { expired: true, .. } => "expired-miss",
                Outcome::GetMiss { .. } => "miss",
                _ => "other",
            };
            self.0.lock().push(format!("{} {kind}", token.operation().as_str()));
            Ok(())
        }
    }

    fn cache(clock: &MockClock, trace: &Arc<Trace>) -> CacheEngine<u64, u64> {
        CacheBuilder::new(16)
            .with_clock(clock.clone())
            .with_expiration_timeout(Duration::from_millis(10))
            .with_hook(Stage::Event, trace.clone())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_lazy_expiration_outcomes() {
        let clock = MockClock::new(0);
        let trace = Arc::new(Trace::default());
        let cache = cache(&clock, &trace);

        cache.put(1, 1).unwrap();
        assert_eq!(cache.get(&1).try_unwrap().unwrap().unwrap().unwrap().hits(), 1);

        clock.advance(Duration::from_millis(10));
        assert!(cache.get(&1).try_unwrap().unwrap().unwrap().is_none());
        assert!(cache.get(&1).try_unwrap().unwrap().unwrap().is_none());

        assert_eq!(
            std::mem::take(&mut *trace.0.lock()),
            vec!["put put", "get hit", "get expire", "get expired-miss", "get miss"]
        );
    }

    #[tokio::test]
    async fn test_conditional_writes() {
        let clock = MockClock::new(0);
        let trace = Arc::new(Trace::default());
        let cache = cache(&clock, &trace);

        assert!(cache.replace(1, 1).unwrap().is_none());
        assert!(cache.put_if_absent(1, 1).unwrap().is_none());
        let present = cache.put_if_absent(1, 2).unwrap().unwrap();
        assert_eq!(*present.value(), 1);

        let old = cache.replace(1, 3).unwrap().unwrap();
        assert_eq!(*old.value(), 1);
        assert_eq!(*cache.peek(&1).unwrap().value(), 3);
        assert_eq!(cache.peek(&1).unwrap().version(), 2);

        clock.advance(Duration::from_millis(10));
        assert!(cache.replace(1, 4).unwrap().is_none());
        assert!(cache.is_empty());
        assert!(cache.put_if_absent(1, 5).unwrap().is_none());

        assert_eq!(
            std::mem::take(&mut *trace.0.lock()),
            vec!["put put", "replace replace", "replace expire", "put put"]
        );
    }

    #[tokio::test]
    async fn test_get_without_loader() {
        let cache: CacheEngine<u64, u64> = CacheBuilder::new(4).build().unwrap();
        let get = cache.get(&1);
        assert!(!get.need_await());
        assert!(get.await.unwrap().is_none());

        let err = cache.load(&1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(cache.statistics().misses, 1);
    }

    #[tokio::test]
    async fn test_maintenance_after_termination() {
        let cache: CacheEngine<u64, u64> = CacheBuilder::new(4).build().unwrap();
        cache.put(1, 1).unwrap();
        cache.put(2, 2).unwrap();

        assert!(cache.shutdown());
        assert_eq!(cache.state(), State::Terminated);

        cache.resize(1, u64::MAX);
        assert_eq!(cache.max_entries(), 4);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.trim(0), 0);
        assert_eq!(cache.purge(), 0);
        assert_eq!(cache.len(), 2);
    }
}
