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

use std::{sync::Arc, time::Duration};

use cachet_common::{
    clock::{Clock, SystemClock},
    code::{Key, Value},
    error::Result,
    metrics::Metrics,
    spawn::{Executor, Spawner},
};

use crate::{
    config::CacheConfig,
    engine::{CacheEngine, EngineParts},
    entry::CacheEntry,
    error::Error,
    expiration::{ExpirationPolicy, PredicateExpiration, TimeoutExpiration},
    hook::{ErrorHandler, HookChain, LogErrorHandler, MutationHook, Stage},
    listener::{ArcEventListener, EventHook},
    loader::Loader,
    policy::{PolicyConfig, ReplacementPolicy},
    statistics::StatisticsHook,
    store::EntryStore,
};

enum PolicySource<K> {
    Config(PolicyConfig),
    Custom(Box<dyn ReplacementPolicy<K>>),
}

type ExpirationFilter<K, V> = Box<dyn Fn(&CacheEntry<K, V>, u64) -> bool + Send + Sync + 'static>;

/// Builder of a [`CacheEngine`].
pub struct CacheBuilder<K, V>
where
    K: Key,
    V: Value,
{
    name: String,
    max_entries: usize,
    max_volume: u64,
    policy: PolicySource<K>,

    default_timeout: Option<Duration>,
    expiration_filter: Option<ExpirationFilter<K, V>>,
    expiration: Option<Arc<dyn ExpirationPolicy<K, V>>>,
    sweep_interval: Option<Duration>,

    loader: Option<Arc<dyn Loader<K, V>>>,
    executor: Option<Arc<dyn Executor>>,
    clock: Arc<dyn Clock>,

    listeners: Vec<ArcEventListener<K, V>>,
    hooks: Vec<(Stage, Arc<dyn MutationHook<K, V>>)>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Key,
    V: Value,
{
    /// Create a builder of a cache holding at most `max_entries` entries.
    ///
    /// The volume is unbounded, the replacement policy is LRU and entries never expire by default.
    pub fn new(max_entries: usize) -> Self {
        Self {
            name: "cachet".to_string(),
            max_entries,
            max_volume: u64::MAX,
            policy: PolicySource::Config(PolicyConfig::default()),
            default_timeout: None,
            expiration_filter: None,
            expiration: None,
            sweep_interval: None,
            loader: None,
            executor: None,
            clock: Arc::new(SystemClock),
            listeners: vec![],
            hooks: vec![],
            error_handler: Arc::new(LogErrorHandler),
        }
    }

    /// Set the name of the cache, used in logs and as the metrics label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Limit the count of entries.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Limit the sum of the entry sizes.
    pub fn with_max_volume(mut self, max_volume: u64) -> Self {
        self.max_volume = max_volume;
        self
    }

    /// Use a built-in replacement policy.
    pub fn with_policy_config(mut self, config: impl Into<PolicyConfig>) -> Self {
        self.policy = PolicySource::Config(config.into());
        self
    }

    /// Use a custom replacement policy.
    pub fn with_policy(mut self, policy: Box<dyn ReplacementPolicy<K>>) -> Self {
        self.policy = PolicySource::Custom(policy);
        self
    }

    /// Expire the entries written without an explicit timeout after `timeout`.
    pub fn with_expiration_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Also expire the entries rejected by `filter`, called with the entry and the current time.
    pub fn with_expiration_predicate<F>(mut self, filter: F) -> Self
    where
        F: Fn(&CacheEntry<K, V>, u64) -> bool + Send + Sync + 'static,
    {
        self.expiration_filter = Some(Box::new(filter));
        self
    }

    /// Use a custom expiration policy. Conflicts with the expiration timeout and predicate.
    pub fn with_expiration_policy(mut self, expiration: impl ExpirationPolicy<K, V>) -> Self {
        self.expiration = Some(Arc::new(expiration));
        self
    }

    /// Sweep the expired entries periodically once the cache is started.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Set the loader of the missing values.
    pub fn with_loader(mut self, loader: impl Loader<K, V>) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Set the executor running the loads and the background sweep.
    ///
    /// Defaults to the tokio runtime the cache is built in.
    pub fn with_executor(mut self, executor: impl Executor) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Set the clock of the cache.
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Register an event listener. Listeners are called in registration order.
    pub fn with_event_listener(mut self, listener: ArcEventListener<K, V>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Register a mutation hook at `stage`.
    pub fn with_hook(mut self, stage: Stage, hook: Arc<dyn MutationHook<K, V>>) -> Self {
        self.hooks.push((stage, hook));
        self
    }

    /// Set the receiver of hook failures. Failures are logged by default.
    pub fn with_error_handler(mut self, error_handler: impl ErrorHandler) -> Self {
        self.error_handler = Arc::new(error_handler);
        self
    }

    /// Apply a serializable config. Unset limits become unbounded.
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.default_timeout = config.default_timeout();
        self.sweep_interval = config.sweep_interval();
        self.name = config.name;
        self.max_entries = config.max_entries.unwrap_or(usize::MAX);
        self.max_volume = config.max_volume.unwrap_or(u64::MAX);
        self.policy = PolicySource::Config(config.policy);
        self
    }

    /// Build the cache.
    ///
    /// Fails with [`cachet_common::error::ErrorKind::Config`] on an invalid configuration, or if no executor is set
    /// and the builder is not called within a tokio runtime.
    pub fn build(self) -> Result<CacheEngine<K, V>> {
        if self.name.is_empty() {
            return Err(Error::Config("cache name must not be empty".to_string()).into());
        }
        if self.sweep_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(Error::Config("sweep interval must be greater than zero".to_string()).into());
        }
        if self.expiration.is_some() && (self.default_timeout.is_some() || self.expiration_filter.is_some()) {
            return Err(Error::Config(
                "custom expiration policy conflicts with expiration timeout or predicate".to_string(),
            )
            .into());
        }

        let executor = match self.executor {
            Some(executor) => executor,
            None => Arc::new(Spawner::try_current()?),
        };

        let expiration: Arc<dyn ExpirationPolicy<K, V>> = match (self.expiration, self.expiration_filter) {
            (Some(expiration), _) => expiration,
            (None, Some(filter)) => Arc::new(PredicateExpiration::new(self.default_timeout, filter)),
            (None, None) => Arc::new(TimeoutExpiration::new(self.default_timeout)),
        };

        let policy = match self.policy {
            PolicySource::Config(config) => config.build(),
            PolicySource::Custom(policy) => policy,
        };
        if !policy.is_empty() {
            return Err(Error::Config("replacement policy must be empty".to_string()).into());
        }

        let metrics = Arc::new(Metrics::new(&self.name));
        let statistics = Arc::new(StatisticsHook::new(metrics.clone()));

        let mut hooks = self.hooks;
        let hook: Arc<dyn MutationHook<K, V>> = statistics.clone();
        hooks.insert(0, (Stage::Statistics, hook));
        if !self.listeners.is_empty() {
            let hook: Arc<dyn MutationHook<K, V>> = Arc::new(EventHook::new(self.listeners));
            hooks.push((Stage::Event, hook));
        }
        let hooks = HookChain::new(hooks, self.clock.clone(), self.error_handler, metrics.clone());

        tracing::debug!(
            "[builder]: build cache {} with {} entries and {} volume, {:?}",
            self.name,
            self.max_entries,
            self.max_volume,
            hooks
        );

        Ok(CacheEngine::new(EngineParts {
            name: self.name,
            store: EntryStore::new(policy, self.max_entries, self.max_volume),
            expiration,
            hooks,
            statistics,
            loader: self.loader,
            executor,
            clock: self.clock,
            metrics,
            sweep_interval: self.sweep_interval,
        }))
    }
}

#[cfg(test)]
mod tests {
    use cachet_common::{clock::MockClock, error::ErrorKind};

    use super::*;
    use crate::policy::{Fifo, FifoConfig};

    #[tokio::test]
    async fn test_build_validation() {
        let err = CacheBuilder::<u64, u64>::new(10).with_name("").build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = CacheBuilder::<u64, u64>::new(10)
            .with_sweep_interval(Duration::ZERO)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = CacheBuilder::<u64, u64>::new(10)
            .with_expiration_timeout(Duration::from_secs(1))
            .with_expiration_policy(TimeoutExpiration::new(None))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Config(_))));

        let mut policy = Fifo::new();
        policy.add(1);
        let err = CacheBuilder::<u64, u64>::new(10)
            .with_policy(Box::new(policy))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_build_without_runtime() {
        let err = CacheBuilder::<u64, u64>::new(10).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_build_with_config() {
        let config = CacheConfig {
            name: "sessions".to_string(),
            max_entries: Some(2),
            max_volume: None,
            default_timeout_ms: Some(100),
            policy: FifoConfig::default().into(),
            sweep_interval_ms: None,
        };
        let clock = MockClock::new(1_000);
        let cache = CacheBuilder::<u64, u64>::new(0)
            .with_config(config)
            .with_clock(clock.clone())
            .build()
            .unwrap();

        assert_eq!(cache.name(), "sessions");
        assert_eq!(cache.max_entries(), 2);
        assert_eq!(cache.max_volume(), u64::MAX);

        let entry = cache.put(1, 1).unwrap();
        assert_eq!(entry.expires(), Some(1_100));
        cache.put(2, 2).unwrap();
        cache.put(3, 3).unwrap();
        assert_eq!(cache.keys(), vec![2, 3]);
    }
}
