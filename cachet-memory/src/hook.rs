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
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};

use cachet_common::{
    clock::Clock,
    code::{Key, Value},
    error::{Error, ErrorKind},
    event::Origin,
    metrics::Metrics,
};

use crate::{entry::CacheEntry, error::panic_message, store::PutOutcome};

/// Mutating operations of the cache, bracketed by the hook chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `clear`
    Clear,
    /// `put`, `put_with`, `put_if_absent` and loader merges
    Put,
    /// `put_all`
    PutAll,
    /// `remove`
    Remove,
    /// `remove_all`
    RemoveAll,
    /// `replace`
    Replace,
    /// `trim` and `resize`
    Trim,
    /// `purge`
    Purge,
    /// Expiration sweeps.
    Expire,
    /// Reads that count as a hit or a miss.
    Get,
}

impl Operation {
    /// Convert self into static str.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Clear => "clear",
            Operation::Put => "put",
            Operation::PutAll => "put_all",
            Operation::Remove => "remove",
            Operation::RemoveAll => "remove_all",
            Operation::Replace => "replace",
            Operation::Trim => "trim",
            Operation::Purge => "purge",
            Operation::Expire => "expire",
            Operation::Get => "get",
        }
    }
}

/// Captured by [`HookChain::before`] before the mutation starts, and handed to every after-hook of the same mutation.
#[derive(Debug, Clone)]
pub struct HookToken {
    operation: Operation,
    timestamp: u64,
    started: Instant,
}

impl HookToken {
    /// The bracketed operation.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Clock time at which the mutation started.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Monotonic time elapsed since the mutation started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// The effect of a mutation, as seen by the after-hooks.
///
/// Entries are snapshots taken under the store lock.
#[derive(Debug)]
pub enum Outcome<'a, K, V> {
    /// All entries removed.
    Clear {
        /// The removed entries.
        removed: &'a [CacheEntry<K, V>],
    },
    /// One value written.
    Put {
        /// Whether the value comes from the user or from a load.
        origin: Origin,
        /// The entry the write replaced.
        old: Option<&'a CacheEntry<K, V>>,
        /// The written entry.
        new: &'a CacheEntry<K, V>,
        /// Entries evicted to make room, the written one included if it did not fit.
        evicted: &'a [CacheEntry<K, V>],
    },
    /// A batch of values written.
    PutAll {
        /// Whether the values come from the user or from a load.
        origin: Origin,
        /// One outcome per written value, in input order.
        puts: &'a [PutOutcome<K, V>],
    },
    /// One key removed.
    Remove {
        /// The requested key.
        key: &'a K,
        /// `None` if the key was absent.
        removed: Option<&'a CacheEntry<K, V>>,
    },
    /// A batch of keys removed.
    RemoveAll {
        /// The entries that were present.
        removed: &'a [CacheEntry<K, V>],
    },
    /// The value of a present key replaced.
    Replace {
        /// The replaced entry.
        old: &'a CacheEntry<K, V>,
        /// The written entry.
        new: &'a CacheEntry<K, V>,
        /// Entries evicted because the new value is larger.
        evicted: &'a [CacheEntry<K, V>],
    },
    /// Entries evicted to shrink the cache.
    Trim {
        /// The evicted entries, in eviction order.
        evicted: &'a [CacheEntry<K, V>],
    },
    /// Expired entries removed, then entries evicted to satisfy the limits.
    Purge {
        /// The expired entries.
        expired: &'a [CacheEntry<K, V>],
        /// The evicted entries, in eviction order.
        evicted: &'a [CacheEntry<K, V>],
    },
    /// Expired entries removed, by a sweep or by a read that found them stale.
    Expire {
        /// The expired entries.
        expired: &'a [CacheEntry<K, V>],
    },
    /// A read found a live entry.
    GetHit {
        /// Snapshot of the entry after the read was recorded.
        entry: &'a CacheEntry<K, V>,
    },
    /// A read found nothing.
    GetMiss {
        /// The requested key.
        key: &'a K,
        /// `true` if the read found a stale entry and removed it.
        expired: bool,
    },
}

/// Position of a hook in the chain.
///
/// All statistics hooks run before any event hook, so a listener can trust that the statistics already reflect the
/// event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Runs first.
    Statistics,
    /// Runs after all statistics hooks.
    Event,
}

/// Instrumentation bracketing the mutating operations of the cache.
///
/// Hooks are called synchronously on the mutating thread. [`MutationHook::after`] runs after the store lock has been
/// released. An error or a panic of a hook never affects the mutation or the other hooks. It is reported to the
/// [`ErrorHandler`] of the cache.
pub trait MutationHook<K, V>: Send + Sync + 'static {
    /// Name used when reporting failures.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called before the mutation starts.
    #[expect(unused_variables)]
    fn before(&self, token: &HookToken) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called with the effect of the mutation.
    fn after(&self, token: &HookToken, outcome: &Outcome<'_, K, V>) -> anyhow::Result<()>;
}

/// Receiver of the failures of hooks.
pub trait ErrorHandler: Send + Sync + 'static {
    /// Called with every hook failure, on the mutating thread.
    fn handle(&self, error: Error);
}

/// Logs hook failures.
#[derive(Debug, Default)]
pub struct LogErrorHandler;

impl ErrorHandler for LogErrorHandler {
    fn handle(&self, error: Error) {
        tracing::error!("[hook]: {error}");
    }
}

/// The ordered chain of mutation hooks of one cache.
pub struct HookChain<K, V> {
    hooks: Vec<(Stage, Arc<dyn MutationHook<K, V>>)>,
    clock: Arc<dyn Clock>,
    error_handler: Arc<dyn ErrorHandler>,
    metrics: Arc<Metrics>,
}

impl<K, V> Debug for HookChain<K, V>
where
    K: Key,
    V: Value,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookChain")
            .field("hooks", &self.hooks.iter().map(|(stage, hook)| (stage, hook.name())).collect::<Vec<_>>())
            .finish()
    }
}

impl<K, V> HookChain<K, V>
where
    K: Key,
    V: Value,
{
    /// Build a chain. Hooks are ordered by stage, then by registration order.
    pub fn new(
        mut hooks: Vec<(Stage, Arc<dyn MutationHook<K, V>>)>,
        clock: Arc<dyn Clock>,
        error_handler: Arc<dyn ErrorHandler>,
        metrics: Arc<Metrics>,
    ) -> Self {
        // Stable, so hooks of the same stage keep their registration order.
        hooks.sort_by_key(|(stage, _)| *stage);
        Self {
            hooks,
            clock,
            error_handler,
            metrics,
        }
    }

    /// Capture the token of a mutation that is about to start and run the before-hooks.
    pub fn before(&self, operation: Operation) -> HookToken {
        let token = HookToken {
            operation,
            timestamp: self.clock.now(),
            started: Instant::now(),
        };
        for (_, hook) in self.hooks.iter() {
            let res = catch_unwind(AssertUnwindSafe(|| hook.before(&token)));
            self.report(hook.as_ref(), &token, res);
        }
        token
    }

    /// Run the after-hooks in stage order.
    pub fn after(&self, token: &HookToken, outcome: &Outcome<'_, K, V>) {
        for (_, hook) in self.hooks.iter() {
            let res = catch_unwind(AssertUnwindSafe(|| hook.after(token, outcome)));
            self.report(hook.as_ref(), token, res);
        }
    }

    fn report(
        &self,
        hook: &dyn MutationHook<K, V>,
        token: &HookToken,
        res: std::thread::Result<anyhow::Result<()>>,
    ) {
        let error = match res {
            Ok(Ok(())) => return,
            Ok(Err(e)) => Error::new(ErrorKind::HookFailed, "hook returned an error").with_source(e),
            Err(payload) => Error::new(ErrorKind::HookFailed, format!("hook panicked: {}", panic_message(&*payload))),
        };
        self.metrics.hook_failure.increment(1);
        let error = error
            .with_context("hook", hook.name())
            .with_context("operation", token.operation.as_str());
        self.error_handler.handle(error);
    }
}

#[cfg(test)]
mod tests {
    use cachet_common::clock::MockClock;
    use parking_lot::Mutex;

    use super::*;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl MutationHook<u64, u64> for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn before(&self, token: &HookToken) -> anyhow::Result<()> {
            self.log.lock().push(format!("before {} {}", self.name, token.operation().as_str()));
            Ok(())
        }

        fn after(&self, token: &HookToken, _: &Outcome<'_, u64, u64>) -> anyhow::Result<()> {
            self.log.lock().push(format!("after {} {}", self.name, token.operation().as_str()));
            Ok(())
        }
    }

    struct Failing {
        panic: bool,
    }

    impl MutationHook<u64, u64> for Failing {
        fn after(&self, _: &HookToken, _: &Outcome<'_, u64, u64>) -> anyhow::Result<()> {
            if self.panic {
                panic!("boom");
            }
            Err(anyhow::anyhow!("failed"))
        }
    }

    #[derive(Default)]
    struct Collector(Mutex<Vec<Error>>);

    impl ErrorHandler for Collector {
        fn handle(&self, error: Error) {
            self.0.lock().push(error);
        }
    }

    fn hook(hook: impl MutationHook<u64, u64>) -> Arc<dyn MutationHook<u64, u64>> {
        Arc::new(hook)
    }

    #[test]
    fn test_hook_chain_order_and_isolation() {
        let log = Arc::new(Mutex::new(vec![]));
        let collector = Arc::new(Collector::default());
        let clock = MockClock::new(42);

        let chain: HookChain<u64, u64> = HookChain::new(
            vec![
                (Stage::Event, hook(Recorder { name: "event", log: log.clone() })),
                (Stage::Event, hook(Failing { panic: true })),
                (Stage::Statistics, hook(Failing { panic: false })),
                (Stage::Statistics, hook(Recorder { name: "stats", log: log.clone() })),
            ],
            Arc::new(clock),
            collector.clone(),
            Arc::new(Metrics::noop()),
        );

        let token = chain.before(Operation::Clear);
        assert_eq!(token.timestamp(), 42);
        chain.after(&token, &Outcome::Clear { removed: &[] });

        assert_eq!(
            *log.lock(),
            vec!["before stats clear", "before event clear", "after stats clear", "after event clear"]
        );

        let errors = collector.0.lock();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.kind() == ErrorKind::HookFailed));
        assert_eq!(errors[0].message(), "hook returned an error");
        assert_eq!(errors[1].message(), "hook panicked: boom");
        assert!(errors[1].context().contains(&("operation", "clear".to_string())));
    }
}
