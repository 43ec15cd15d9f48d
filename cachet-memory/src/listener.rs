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
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use cachet_common::{
    code::{Key, Value},
    event::{Event, EventListener, Origin},
};

use crate::{
    entry::CacheEntry,
    error::{panic_message, Error},
    hook::{HookToken, MutationHook, Outcome},
};

/// Shared event listener of a cache.
pub type ArcEventListener<K, V> = Arc<dyn EventListener<Key = K, Value = V>>;

/// Mutation hook dispatching the effects of mutations to the registered [`EventListener`]s.
///
/// Registered at [`crate::hook::Stage::Event`]. Every listener sees every event even if another one panicked. The
/// panics are aggregated into one error.
pub struct EventHook<K, V> {
    listeners: Vec<ArcEventListener<K, V>>,
}

impl<K, V> EventHook<K, V>
where
    K: Key,
    V: Value,
{
    /// Dispatch to `listeners` in order.
    pub fn new(listeners: Vec<ArcEventListener<K, V>>) -> Self {
        Self { listeners }
    }

    /// Returns `true` without any listener.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    fn enter(&self, entry: &CacheEntry<K, V>, origin: Origin, errs: &mut Vec<Error>) {
        for listener in self.listeners.iter() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| {
                listener.on_enter(entry.key(), entry.value(), origin)
            })) {
                errs.push(Error::ListenerPanic(panic_message(&*payload)));
            }
        }
    }

    fn leave<'a>(
        &self,
        reason: Event,
        entries: impl IntoIterator<Item = &'a CacheEntry<K, V>>,
        errs: &mut Vec<Error>,
    ) {
        for entry in entries {
            for listener in self.listeners.iter() {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| {
                    listener.on_leave(reason, entry.key(), entry.value())
                })) {
                    errs.push(Error::ListenerPanic(panic_message(&*payload)));
                }
            }
        }
    }

    fn written(
        &self,
        origin: Origin,
        old: Option<&CacheEntry<K, V>>,
        new: &CacheEntry<K, V>,
        evicted: &[CacheEntry<K, V>],
        errs: &mut Vec<Error>,
    ) {
        // Victims left before the new entry came in. An entry evicted by its own write leaves after entering.
        let (own, victims): (Vec<_>, Vec<_>) = evicted.iter().partition(|entry| entry.key() == new.key());
        self.leave(Event::Replace, old, errs);
        self.leave(Event::Evict, victims, errs);
        self.enter(new, origin, errs);
        self.leave(Event::Evict, own, errs);
    }
}

impl<K, V> MutationHook<K, V> for EventHook<K, V>
where
    K: Key,
    V: Value,
{
    fn name(&self) -> &str {
        "event"
    }

    fn after(&self, _: &HookToken, outcome: &Outcome<'_, K, V>) -> anyhow::Result<()> {
        if self.listeners.is_empty() {
            return Ok(());
        }

        let mut errs = vec![];
        match outcome {
            Outcome::Clear { removed } => self.leave(Event::Clear, *removed, &mut errs),
            Outcome::Put {
                origin,
                old,
                new,
                evicted,
            } => self.written(*origin, *old, new, evicted, &mut errs),
            Outcome::PutAll { origin, puts } => {
                for put in puts.iter() {
                    self.written(*origin, put.old.as_ref(), &put.new, &put.evicted, &mut errs);
                }
            }
            Outcome::Remove { removed, .. } => self.leave(Event::Remove, *removed, &mut errs),
            Outcome::RemoveAll { removed } => self.leave(Event::Remove, *removed, &mut errs),
            Outcome::Replace { old, new, evicted } => {
                self.written(Origin::User, Some(*old), new, evicted, &mut errs)
            }
            Outcome::Trim { evicted } => self.leave(Event::Evict, *evicted, &mut errs),
            Outcome::Purge { expired, evicted } => {
                self.leave(Event::Expire, *expired, &mut errs);
                self.leave(Event::Evict, *evicted, &mut errs);
            }
            Outcome::Expire { expired } => self.leave(Event::Expire, *expired, &mut errs),
            Outcome::GetHit { .. } | Outcome::GetMiss { .. } => {}
        }

        match errs.len() {
            0 => Ok(()),
            1 => Err(errs.remove(0).into()),
            _ => Err(Error::multiple(errs).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use cachet_common::{clock::MockClock, metrics::Metrics};
    use parking_lot::Mutex;

    use super::*;
    use crate::{
        entry::EntryAttributes,
        hook::{ErrorHandler, HookChain, Operation, Stage},
    };

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl EventListener for Recorder {
        type Key = u64;
        type Value = String;

        fn on_enter(&self, key: &u64, value: &String, origin: Origin) {
            self.0.lock().push(format!("enter {key} {value} {origin:?}"));
        }

        fn on_leave(&self, reason: Event, key: &u64, value: &String) {
            self.0.lock().push(format!("leave {key} {value} {reason:?}"));
        }
    }

    struct Panicking;

    impl EventListener for Panicking {
        type Key = u64;
        type Value = String;

        fn on_leave(&self, _: Event, key: &u64, _: &String) {
            panic!("cannot leave {key}");
        }
    }

    #[derive(Default)]
    struct Collector(Mutex<Vec<cachet_common::error::Error>>);

    impl ErrorHandler for Collector {
        fn handle(&self, error: cachet_common::error::Error) {
            self.0.lock().push(error);
        }
    }

    fn entry(key: u64, value: &str) -> CacheEntry<u64, String> {
        CacheEntry::new(key, Arc::new(value.to_string()), &EntryAttributes::default(), None, 0)
    }

    #[test]
    fn test_event_hook_dispatch() {
        let recorder = Arc::new(Recorder::default());
        let collector = Arc::new(Collector::default());
        let listeners: Vec<ArcEventListener<u64, String>> = vec![Arc::new(Panicking), recorder.clone()];
        let hook: Arc<dyn MutationHook<u64, String>> = Arc::new(EventHook::new(listeners));
        let chain: HookChain<u64, String> = HookChain::new(
            vec![(Stage::Event, hook)],
            Arc::new(MockClock::default()),
            collector.clone(),
            Arc::new(Metrics::noop()),
        );

        let (old, new, evicted) = (entry(1, "a"), entry(1, "b"), [entry(2, "c"), entry(3, "d")]);
        let token = chain.before(Operation::Put);
        chain.after(
            &token,
            &Outcome::Put {
                origin: Origin::Loader,
                old: Some(&old),
                new: &new,
                evicted: &evicted,
            },
        );
        chain.after(&token, &Outcome::GetHit { entry: &new });

        assert_eq!(
            *recorder.0.lock(),
            vec!["leave 1 a Replace", "leave 2 c Evict", "leave 3 d Evict", "enter 1 b Loader"]
        );

        let errors = collector.0.lock();
        assert_eq!(errors.len(), 1);
        let err = errors[0].source().unwrap().downcast_ref::<Error>().unwrap();
        match err {
            Error::Multiple(errs) => assert_eq!(errs.errors().len(), 3),
            e => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_victims_leave_before_enter() {
        let recorder = Arc::new(Recorder::default());
        let hook = EventHook::new(vec![recorder.clone() as ArcEventListener<u64, String>]);
        let chain: HookChain<u64, String> = HookChain::new(
            vec![(Stage::Event, Arc::new(hook) as Arc<dyn MutationHook<u64, String>>)],
            Arc::new(MockClock::default()),
            Arc::new(Collector::default()),
            Arc::new(Metrics::noop()),
        );

        // The written entry did not fit after evicting the victim.
        let (new, evicted) = (entry(1, "b"), [entry(2, "c"), entry(1, "b")]);
        let token = chain.before(Operation::Put);
        chain.after(
            &token,
            &Outcome::Put {
                origin: Origin::User,
                old: None,
                new: &new,
                evicted: &evicted,
            },
        );

        assert_eq!(
            *recorder.0.lock(),
            vec!["leave 2 c Evict", "enter 1 b User", "leave 1 b Evict"]
        );
    }
}
