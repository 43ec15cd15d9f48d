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

pub use crate::{
    common::{
        clock::{Clock, MockClock, SystemClock},
        code::{Key, Value},
        error::{Error, ErrorKind, Result},
        event::{Event, EventListener, Origin},
        spawn::{BlockingTask, Executor, PeriodicTask, Spawner},
    },
    memory::{
        builder::CacheBuilder,
        config::CacheConfig,
        engine::{CacheEngine, Get},
        entry::{CacheEntry, EntryAttributes},
        expiration::{ExpirationPolicy, PredicateExpiration, TimeoutExpiration},
        hook::{ErrorHandler, HookToken, LogErrorHandler, MutationHook, Operation, Outcome, Stage},
        listener::ArcEventListener,
        loader::{blocking_loader, loader_fn, Load, LoadContext, LoadResult, Loader},
        policy::{
            ClockConfig, FifoConfig, LfuConfig, LifoConfig, LruConfig, MruConfig, PolicyConfig, RandomConfig,
            ReplacementPolicy,
        },
        slab::Index,
        state::State,
        statistics::StatisticsSnapshot,
    },
};
