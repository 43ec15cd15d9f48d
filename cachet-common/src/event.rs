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

use crate::code::{Key, Value};

/// The reason an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Evicted by the replacement policy under capacity pressure.
    Evict,
    /// Removed because it expired.
    Expire,
    /// The value was replaced by a newer one.
    Replace,
    /// Removed explicitly.
    Remove,
    /// Removed by a cache clear.
    Clear,
}

/// Who produced a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Explicit write by the cache user.
    User,
    /// Write merged from a completed load.
    Loader,
}

/// Trait for the customized event listener.
///
/// Listeners are invoked synchronously on the mutating thread, after the statistics have been updated and after the
/// store lock has been released. A panicking listener is isolated and reported to the cache error handler.
pub trait EventListener: Send + Sync + 'static {
    /// Associated key type.
    type Key;
    /// Associated value type.
    type Value;

    /// Called when a value enters the cache, either as a new entry or as the replacement of an old one.
    #[expect(unused_variables)]
    fn on_enter(&self, key: &Self::Key, value: &Self::Value, origin: Origin)
    where
        Self::Key: Key,
        Self::Value: Value,
    {
    }

    /// Called when a cache entry leaves the cache with the reason.
    #[expect(unused_variables)]
    fn on_leave(&self, reason: Event, key: &Self::Key, value: &Self::Value)
    where
        Self::Key: Key,
        Self::Value: Value,
    {
    }
}
