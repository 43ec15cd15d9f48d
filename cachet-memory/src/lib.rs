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

//! The in-process cache entry engine of cachet.
//!
//! Leaf to root: [`entry::CacheEntry`], [`policy::ReplacementPolicy`], [`expiration::ExpirationPolicy`],
//! [`store::EntryStore`], [`loader::LoaderCoordinator`], [`hook::HookChain`], [`state::RunState`] and
//! [`engine::CacheEngine`].

/// Construction and validation of caches.
pub mod builder;
/// Serializable cache configuration.
pub mod config;
/// The cache entry engine.
pub mod engine;
/// Entries and their write attributes.
pub mod entry;
/// Errors of the memory engine.
pub mod error;
/// Expiration policies.
pub mod expiration;
/// Mutation hooks.
pub mod hook;
/// Slab backed doubly linked list.
pub mod list;
/// Event listener dispatch.
pub mod listener;
/// Loaders and single-flight load coordination.
pub mod loader;
/// Replacement policies.
pub mod policy;
/// Generational slab arena.
pub mod slab;
/// Lifecycle of a cache.
pub mod state;
/// Statistics counters.
pub mod statistics;
/// Entry storage under capacity limits.
pub mod store;
