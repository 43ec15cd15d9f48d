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

use std::fmt::Debug;

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

/// Metric handles of one cache instance.
///
/// Handles are registered against the globally installed `metrics` recorder. Without a recorder all of them are
/// no-ops.
#[derive(Clone)]
pub struct Metrics {
    /// Reads that found a live entry.
    pub hit: Counter,
    /// Reads that found no live entry.
    pub miss: Counter,
    /// Explicit writes.
    pub put: Counter,
    /// Values written by completed loads.
    pub load: Counter,
    /// Loads whose loader failed.
    pub load_failure: Counter,
    /// Writes that replaced a present value.
    pub replace: Counter,
    /// Entries removed explicitly.
    pub remove: Counter,
    /// Entries evicted by the replacement policy.
    pub evict: Counter,
    /// Entries removed because they expired.
    pub expire: Counter,
    /// Calls of `clear`.
    pub clear: Counter,
    /// Mutation hooks that returned an error or panicked.
    pub hook_failure: Counter,

    /// Latency of reads, in seconds.
    pub get_duration: Histogram,
    /// Latency of writes, in seconds.
    pub put_duration: Histogram,
    /// Latency of removals, in seconds.
    pub remove_duration: Histogram,
    /// Latency of the loader, in seconds.
    pub load_duration: Histogram,

    /// Count of entries.
    pub entries: Gauge,
    /// Sum of the entry sizes.
    pub volume: Gauge,
}

impl Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish()
    }
}

impl Metrics {
    /// Register the metric handles labeled with the cache `name`.
    pub fn new(name: &str) -> Self {
        let hit = counter!("cachet_op_total", "name" => name.to_string(), "op" => "hit");
        let miss = counter!("cachet_op_total", "name" => name.to_string(), "op" => "miss");
        let put = counter!("cachet_op_total", "name" => name.to_string(), "op" => "put");
        let load = counter!("cachet_op_total", "name" => name.to_string(), "op" => "load");
        let load_failure = counter!("cachet_op_total", "name" => name.to_string(), "op" => "load_failure");
        let replace = counter!("cachet_op_total", "name" => name.to_string(), "op" => "replace");
        let remove = counter!("cachet_op_total", "name" => name.to_string(), "op" => "remove");
        let evict = counter!("cachet_op_total", "name" => name.to_string(), "op" => "evict");
        let expire = counter!("cachet_op_total", "name" => name.to_string(), "op" => "expire");
        let clear = counter!("cachet_op_total", "name" => name.to_string(), "op" => "clear");
        let hook_failure = counter!("cachet_op_total", "name" => name.to_string(), "op" => "hook_failure");

        let get_duration = histogram!("cachet_op_duration", "name" => name.to_string(), "op" => "get");
        let put_duration = histogram!("cachet_op_duration", "name" => name.to_string(), "op" => "put");
        let remove_duration = histogram!("cachet_op_duration", "name" => name.to_string(), "op" => "remove");
        let load_duration = histogram!("cachet_op_duration", "name" => name.to_string(), "op" => "load");

        let entries = gauge!("cachet_usage", "name" => name.to_string(), "kind" => "entries");
        let volume = gauge!("cachet_usage", "name" => name.to_string(), "kind" => "volume");

        Self {
            hit,
            miss,
            put,
            load,
            load_failure,
            replace,
            remove,
            evict,
            expire,
            clear,
            hook_failure,
            get_duration,
            put_duration,
            remove_duration,
            load_duration,
            entries,
            volume,
        }
    }

    /// Metric handles that record nothing.
    pub fn noop() -> Self {
        Self {
            hit: Counter::noop(),
            miss: Counter::noop(),
            put: Counter::noop(),
            load: Counter::noop(),
            load_failure: Counter::noop(),
            replace: Counter::noop(),
            remove: Counter::noop(),
            evict: Counter::noop(),
            expire: Counter::noop(),
            clear: Counter::noop(),
            hook_failure: Counter::noop(),
            get_duration: Histogram::noop(),
            put_duration: Histogram::noop(),
            remove_duration: Histogram::noop(),
            load_duration: Histogram::noop(),
            entries: Gauge::noop(),
            volume: Gauge::noop(),
        }
    }
}
