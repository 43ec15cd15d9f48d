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

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::PolicyConfig;

/// Serializable configuration of a cache, applied with [`crate::builder::CacheBuilder::with_config`].
///
/// Missing fields take their default values. `None` limits are unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name of the cache, used in logs and as the metrics label.
    pub name: String,
    /// Maximum count of entries.
    pub max_entries: Option<usize>,
    /// Maximum sum of the entry sizes.
    pub max_volume: Option<u64>,
    /// Time to live of the entries written without an explicit timeout, in milliseconds.
    pub default_timeout_ms: Option<u64>,
    /// Replacement policy.
    pub policy: PolicyConfig,
    /// Period of the background expiration sweep, in milliseconds.
    pub sweep_interval_ms: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "cachet".to_string(),
            max_entries: None,
            max_volume: None,
            default_timeout_ms: None,
            policy: PolicyConfig::default(),
            sweep_interval_ms: None,
        }
    }
}

impl CacheConfig {
    /// Default time to live, if configured.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    /// Period of the background sweep, if configured.
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_ms.map(Duration::from_millis)
    }
}
