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

//! Shared components for cachet.

/// Assertion helpers.
pub mod assert;
/// Wall clock abstraction used for entry timestamps and expiration.
pub mod clock;
/// Key and value bounds.
pub mod code;
/// The error type shared by all cachet crates.
pub mod error;
/// Cache entry events and the listener trait.
pub mod event;
/// Metrics exported through the `metrics` facade.
pub mod metrics;
/// Task submission boundary used for asynchronous loads and background sweeps.
pub mod spawn;
