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

//! cachet - a pluggable in-process cache engine.
//!
//! Entries live in one store under a replacement policy and an expiration policy. Missing values are loaded once per
//! key no matter how many callers ask for them concurrently, and every mutation is bracketed by an ordered chain of
//! hooks keeping statistics and events in line with the actual state change.

pub use cachet_common as common;
pub use cachet_memory as memory;

/// The commonly used types.
pub mod prelude;
