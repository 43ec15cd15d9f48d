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

use std::{fmt::Debug, hash::Hash};

/// Key trait for the in-process cache.
///
/// Keys are cloned into the replacement policy, so they are expected to be cheap to clone.
pub trait Key: Send + Sync + 'static + Hash + Eq + Clone + Debug {}
impl<T: Send + Sync + 'static + Hash + Eq + Clone + Debug> Key for T {}

/// Value trait for the in-process cache.
///
/// Values are shared behind [`std::sync::Arc`] and never cloned by the cache.
pub trait Value: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Value for T {}
