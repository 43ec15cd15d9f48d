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
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Source of wall-clock timestamps, in milliseconds since the UNIX epoch.
///
/// Entry timestamps and expiration times are all taken from the clock of the cache, so a [`MockClock`] can drive
/// expiration deterministically in tests.
pub trait Clock: Send + Sync + Debug + 'static {
    /// Current timestamp in milliseconds.
    fn now(&self) -> u64;
}

/// [`Clock`] backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// Manually advanced [`Clock`].
///
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    now: Arc<AtomicU64>,
}

impl MockClock {
    /// Create a mock clock starting at `millis`.
    pub fn new(millis: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(millis)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, duration: Duration) {
        self.now.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    /// Set the clock to an absolute timestamp.
    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock_shared() {
        let clock = MockClock::new(10);
        let other = clock.clone();
        clock.advance(Duration::from_millis(5));
        assert_eq!(other.now(), 15);
        other.set(100);
        assert_eq!(clock.now(), 100);
    }

    #[test]
    fn test_system_clock_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a > 0);
    }
}
