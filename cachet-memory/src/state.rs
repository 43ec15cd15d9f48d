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

use std::{fmt::Display, pin::pin, time::Duration};

use cachet_common::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

/// Lifecycle states of a cache, totally ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    /// Created, not started yet.
    Ready,
    /// Start in progress.
    Starting,
    /// Serving.
    Running,
    /// No new work accepted, pending loads draining.
    Shutdown,
    /// Pending loads drained, releasing resources.
    Stopping,
    /// Final.
    Terminated,
}

impl Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            State::Ready => "Ready",
            State::Starting => "Starting",
            State::Running => "Running",
            State::Shutdown => "Shutdown",
            State::Stopping => "Stopping",
            State::Terminated => "Terminated",
        };
        write!(f, "{s}")
    }
}

/// The lifecycle state machine of a cache.
///
/// ```text
/// Ready -> Starting -> Running -> Shutdown -> Stopping -> Terminated
///             |                      ^
///             +------ failure -------+
/// ```
///
/// Transitions only move forward. A failed start is terminal. A cache that is shut down before it ever started skips
/// the start.
#[derive(Debug)]
pub struct RunState {
    state: Mutex<State>,
    /// Wakes threads blocked on a state change.
    condvar: Condvar,
    /// Wakes tasks awaiting a state change.
    notify: Notify,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    /// Create a state in [`State::Ready`].
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Ready),
            condvar: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// Current state.
    pub fn get(&self) -> State {
        *self.state.lock()
    }

    /// Returns `true` if the state is at least `state`.
    pub fn is_at_least(&self, state: State) -> bool {
        self.get() >= state
    }

    /// Check whether the cache is running, running the one-time `start` first if it has not been started.
    ///
    /// Past [`State::Shutdown`], or if the start fails, returns `Ok(false)` for best-effort callers and an error for
    /// callers that require availability (`fail_if_shutdown`). Concurrent callers wait for an in-progress start.
    pub fn is_running_lazy_start<F>(&self, fail_if_shutdown: bool, start: F) -> Result<bool>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut start = Some(start);
        let mut state = self.state.lock();
        loop {
            match *state {
                State::Running => return Ok(true),
                State::Starting => self.condvar.wait(&mut state),
                State::Ready => {
                    let Some(start) = start.take() else {
                        // Unreachable, the start function is only taken while moving out of `Ready`.
                        return Err(Error::unavailable(*state));
                    };
                    *state = State::Starting;
                    tracing::debug!("[state]: starting");
                    drop(state);

                    let res = start();

                    state = self.state.lock();
                    match res {
                        Ok(()) => {
                            // A concurrent shutdown wins over the start.
                            if *state == State::Starting {
                                *state = State::Running;
                                tracing::debug!("[state]: running");
                            }
                            self.wake();
                        }
                        Err(e) => {
                            if *state < State::Shutdown {
                                *state = State::Shutdown;
                            }
                            tracing::error!("[state]: start failed: {e}");
                            self.wake();
                            return if fail_if_shutdown { Err(e) } else { Ok(false) };
                        }
                    }
                }
                s => {
                    return if fail_if_shutdown {
                        Err(Error::unavailable(s))
                    } else {
                        Ok(false)
                    };
                }
            }
        }
    }

    /// Move to [`State::Shutdown`]. Returns `false` if the state was already at or past it.
    pub fn shutdown(&self) -> bool {
        let mut state = self.state.lock();
        if *state >= State::Shutdown {
            return false;
        }
        *state = State::Shutdown;
        tracing::debug!("[state]: shutdown");
        self.wake();
        true
    }

    /// Pending work has drained: move from [`State::Shutdown`] through [`State::Stopping`] to [`State::Terminated`].
    ///
    /// No-op in any other state.
    pub fn drained(&self) {
        let mut state = self.state.lock();
        if *state != State::Shutdown {
            return;
        }
        *state = State::Stopping;
        tracing::debug!("[state]: stopping");
        *state = State::Terminated;
        tracing::debug!("[state]: terminated");
        self.wake();
    }

    /// Block until terminated or `timeout` elapsed. Returns `true` if terminated.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        self.condvar
            .wait_while_for(&mut state, |state| *state != State::Terminated, timeout);
        *state == State::Terminated
    }

    /// Wait until terminated, or `timeout` elapsed if given. Returns `true` if terminated.
    pub async fn terminated(&self, timeout: Option<Duration>) -> bool {
        let wait = async {
            loop {
                let mut notified = pin!(self.notify.notified());
                notified.as_mut().enable();
                if self.get() == State::Terminated {
                    return;
                }
                notified.await;
            }
        };
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait).await.is_ok(),
            None => {
                wait.await;
                true
            }
        }
    }

    fn wake(&self) {
        self.condvar.notify_all();
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
    };

    use cachet_common::error::ErrorKind;

    use super::*;

    #[test]
    fn test_lazy_start_once() {
        let state = Arc::new(RunState::new());
        let starts = Arc::new(AtomicUsize::new(0));

        let handles = (0..8)
            .map(|_| {
                let state = state.clone();
                let starts = starts.clone();
                thread::spawn(move || {
                    state.is_running_lazy_start(true, || {
                        starts.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(10));
                        Ok(())
                    })
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            assert!(handle.join().unwrap().unwrap());
        }
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(state.get(), State::Running);
    }

    #[test]
    fn test_start_failure_is_terminal() {
        let state = RunState::new();
        let err = state
            .is_running_lazy_start(true, || Err(Error::new(ErrorKind::Rejected, "no worker")))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);
        assert_eq!(state.get(), State::Shutdown);

        assert!(!state.is_running_lazy_start(false, || Ok(())).unwrap());
        let err = state.is_running_lazy_start(true, || Ok(())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn test_shutdown_and_drain() {
        let state = RunState::new();
        assert!(state.is_running_lazy_start(true, || Ok(())).unwrap());
        assert!(!state.await_termination(Duration::from_millis(1)));

        // Draining before shutdown is ignored.
        state.drained();
        assert_eq!(state.get(), State::Running);

        assert!(state.shutdown());
        assert!(!state.shutdown());
        assert!(state.is_at_least(State::Shutdown));
        state.drained();
        assert_eq!(state.get(), State::Terminated);
        assert!(state.await_termination(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_terminated_async() {
        let state = Arc::new(RunState::new());
        state.shutdown();
        assert!(!state.terminated(Some(Duration::from_millis(5))).await);

        let waiter = tokio::spawn({
            let state = state.clone();
            async move { state.terminated(None).await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        state.drained();
        assert!(waiter.await.unwrap());
    }
}
