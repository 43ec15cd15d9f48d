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
    future::Future,
    mem::ManuallyDrop,
    ops::{ControlFlow, Deref, DerefMut},
    sync::Arc,
    time::Duration,
};

use futures::future::BoxFuture;
use tokio::{
    runtime::{Handle, Runtime},
    sync::oneshot,
    time::{Instant, MissedTickBehavior},
};

use crate::error::{Error, ErrorKind, Result};

/// A blocking task submitted to an [`Executor`].
pub type BlockingTask = Box<dyn FnOnce() + Send + 'static>;

/// A task run once per period by [`Executor::spawn_periodic`] until it returns [`ControlFlow::Break`].
pub type PeriodicTask = Box<dyn FnMut() -> ControlFlow<()> + Send + 'static>;

/// Task submission boundary of the cache.
///
/// The cache never owns the worker resources. Loads and background sweeps are submitted to an injected executor,
/// which may refuse them (pool exhausted, shut down). A refusal is reported as an [`ErrorKind::Rejected`] error and
/// the submitted task is dropped.
pub trait Executor: Debug + Send + Sync + 'static {
    /// Submit an asynchronous task.
    fn spawn(&self, future: BoxFuture<'static, ()>) -> Result<()>;

    /// Submit a blocking task.
    fn spawn_blocking(&self, func: BlockingTask) -> Result<()>;

    /// Run `task` every `period`, the first run one period from now, until it breaks.
    ///
    /// The default occupies one blocking task of the executor for the whole schedule and sleeps the thread between
    /// runs, so it works with executors that have no timer. Executors with a timer should override it.
    fn spawn_periodic(&self, period: Duration, mut task: PeriodicTask) -> Result<()> {
        self.spawn_blocking(Box::new(move || loop {
            std::thread::sleep(period);
            if task().is_break() {
                break;
            }
        }))
    }
}

impl dyn Executor {
    /// Run `func` on the blocking pool of the executor and wait for its result asynchronously.
    pub fn run_blocking<F, R>(&self, func: F) -> impl Future<Output = Result<R>> + Send + 'static
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let submitted = self.spawn_blocking(Box::new(move || {
            let _ = tx.send(func());
        }));
        async move {
            submitted?;
            rx.await
                .map_err(|e| Error::new(ErrorKind::Join, "blocking task dropped").with_source(e))
        }
    }
}

/// A wrapper around [`Runtime`] that shuts down the runtime in the background when dropped.
///
/// Directly dropping a nested runtime is not allowed in a parent runtime.
pub struct BackgroundShutdownRuntime(ManuallyDrop<Runtime>);

impl Debug for BackgroundShutdownRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BackgroundShutdownRuntime").finish()
    }
}

impl Drop for BackgroundShutdownRuntime {
    fn drop(&mut self) {
        // Safety: The runtime is only dropped once here.
        let runtime = unsafe { ManuallyDrop::take(&mut self.0) };
        runtime.shutdown_background();
    }
}

impl Deref for BackgroundShutdownRuntime {
    type Target = Runtime;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for BackgroundShutdownRuntime {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Runtime> for BackgroundShutdownRuntime {
    fn from(runtime: Runtime) -> Self {
        Self(ManuallyDrop::new(runtime))
    }
}

/// [`Executor`] backed by a dedicated tokio runtime or a runtime handle.
#[derive(Debug, Clone)]
pub enum Spawner {
    /// A dedicated runtime to spawn tasks.
    Runtime(Arc<BackgroundShutdownRuntime>),
    /// A handle to spawn tasks.
    Handle(Handle),
}

impl From<Runtime> for Spawner {
    fn from(runtime: Runtime) -> Self {
        Self::Runtime(Arc::new(runtime.into()))
    }
}

impl From<Handle> for Spawner {
    fn from(handle: Handle) -> Self {
        Self::Handle(handle)
    }
}

impl Spawner {
    /// Get the spawner of the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn current() -> Self {
        Spawner::Handle(Handle::current())
    }

    /// Get the spawner of the current tokio runtime if there is one.
    pub fn try_current() -> Result<Self> {
        Handle::try_current()
            .map(Spawner::Handle)
            .map_err(|e| Error::new(ErrorKind::Config, "no tokio runtime available").with_source(e))
    }

    fn handle(&self) -> &Handle {
        match self {
            Spawner::Runtime(rt) => rt.handle(),
            Spawner::Handle(h) => h,
        }
    }
}

impl Executor for Spawner {
    fn spawn(&self, future: BoxFuture<'static, ()>) -> Result<()> {
        // Detached. A task dropped by a shutting down runtime is observed through the guards it owns.
        drop(self.handle().spawn(future));
        Ok(())
    }

    fn spawn_blocking(&self, func: BlockingTask) -> Result<()> {
        drop(self.handle().spawn_blocking(func));
        Ok(())
    }

    fn spawn_periodic(&self, period: Duration, mut task: PeriodicTask) -> Result<()> {
        drop(self.handle().spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if task().is_break() {
                    break;
                }
            }
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;

    #[derive(Debug)]
    struct Rejecting;

    impl Executor for Rejecting {
        fn spawn(&self, _: BoxFuture<'static, ()>) -> Result<()> {
            Err(Error::new(ErrorKind::Rejected, "pool exhausted"))
        }

        fn spawn_blocking(&self, _: BlockingTask) -> Result<()> {
            Err(Error::new(ErrorKind::Rejected, "pool exhausted"))
        }
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let executor: Arc<dyn Executor> = Arc::new(Spawner::current());
        let res = executor.run_blocking(|| 40 + 2).await.unwrap();
        assert_eq!(res, 42);
    }

    #[tokio::test]
    async fn test_run_blocking_rejected() {
        let executor: Arc<dyn Executor> = Arc::new(Rejecting);
        let err = executor.run_blocking(|| 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);
    }

    /// Runs everything on plain threads, without any timer of its own.
    #[derive(Debug)]
    struct Threads;

    impl Executor for Threads {
        fn spawn(&self, future: BoxFuture<'static, ()>) -> Result<()> {
            std::thread::spawn(move || futures::executor::block_on(future));
            Ok(())
        }

        fn spawn_blocking(&self, func: BlockingTask) -> Result<()> {
            std::thread::spawn(func);
            Ok(())
        }
    }

    fn countdown(runs: usize, tx: std::sync::mpsc::Sender<usize>) -> PeriodicTask {
        let mut left = runs;
        Box::new(move || {
            left -= 1;
            let _ = tx.send(left);
            if left == 0 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
    }

    #[test]
    fn test_spawn_periodic_without_timer() {
        let (tx, rx) = std::sync::mpsc::channel();
        Threads.spawn_periodic(Duration::from_millis(1), countdown(3, tx)).unwrap();
        let runs = rx.iter().collect::<Vec<_>>();
        assert_eq!(runs, vec![2, 1, 0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spawn_periodic() {
        let (tx, rx) = std::sync::mpsc::channel();
        Spawner::current()
            .spawn_periodic(Duration::from_millis(1), countdown(3, tx))
            .unwrap();
        let runs = tokio::task::spawn_blocking(move || rx.iter().collect::<Vec<_>>())
            .await
            .unwrap();
        assert_eq!(runs, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn test_spawn() {
        let spawner = Spawner::current();
        let (tx, rx) = oneshot::channel();
        spawner
            .spawn(
                async move {
                    let _ = tx.send(7);
                }
                .boxed(),
            )
            .unwrap();
        assert_eq!(rx.await.unwrap(), 7);
    }
}
