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
    marker::PhantomData,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use cachet_common::{
    code::{Key, Value},
    error::{Error, ErrorKind, Result},
    spawn::Executor,
};
use futures::{
    future::{AbortHandle, Abortable, BoxFuture, Shared},
    FutureExt,
};
use hashbrown::HashMap;
use parking_lot::Mutex;
use pin_project::{pin_project, pinned_drop};
use tokio::sync::oneshot;

use crate::{
    entry::{CacheEntry, EntryAttributes},
    state::{RunState, State},
};

/// Everything a loader gets to know about one load.
///
/// Clones share the attributes, so a loader can report the size or cost of what it loaded with
/// [`LoadContext::set_attributes`].
#[derive(Debug, Clone)]
pub struct LoadContext {
    attributes: Arc<Mutex<EntryAttributes>>,
    forced: bool,
    executor: Arc<dyn Executor>,
    cancelled: Arc<AtomicBool>,
}

impl LoadContext {
    pub(crate) fn new(
        attributes: EntryAttributes,
        forced: bool,
        executor: Arc<dyn Executor>,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            attributes: Arc::new(Mutex::new(attributes)),
            forced,
            executor,
            cancelled,
        }
    }

    /// Attributes the loaded entry will be written with.
    ///
    /// Initially the attributes passed by the caller that started the load.
    pub fn attributes(&self) -> EntryAttributes {
        self.attributes.lock().clone()
    }

    /// Replace the attributes the loaded entry will be written with.
    pub fn set_attributes(&self, attributes: EntryAttributes) {
        *self.attributes.lock() = attributes;
    }

    /// Returns `true` if the load bypasses a present entry.
    pub fn is_forced(&self) -> bool {
        self.forced
    }

    /// The executor of the cache, for loaders that fan out work.
    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Returns `true` once the load has been cancelled.
    ///
    /// The load future is dropped on cancellation. Loaders that run work outside of it (e.g. on a blocking pool)
    /// should poll this flag and give up early.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// The source of the values missing from the cache.
///
/// `Ok(None)` is a valid outcome: the key has no value, nothing is inserted.
pub trait Loader<K, V>: Send + Sync + 'static {
    /// Load the value of `key`. Called at most once per pending load.
    fn load(&self, key: &K, ctx: LoadContext) -> BoxFuture<'static, anyhow::Result<Option<V>>>;
}

/// [`Loader`] from an async closure, see [`loader_fn`].
pub struct LoaderFn<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

/// Build a [`Loader`] from an async closure taking the key and the load context.
pub fn loader_fn<K, V, F, Fut>(f: F) -> LoaderFn<F, Fut>
where
    F: Fn(K, LoadContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<V>>> + Send + 'static,
{
    LoaderFn { f, _marker: PhantomData }
}

impl<K, V, F, Fut> Loader<K, V> for LoaderFn<F, Fut>
where
    K: Key,
    V: Value,
    F: Fn(K, LoadContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<V>>> + Send + 'static,
{
    fn load(&self, key: &K, ctx: LoadContext) -> BoxFuture<'static, anyhow::Result<Option<V>>> {
        (self.f)(key.clone(), ctx).boxed()
    }
}

/// [`Loader`] from a synchronous closure, see [`blocking_loader`].
pub struct BlockingLoader<F> {
    f: Arc<F>,
}

/// Build a [`Loader`] from a synchronous closure. The closure runs on the blocking pool of the executor.
///
/// The closure may adjust the attributes the loaded entry is written with.
pub fn blocking_loader<K, V, F>(f: F) -> BlockingLoader<F>
where
    F: Fn(&K, &mut EntryAttributes) -> anyhow::Result<Option<V>> + Send + Sync + 'static,
{
    BlockingLoader { f: Arc::new(f) }
}

impl<K, V, F> Loader<K, V> for BlockingLoader<F>
where
    K: Key,
    V: Value,
    F: Fn(&K, &mut EntryAttributes) -> anyhow::Result<Option<V>> + Send + Sync + 'static,
{
    fn load(&self, key: &K, ctx: LoadContext) -> BoxFuture<'static, anyhow::Result<Option<V>>> {
        let f = self.f.clone();
        let key = key.clone();
        let slot = ctx.attributes.clone();
        let cancelled = ctx.cancelled.clone();
        let task = ctx.executor.run_blocking(move || {
            if cancelled.load(Ordering::Acquire) {
                return Ok(None);
            }
            let mut attributes = slot.lock().clone();
            let res = f(&key, &mut attributes);
            *slot.lock() = attributes;
            res
        });
        async move { task.await? }.boxed()
    }
}

/// Result of one load, shared by all of its waiters.
pub type LoadResult<K, V> = Result<Option<CacheEntry<K, V>>>;

type SharedLoad<K, V> = Shared<BoxFuture<'static, LoadResult<K, V>>>;

struct PendingLoad<K, V> {
    id: u64,
    waiters: usize,
    shared: SharedLoad<K, V>,
    notifier: oneshot::Sender<LoadResult<K, V>>,
    abort: AbortHandle,
    cancelled: Arc<AtomicBool>,
}

impl<K, V> PendingLoad<K, V> {
    fn cancel(self) {
        self.cancelled.store(true, Ordering::Release);
        self.abort.abort();
        let _ = self.notifier.send(Err(Error::cancelled()));
    }
}

/// Deduplicates the concurrent loads of the same key.
///
/// At most one load per key is in flight. Every caller asking for a key that is being loaded attaches to the pending
/// load and observes the very same result. On completion the pending load is removed before the waiters are notified,
/// so a new load of the key can start right away.
///
/// The coordinator refuses new loads once the cache is shut down, and moves the run state to terminated when the last
/// pending load of a shut down cache is gone.
pub struct LoaderCoordinator<K, V> {
    pending: Mutex<HashMap<K, PendingLoad<K, V>>>,
    next_id: AtomicU64,
    executor: Arc<dyn Executor>,
    state: Arc<RunState>,
}

impl<K, V> Debug for LoaderCoordinator<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderCoordinator")
            .field("pending", &self.pending.lock().len())
            .field("executor", &self.executor)
            .finish()
    }
}

impl<K, V> LoaderCoordinator<K, V>
where
    K: Key,
    V: Value,
{
    /// Create a coordinator spawning loads on `executor`.
    pub fn new(executor: Arc<dyn Executor>, state: Arc<RunState>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            executor,
            state,
        }
    }

    /// Count of pending loads.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns `true` if a load of `key` is in flight.
    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.lock().contains_key(key)
    }

    /// Attach to the pending load of `key`, or start a new one.
    ///
    /// `make` builds the load future from the cancellation flag of the new load. It is only called if no load of
    /// `key` is pending, and must not block: the loader itself runs when the future is polled on the executor. The
    /// future is expected to merge the loaded value into the cache before resolving.
    pub fn load<F>(self: &Arc<Self>, key: &K, make: F) -> Result<Load<K, V>>
    where
        F: FnOnce(Arc<AtomicBool>) -> BoxFuture<'static, LoadResult<K, V>>,
    {
        let mut pending = self.pending.lock();

        if let Some(load) = pending.get_mut(key) {
            load.waiters += 1;
            return Ok(Load {
                shared: load.shared.clone(),
                waiter: Waiter {
                    coordinator: self.clone(),
                    key: key.clone(),
                    id: load.id,
                },
            });
        }

        let state = self.state.get();
        if state >= State::Shutdown {
            return Err(Error::unavailable(state));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancelled = Arc::new(AtomicBool::new(false));
        let (notifier, waiter) = oneshot::channel();
        let shared = waiter
            .map(|res| res.unwrap_or_else(|_| Err(Error::cancelled())))
            .boxed()
            .shared();
        let (abort, registration) = AbortHandle::new_pair();
        let future = Abortable::new(make(cancelled.clone()), registration);

        pending.insert(
            key.clone(),
            PendingLoad {
                id,
                waiters: 1,
                shared: shared.clone(),
                notifier,
                abort,
                cancelled,
            },
        );
        drop(pending);

        tracing::debug!("[loader]: start load {id} of {key:?}");

        let task = LoadTask {
            future,
            coordinator: self.clone(),
            key: key.clone(),
            id,
            started: false,
            finished: false,
        };
        if let Err(e) = self.executor.spawn(task.boxed()) {
            tracing::warn!("[loader]: load {id} of {key:?} rejected: {e}");
            self.complete(key, id, Err(e));
        }

        Ok(Load {
            shared,
            waiter: Waiter {
                coordinator: self.clone(),
                key: key.clone(),
                id,
            },
        })
    }

    /// Cancel all pending loads. Every remaining waiter observes [`ErrorKind::Cancelled`].
    pub fn cancel_all(&self) {
        let loads = {
            let mut pending = self.pending.lock();
            pending.drain().map(|(_, load)| load).collect::<Vec<_>>()
        };
        if !loads.is_empty() {
            tracing::debug!("[loader]: cancel {} pending loads", loads.len());
        }
        for load in loads {
            load.cancel();
        }
        self.state_may_drain();
    }

    /// Drive the run state to terminated if the cache is shut down and no load is pending.
    pub fn state_may_drain(&self) {
        if !self.state.is_at_least(State::Shutdown) {
            return;
        }
        if self.pending.lock().is_empty() {
            self.state.drained();
        }
    }

    fn complete(&self, key: &K, id: u64, res: LoadResult<K, V>) {
        let load = {
            let mut pending = self.pending.lock();
            match pending.get(key) {
                Some(load) if load.id == id => pending.remove(key),
                _ => None,
            }
        };
        let Some(load) = load else {
            return;
        };
        match &res {
            Ok(Some(_)) => tracing::debug!("[loader]: load {id} of {key:?} completed"),
            Ok(None) => tracing::debug!("[loader]: load {id} of {key:?} completed without value"),
            Err(e) => tracing::debug!("[loader]: load {id} of {key:?} failed: {e}"),
        }
        let _ = load.notifier.send(res);
        self.state_may_drain();
    }

    fn detach(&self, key: &K, id: u64) {
        let load = {
            let mut pending = self.pending.lock();
            match pending.get_mut(key) {
                Some(load) if load.id == id => {
                    load.waiters -= 1;
                    if load.waiters > 0 {
                        return;
                    }
                    pending.remove(key)
                }
                _ => None,
            }
        };
        if let Some(load) = load {
            tracing::debug!("[loader]: last waiter of load {id} of {key:?} detached, cancel");
            load.cancel();
            self.state_may_drain();
        }
    }
}

/// The task running one load on the executor.
#[pin_project(PinnedDrop)]
struct LoadTask<K, V>
where
    K: Key,
    V: Value,
{
    #[pin]
    future: Abortable<BoxFuture<'static, LoadResult<K, V>>>,
    coordinator: Arc<LoaderCoordinator<K, V>>,
    key: K,
    id: u64,
    started: bool,
    finished: bool,
}

impl<K, V> Future for LoadTask<K, V>
where
    K: Key,
    V: Value,
{
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        *this.started = true;
        let res = match this.future.poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(res)) => res,
            Poll::Ready(Err(_)) => Err(Error::cancelled()),
        };
        *this.finished = true;
        this.coordinator.complete(this.key, *this.id, res);
        Poll::Ready(())
    }
}

#[pinned_drop]
impl<K, V> PinnedDrop for LoadTask<K, V>
where
    K: Key,
    V: Value,
{
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        if *this.finished {
            return;
        }
        // Dropped by the executor without completing.
        let err = if *this.started {
            Error::cancelled()
        } else {
            Error::new(ErrorKind::Rejected, "load task dropped before it started")
        };
        this.coordinator.complete(this.key, *this.id, Err(err));
    }
}

struct Waiter<K, V>
where
    K: Key,
    V: Value,
{
    coordinator: Arc<LoaderCoordinator<K, V>>,
    key: K,
    id: u64,
}

impl<K, V> Drop for Waiter<K, V>
where
    K: Key,
    V: Value,
{
    fn drop(&mut self) {
        self.coordinator.detach(&self.key, self.id);
    }
}

/// The future of a load, resolving to the loaded entry.
///
/// Dropping it detaches the caller from the load. The load itself is cancelled when its last waiter detaches.
#[pin_project]
pub struct Load<K, V>
where
    K: Key,
    V: Value,
{
    #[pin]
    shared: SharedLoad<K, V>,
    waiter: Waiter<K, V>,
}

impl<K, V> Debug for Load<K, V>
where
    K: Key,
    V: Value,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Load")
            .field("key", &self.waiter.key)
            .field("id", &self.waiter.id)
            .finish()
    }
}

impl<K, V> Load<K, V>
where
    K: Key,
    V: Value,
{
    /// The key being loaded.
    pub fn key(&self) -> &K {
        &self.waiter.key
    }
}

impl<K, V> Future for Load<K, V>
where
    K: Key,
    V: Value,
{
    type Output = LoadResult<K, V>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project().shared.poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::AtomicUsize, time::Duration};

    use cachet_common::spawn::{BlockingTask, Spawner};

    use super::*;

    fn coordinator() -> (Arc<LoaderCoordinator<u64, u64>>, Arc<RunState>) {
        let state = Arc::new(RunState::new());
        let coordinator = Arc::new(LoaderCoordinator::new(Arc::new(Spawner::current()), state.clone()));
        (coordinator, state)
    }

    fn entry(key: u64, value: u64) -> CacheEntry<u64, u64> {
        CacheEntry::new(key, Arc::new(value), &EntryAttributes::default(), None, 0)
    }

    #[test_log::test(tokio::test)]
    async fn test_single_flight() {
        let (coordinator, _) = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<()>();
        let rx = rx.shared();

        let make = |calls: Arc<AtomicUsize>, rx: Shared<oneshot::Receiver<()>>| {
            move |_: Arc<AtomicBool>| {
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let _ = rx.await;
                    Ok::<_, Error>(Some(entry(1, 42)))
                }
                .boxed()
            }
        };

        let l1 = coordinator.load(&1, make(calls.clone(), rx.clone())).unwrap();
        let l2 = coordinator.load(&1, make(calls.clone(), rx.clone())).unwrap();
        assert_eq!(coordinator.pending(), 1);
        tx.send(()).unwrap();

        let (r1, r2) = futures::join!(l1, l2);
        assert_eq!(*r1.unwrap().unwrap().value(), 42);
        assert_eq!(*r2.unwrap().unwrap().value(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.pending(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_same_error_for_all_waiters() {
        let (coordinator, _) = coordinator();
        let (tx, rx) = oneshot::channel::<()>();
        let l1 = coordinator
            .load(&1, move |_| {
                async move {
                    let _ = rx.await;
                    Err(Error::loader(anyhow::anyhow!("boom")))
                }
                .boxed()
            })
            .unwrap();
        let l2 = coordinator.load(&1, |_| unreachable!()).unwrap();
        tx.send(()).unwrap();

        let (e1, e2) = (l1.await.unwrap_err(), l2.await.unwrap_err());
        assert_eq!(e1.kind(), ErrorKind::Loader);
        assert!(e1.same_source(&e2));
    }

    #[test_log::test(tokio::test)]
    async fn test_last_detach_cancels() {
        let (coordinator, _) = coordinator();
        let flag = Arc::new(Mutex::new(None));
        let l1 = coordinator
            .load(&1, {
                let flag = flag.clone();
                move |cancelled| {
                    *flag.lock() = Some(cancelled);
                    futures::future::pending().boxed()
                }
            })
            .unwrap();
        let l2 = coordinator.load(&1, |_| unreachable!()).unwrap();
        let cancelled = flag.lock().clone().unwrap();

        drop(l1);
        assert!(coordinator.is_pending(&1));
        assert!(!cancelled.load(Ordering::Acquire));

        drop(l2);
        assert!(!coordinator.is_pending(&1));
        assert!(cancelled.load(Ordering::Acquire));
    }

    #[test_log::test(tokio::test)]
    async fn test_cancel_all() {
        let (coordinator, state) = coordinator();
        let load = coordinator
            .load(&1, |_| futures::future::pending().boxed())
            .unwrap();

        state.shutdown();
        assert_eq!(
            coordinator.load(&2, |_| unreachable!()).unwrap_err().kind(),
            ErrorKind::Unavailable
        );
        assert_eq!(state.get(), State::Shutdown);

        coordinator.cancel_all();
        assert_eq!(load.await.unwrap_err().kind(), ErrorKind::Cancelled);
        assert!(state.await_termination(Duration::from_secs(1)));
    }

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

    #[test_log::test(tokio::test)]
    async fn test_rejected() {
        let coordinator = Arc::new(LoaderCoordinator::<u64, u64>::new(
            Arc::new(Rejecting),
            Arc::new(RunState::new()),
        ));
        let load = coordinator
            .load(&1, |_| async { Ok::<_, Error>(Some(entry(1, 1))) }.boxed())
            .unwrap();
        assert!(!coordinator.is_pending(&1));
        assert_eq!(load.await.unwrap_err().kind(), ErrorKind::Rejected);
    }

    #[test_log::test(tokio::test)]
    async fn test_blocking_loader() {
        let executor: Arc<dyn Executor> = Arc::new(Spawner::current());
        let loader = blocking_loader(|key: &u64, attrs: &mut EntryAttributes| {
            attrs.cost = 0.5;
            Ok(Some(key * attrs.size))
        });
        let ctx = LoadContext::new(
            EntryAttributes::default().with_size(3),
            false,
            executor,
            Arc::new(AtomicBool::new(false)),
        );
        assert_eq!(loader.load(&7, ctx.clone()).await.unwrap(), Some(21));
        assert_eq!(ctx.attributes(), EntryAttributes::default().with_size(3).with_cost(0.5));
    }
}
