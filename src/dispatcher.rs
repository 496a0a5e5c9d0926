//! Dispatcher (§4.9): bounded concurrent scheduling of async calls.
//!
//! The teacher has no dispatcher of its own — it calls `reqwest` directly —
//! so this module is grounded instead in the atomics-plus-lock discipline
//! of the teacher's `CircuitBreaker` (hot counters on atomics, the state
//! enum behind a `parking_lot::RwLock`), generalized from "per-breaker state
//! machine" to "per-dispatcher queue state machine."

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

/// A unit of scheduled work: enough to admit and count it without the
/// dispatcher knowing anything about `Call`/`Request` internals.
struct Job {
    host: String,
    permit_acquired: Arc<Notify>,
}

/// Bounded concurrent scheduler over calls grouped by host.
///
/// Mirrors the teacher-independent three-queue shape this engine's async
/// `Call::enqueue` and sync `Call::execute` paths need: `ready`/`running`
/// are gated by `max_requests`/`max_requests_per_host` and feed only the
/// async path (`acquire_async`), while a synchronous `execute()` call is
/// never queued or capped — it runs immediately and is tracked in
/// `running_sync_count` purely so `running_calls()` can report it, the
/// same "bookkeeping only, never gating" split the async/sync queues have
/// upstream. `promote()` (run after every enqueue and every completion)
/// moves as many ready async jobs as it can into running, subject to those
/// two caps. Callers wait on the `Notify` handed back by
/// [`Dispatcher::acquire_async`] to learn when they have been admitted.
pub struct Dispatcher {
    max_requests: AtomicUsize,
    max_requests_per_host: AtomicUsize,
    ready: Mutex<VecDeque<Job>>,
    running_hosts: Mutex<std::collections::HashMap<String, usize>>,
    running_count: AtomicUsize,
    running_sync_count: AtomicUsize,
    idle: Notify,
}

impl Dispatcher {
    pub fn new(max_requests: usize, max_requests_per_host: usize) -> Self {
        Self {
            max_requests: AtomicUsize::new(max_requests),
            max_requests_per_host: AtomicUsize::new(max_requests_per_host),
            ready: Mutex::new(VecDeque::new()),
            running_hosts: Mutex::new(std::collections::HashMap::new()),
            running_count: AtomicUsize::new(0),
            running_sync_count: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests.load(Ordering::Relaxed)
    }

    pub fn set_max_requests(&self, value: usize) {
        self.max_requests.store(value, Ordering::Relaxed);
        self.promote();
    }

    pub fn max_requests_per_host(&self) -> usize {
        self.max_requests_per_host.load(Ordering::Relaxed)
    }

    pub fn set_max_requests_per_host(&self, value: usize) {
        self.max_requests_per_host.store(value, Ordering::Relaxed);
        self.promote();
    }

    /// Total in-flight calls, async and sync combined — matches the
    /// teacher-independent `runningAsyncCalls.size() + runningSyncCalls.size()`
    /// bookkeeping convention this is modeled on.
    pub fn running_calls(&self) -> usize {
        self.running_async_calls() + self.running_sync_calls()
    }

    /// In-flight calls admitted through the bounded async path.
    pub fn running_async_calls(&self) -> usize {
        self.running_count.load(Ordering::Relaxed)
    }

    /// In-flight calls running synchronously. Never gated by
    /// `max_requests`/`max_requests_per_host` — purely a count for
    /// introspection.
    pub fn running_sync_calls(&self) -> usize {
        self.running_sync_count.load(Ordering::Relaxed)
    }

    pub fn queued_calls(&self) -> usize {
        self.ready.lock().len()
    }

    /// Admit an asynchronously-dispatched call (`Call::enqueue`) for `host`,
    /// blocking until the dispatcher's caps allow it to run. Returns a
    /// guard that releases the slot on drop.
    pub async fn acquire_async(self: &Arc<Self>, host: String) -> DispatcherGuard {
        let notify = Arc::new(Notify::new());
        self.ready.lock().push_back(Job {
            host: host.clone(),
            permit_acquired: notify.clone(),
        });
        self.promote();
        notify.notified().await;
        tracing::trace!(%host, running = self.running_async_calls(), "dispatcher admitted async call");
        DispatcherGuard {
            dispatcher: self.clone(),
            host,
        }
    }

    /// Track a synchronously-dispatched call (`Call::execute`) for `host`.
    /// Never queued and never capped — `max_requests`/`max_requests_per_host`
    /// gate only the async path; this exists solely so `running_calls()` can
    /// see it. Returns a guard that untracks it on drop.
    pub fn acquire_sync(self: &Arc<Self>, host: String) -> SyncDispatcherGuard {
        self.running_sync_count.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(%host, running = self.running_sync_calls(), "dispatcher tracking sync call");
        SyncDispatcherGuard {
            dispatcher: self.clone(),
        }
    }

    fn promote(&self) {
        loop {
            let max_requests = self.max_requests();
            let max_per_host = self.max_requests_per_host();
            if self.running_count.load(Ordering::Relaxed) >= max_requests {
                return;
            }
            let mut ready = self.ready.lock();
            let Some(position) = ready.iter().position(|job| {
                let hosts = self.running_hosts.lock();
                hosts.get(&job.host).copied().unwrap_or(0) < max_per_host
            }) else {
                return;
            };
            let job = ready.remove(position).unwrap();
            drop(ready);

            *self.running_hosts.lock().entry(job.host.clone()).or_insert(0) += 1;
            self.running_count.fetch_add(1, Ordering::Relaxed);
            job.permit_acquired.notify_one();
        }
    }

    fn release(&self, host: &str) {
        let mut hosts = self.running_hosts.lock();
        if let Some(count) = hosts.get_mut(host) {
            *count -= 1;
            if *count == 0 {
                hosts.remove(host);
            }
        }
        drop(hosts);
        self.running_count.fetch_sub(1, Ordering::Relaxed);
        self.promote();
        self.notify_if_idle();
    }

    fn release_sync(&self) {
        self.running_sync_count.fetch_sub(1, Ordering::Relaxed);
        self.notify_if_idle();
    }

    fn notify_if_idle(&self) {
        if self.running_count.load(Ordering::Relaxed) == 0
            && self.running_sync_count.load(Ordering::Relaxed) == 0
            && self.ready.lock().is_empty()
        {
            self.idle.notify_waiters();
        }
    }

    /// Resolve once there are no running (async or sync) or queued calls.
    pub async fn idle(&self) {
        while self.running_count.load(Ordering::Relaxed) > 0
            || self.running_sync_count.load(Ordering::Relaxed) > 0
            || !self.ready.lock().is_empty()
        {
            self.idle.notified().await;
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(64, 5)
    }
}

/// Held for the duration of one admitted call; releases its dispatcher slot
/// on drop so a panicking or canceled call doesn't starve the queue.
pub struct DispatcherGuard {
    dispatcher: Arc<Dispatcher>,
    host: String,
}

impl Drop for DispatcherGuard {
    fn drop(&mut self) {
        self.dispatcher.release(&self.host);
    }
}

/// Held for the duration of one synchronously-running call; untracks it on
/// drop. Carries no admission semantics of its own.
pub struct SyncDispatcherGuard {
    dispatcher: Arc<Dispatcher>,
}

impl Drop for SyncDispatcherGuard {
    fn drop(&mut self) {
        self.dispatcher.release_sync();
    }
}

/// A `tokio::sync::Semaphore`-backed variant used where a simpler single
/// global cap (no per-host fairness) suffices, e.g. embedding this crate's
/// dispatcher logic inside another scheduler.
pub struct SimpleDispatcher {
    semaphore: Arc<Semaphore>,
}

impl SimpleDispatcher {
    pub fn new(max_requests: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_requests)),
        }
    }

    pub async fn acquire(&self) -> tokio::sync::OwnedSemaphorePermit {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("dispatcher semaphore never closed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_max_requests_per_host() {
        let dispatcher = Arc::new(Dispatcher::new(10, 1));
        let guard1 = dispatcher.acquire_async("a.example".into()).await;
        assert_eq!(dispatcher.running_calls(), 1);

        let dispatcher2 = dispatcher.clone();
        let second = tokio::spawn(async move { dispatcher2.acquire_async("a.example".into()).await });
        tokio::task::yield_now().await;
        assert_eq!(dispatcher.running_calls(), 1);

        drop(guard1);
        let _guard2 = second.await.unwrap();
        assert_eq!(dispatcher.running_calls(), 1);
    }

    #[tokio::test]
    async fn different_hosts_run_concurrently() {
        let dispatcher = Arc::new(Dispatcher::new(10, 1));
        let _g1 = dispatcher.acquire_async("a.example".into()).await;
        let _g2 = dispatcher.acquire_async("b.example".into()).await;
        assert_eq!(dispatcher.running_calls(), 2);
    }

    #[tokio::test]
    async fn idle_resolves_once_queue_drains() {
        let dispatcher = Arc::new(Dispatcher::new(10, 5));
        {
            let _guard = dispatcher.acquire_async("a.example".into()).await;
        }
        dispatcher.idle().await;
        assert_eq!(dispatcher.running_calls(), 0);
    }

    #[test]
    fn sync_calls_are_never_capped_by_max_requests_per_host() {
        let dispatcher = Arc::new(Dispatcher::new(10, 1));
        let _g1 = dispatcher.acquire_sync("a.example".into());
        let _g2 = dispatcher.acquire_sync("a.example".into());
        let _g3 = dispatcher.acquire_sync("a.example".into());
        assert_eq!(dispatcher.running_sync_calls(), 3);
        assert_eq!(dispatcher.running_async_calls(), 0);
        assert_eq!(dispatcher.running_calls(), 3);
    }

    #[tokio::test]
    async fn idle_waits_for_sync_calls_too() {
        let dispatcher = Arc::new(Dispatcher::new(10, 5));
        {
            let _guard = dispatcher.acquire_sync("a.example".into());
        }
        dispatcher.idle().await;
        assert_eq!(dispatcher.running_calls(), 0);
    }
}
