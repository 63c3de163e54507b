use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use foundation::time::Clock;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use runtime::IntervalScheduler;
use tracing::{debug, warn};

use crate::cache::QueryCache;
use crate::key::QueryKey;
use crate::options::QueryOptions;
use crate::state::QueryResult;

type SharedFetch<T, E> = Shared<BoxFuture<'static, Result<Arc<T>, E>>>;

struct InFlight<T, E> {
    id: u64,
    fetch: SharedFetch<T, E>,
}

struct Inner<T, E> {
    cache: QueryCache<T, E>,
    in_flight: HashMap<QueryKey, InFlight<T, E>>,
    intervals: IntervalScheduler<QueryKey>,
    next_fetch_id: u64,
}

impl<T, E> Inner<T, E>
where
    T: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Joins the in-flight fetch for `key` or starts a new one.
    fn start_or_join<F, Fut>(&mut self, key: &QueryKey, fetch: F) -> (u64, SharedFetch<T, E>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if let Some(f) = self.in_flight.get(key) {
            debug!(%key, "joining in-flight query");
            return (f.id, f.fetch.clone());
        }

        let id = self.next_fetch_id;
        self.next_fetch_id += 1;
        let fut: BoxFuture<'static, Result<Arc<T>, E>> =
            fetch().map(|r| r.map(Arc::new)).boxed();
        let shared = fut.shared();
        self.in_flight.insert(
            key.clone(),
            InFlight {
                id,
                fetch: shared.clone(),
            },
        );
        if let Err(err) = self.cache.begin_fetch(key) {
            warn!(%key, "begin_fetch: {err}");
        }
        debug!(%key, fetch_id = id, "query fetch started");
        (id, shared)
    }
}

/// Keyed, deduplicating query client for one dataset type.
///
/// - Concurrent queries for the same key share a single fetch.
/// - Fresh data (younger than `stale_time`) is returned without fetching.
/// - Entries are garbage collected `cache_time` after their last observer
///   is dropped (see [`QueryClient::gc`]).
///
/// The lock is never held across an await point.
pub struct QueryClient<T, E> {
    inner: Arc<Mutex<Inner<T, E>>>,
    clock: Arc<dyn Clock>,
}

impl<T, E> Clone for QueryClient<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<T, E> QueryClient<T, E>
where
    T: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                cache: QueryCache::new(),
                in_flight: HashMap::new(),
                intervals: IntervalScheduler::new(),
                next_fetch_id: 1,
            })),
            clock,
        }
    }

    /// Current state without triggering a fetch.
    pub fn peek(&self, key: &QueryKey) -> QueryResult<T, E> {
        self.inner.lock().cache.result(key)
    }

    pub fn fetch_count(&self, key: &QueryKey) -> u32 {
        self.inner
            .lock()
            .cache
            .state(key)
            .map(|s| s.fetch_count)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().cache.is_empty()
    }

    /// Resolves `key`, fetching only when the cached data is missing or stale.
    pub async fn query<F, Fut>(
        &self,
        key: &QueryKey,
        options: QueryOptions,
        fetch: F,
    ) -> QueryResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let now = self.clock.now();
        let pending = {
            let mut inner = self.inner.lock();
            inner.cache.ensure(key, options, now);
            match options.refetch_interval {
                Some(period) if !inner.intervals.contains(key) => {
                    inner.intervals.schedule(key.clone(), period, now)
                }
                Some(_) => {}
                None => {
                    inner.intervals.cancel(key);
                }
            }

            if !options.enabled {
                return inner.cache.result(key);
            }
            if inner.cache.is_fresh(key, now) {
                debug!(%key, "query cache hit");
                return inner.cache.result(key);
            }
            inner.start_or_join(key, fetch)
        };
        self.settle(key, pending).await
    }

    /// Fetches regardless of freshness. Still joins an in-flight fetch.
    pub async fn refetch<F, Fut>(&self, key: &QueryKey, fetch: F) -> QueryResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let now = self.clock.now();
        let pending = {
            let mut inner = self.inner.lock();
            let options = inner.cache.options(key).unwrap_or_default();
            inner.cache.ensure(key, options, now);
            inner.start_or_join(key, fetch)
        };
        self.settle(key, pending).await
    }

    async fn settle(&self, key: &QueryKey, pending: (u64, SharedFetch<T, E>)) -> QueryResult<T, E> {
        let (id, fetch) = pending;
        let outcome = fetch.await;

        let now = self.clock.now();
        let mut inner = self.inner.lock();
        // Only the first waiter to wake records the outcome.
        if inner.in_flight.get(key).map(|f| f.id) == Some(id) {
            inner.in_flight.remove(key);
            if outcome.is_err() {
                debug!(%key, fetch_id = id, "query fetch failed");
            }
            if let Err(err) = inner.cache.complete(key, outcome, now) {
                warn!(%key, "complete: {err}");
            }
        }
        inner.cache.result(key)
    }

    /// Registers an observer for `key`. The entry is kept alive until the
    /// returned guard and every other observer are dropped.
    pub fn observe(&self, key: &QueryKey, options: QueryOptions) -> QueryObserver<T, E> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.cache.ensure(key, options, now);
        if let Err(err) = inner.cache.observe(key) {
            warn!(%key, "observe: {err}");
        }
        QueryObserver {
            client: self.clone(),
            key: key.clone(),
        }
    }

    pub fn observer_count(&self, key: &QueryKey) -> u32 {
        self.inner.lock().cache.observer_count(key)
    }

    pub fn invalidate(&self, key: &QueryKey) {
        if let Err(err) = self.inner.lock().cache.invalidate(key) {
            debug!("invalidate: {err}");
        }
    }

    /// Evicts expired unobserved entries and cancels their timers.
    pub fn gc(&self) -> Vec<QueryKey> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let evicted = inner.cache.gc(now);
        for key in &evicted {
            inner.intervals.cancel(key);
            debug!(%key, "query evicted");
        }
        evicted
    }

    pub fn keys_to_refetch_on_focus(&self) -> Vec<QueryKey> {
        let now = self.clock.now();
        self.inner.lock().cache.keys_to_refetch_on_focus(now)
    }

    /// Keys whose refetch interval elapsed and that still have observers.
    pub fn keys_due_for_interval(&self) -> Vec<QueryKey> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let due = inner.intervals.due(now);
        due.into_iter()
            .filter(|k| inner.cache.observer_count(k) > 0)
            .collect()
    }

    fn release(&self, key: &QueryKey) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        match inner.cache.release(key, now) {
            Ok(0) => {
                inner.intervals.cancel(key);
            }
            Ok(_) => {}
            Err(err) => debug!("release: {err}"),
        }
    }
}

/// RAII observer handle returned by [`QueryClient::observe`].
pub struct QueryObserver<T, E>
where
    T: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    client: QueryClient<T, E>,
    key: QueryKey,
}

impl<T, E> QueryObserver<T, E>
where
    T: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl<T, E> Drop for QueryObserver<T, E>
where
    T: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.client.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::QueryClient;
    use crate::key::QueryKey;
    use crate::options::QueryOptions;
    use crate::state::QueryStatus;
    use foundation::time::{ManualClock, Millis};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn setup() -> (Arc<ManualClock>, QueryClient<Vec<u32>, String>) {
        let clock = Arc::new(ManualClock::new(Millis(0)));
        let client = QueryClient::new(clock.clone());
        (clock, client)
    }

    fn counting(
        calls: &Arc<AtomicUsize>,
        value: Vec<u32>,
    ) -> impl FnOnce() -> futures_util::future::Ready<Result<Vec<u32>, String>> {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            futures_util::future::ready(Ok(value))
        }
    }

    #[tokio::test]
    async fn fresh_data_is_served_from_cache() {
        let (clock, client) = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("stations");
        let opts = QueryOptions::default().stale_time(Duration::from_secs(60));

        let first = client.query(&key, opts, counting(&calls, vec![1])).await;
        assert_eq!(first.data(), Some(&vec![1]));

        clock.advance(Duration::from_secs(30));
        let second = client.query(&key, opts, counting(&calls, vec![2])).await;
        assert_eq!(second.data(), Some(&vec![1]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(30));
        let third = client.query(&key, opts, counting(&calls, vec![3])).await;
        assert_eq!(third.data(), Some(&vec![3]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_queries_share_one_fetch() {
        let (_clock, client) = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("districts").with("province", "East");
        let opts = QueryOptions::default();

        let slow = {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::task::yield_now().await;
                    tokio::task::yield_now().await;
                    Ok::<_, String>(vec![9])
                }
            }
        };

        let (a, b) = tokio::join!(
            client.query(&key, opts, slow),
            client.query(&key, opts, counting(&calls, vec![0])),
        );
        assert_eq!(a.data(), Some(&vec![9]));
        assert_eq!(b.data(), Some(&vec![9]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.fetch_count(&key), 1);
    }

    #[tokio::test]
    async fn errors_surface_without_dropping_data() {
        let (_clock, client) = setup();
        let key = QueryKey::new("provinces");
        let opts = QueryOptions::default();

        client
            .query(&key, opts, || async { Ok::<_, String>(vec![4]) })
            .await;
        let failed = client
            .query(&key, opts, || async { Err::<Vec<u32>, _>("503".to_string()) })
            .await;

        assert!(failed.is_error);
        assert_eq!(failed.status, QueryStatus::Error);
        assert_eq!(failed.error.as_deref(), Some("503"));
        assert_eq!(failed.data(), Some(&vec![4]));
    }

    #[tokio::test]
    async fn disabled_query_never_fetches() {
        let (_clock, client) = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("gee-tiles").with("pollutant", "NO2");
        let r = client
            .query(
                &key,
                QueryOptions::default().enabled(false),
                counting(&calls, vec![1]),
            )
            .await;
        assert_eq!(r.status, QueryStatus::Idle);
        assert!(r.data.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refetch_ignores_freshness() {
        let (_clock, client) = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("stations");
        let opts = QueryOptions::default().stale_time(Duration::from_secs(600));
        client.query(&key, opts, counting(&calls, vec![1])).await;
        let r = client.refetch(&key, counting(&calls, vec![2])).await;
        assert_eq!(r.data(), Some(&vec![2]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unobserved_entries_are_collected_after_cache_time() {
        let (clock, client) = setup();
        let key = QueryKey::new("stations");
        let opts = QueryOptions::default().cache_time(Duration::from_secs(10));

        let observer = client.observe(&key, opts);
        client
            .query(&key, opts, || async { Ok::<_, String>(vec![1]) })
            .await;
        clock.advance(Duration::from_secs(60));
        assert!(client.gc().is_empty());

        drop(observer);
        assert_eq!(client.observer_count(&key), 0);
        clock.advance(Duration::from_secs(9));
        assert!(client.gc().is_empty());
        clock.advance(Duration::from_secs(1));
        assert_eq!(client.gc(), vec![key.clone()]);
        assert_eq!(client.peek(&key).status, QueryStatus::Idle);
    }

    #[tokio::test]
    async fn interval_refetch_requires_an_observer() {
        let (clock, client) = setup();
        let key = QueryKey::new("stations");
        let opts = QueryOptions::default().refetch_interval(Some(Duration::from_secs(30)));

        let observer = client.observe(&key, opts);
        client
            .query(&key, opts, || async { Ok::<_, String>(vec![1]) })
            .await;

        clock.advance(Duration::from_secs(30));
        assert_eq!(client.keys_due_for_interval(), vec![key.clone()]);
        assert!(client.keys_due_for_interval().is_empty());

        drop(observer);
        clock.advance(Duration::from_secs(30));
        assert!(client.keys_due_for_interval().is_empty());
    }

    #[tokio::test]
    async fn focus_refetch_lists_stale_observed_queries() {
        let (clock, client) = setup();
        let key = QueryKey::new("districts");
        let opts = QueryOptions::default().stale_time(Duration::from_secs(5));
        let _observer = client.observe(&key, opts);
        client
            .query(&key, opts, || async { Ok::<_, String>(vec![1]) })
            .await;
        assert!(client.keys_to_refetch_on_focus().is_empty());
        clock.advance(Duration::from_secs(5));
        assert_eq!(client.keys_to_refetch_on_focus(), vec![key]);
    }
}
