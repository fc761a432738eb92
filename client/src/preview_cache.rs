//! Short-lived cache of per-visit preview photos.
//!
//! One instance lives per map-view session. Concurrent readers of the same
//! visit share a single in-flight fetch; every fetch can be cancelled, and
//! a cancelled or superseded fetch never writes into the cache.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use futures::future::{AbortHandle, Abortable, FutureExt, LocalBoxFuture, Shared};
use visitmap_shared::PreviewPhoto;

use crate::api::ApiError;

pub const PREVIEW_TTL_MS: f64 = 5.0 * 60.0 * 1000.0;

pub(crate) trait PreviewFetcher {
    async fn list_preview(&self, visit_id: i64) -> Result<Vec<PreviewPhoto>, ApiError>;
}

pub type PreviewData = Arc<Vec<PreviewPhoto>>;

type FetchResult = Result<PreviewData, ApiError>;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: PreviewData,
    inserted_at_ms: f64,
}

struct InFlight {
    id: u64,
    future: Shared<LocalBoxFuture<'static, FetchResult>>,
    abort: AbortHandle,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<i64, CacheEntry>,
    in_flight: HashMap<i64, InFlight>,
    next_flight: u64,
}

pub struct PreviewCache<F> {
    fetcher: Rc<F>,
    clock: Box<dyn Fn() -> f64>,
    ttl_ms: f64,
    inner: RefCell<CacheInner>,
}

impl<F: PreviewFetcher + 'static> PreviewCache<F> {
    /// `clock` returns milliseconds; only differences between readings matter.
    pub fn new(fetcher: Rc<F>, clock: impl Fn() -> f64 + 'static) -> Self {
        Self {
            fetcher,
            clock: Box::new(clock),
            ttl_ms: PREVIEW_TTL_MS,
            inner: RefCell::new(CacheInner::default()),
        }
    }

    fn is_fresh(&self, entry: &CacheEntry, now_ms: f64) -> bool {
        now_ms - entry.inserted_at_ms < self.ttl_ms
    }

    /// Fresh cached value, if any. Never touches the network.
    pub fn peek(&self, visit_id: i64) -> Option<PreviewData> {
        let now_ms = (self.clock)();
        let mut inner = self.inner.borrow_mut();
        match inner.entries.get(&visit_id) {
            Some(entry) if self.is_fresh(entry, now_ms) => Some(entry.value.clone()),
            Some(_) => {
                inner.entries.remove(&visit_id);
                None
            }
            None => None,
        }
    }

    #[cfg(test)]
    pub fn is_loading(&self, visit_id: i64) -> bool {
        self.inner.borrow().in_flight.contains_key(&visit_id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn join_or_start(&self, visit_id: i64) -> (u64, Shared<LocalBoxFuture<'static, FetchResult>>) {
        let mut inner = self.inner.borrow_mut();
        if let Some(flight) = inner.in_flight.get(&visit_id) {
            return (flight.id, flight.future.clone());
        }

        inner.next_flight += 1;
        let id = inner.next_flight;
        let (abort, registration) = AbortHandle::new_pair();
        let fetcher = Rc::clone(&self.fetcher);
        let fetch = async move { fetcher.list_preview(visit_id).await.map(Arc::new) };
        let future = Abortable::new(fetch, registration)
            .map(|result| result.unwrap_or(Err(ApiError::Aborted)))
            .boxed_local()
            .shared();
        inner.in_flight.insert(
            visit_id,
            InFlight {
                id,
                future: future.clone(),
                abort,
            },
        );
        (id, future)
    }

    /// Cached value if younger than the TTL, otherwise the (shared) fetch.
    pub async fn get(&self, visit_id: i64) -> FetchResult {
        if let Some(value) = self.peek(visit_id) {
            return Ok(value);
        }

        let (flight_id, future) = self.join_or_start(visit_id);
        let result = future.await;

        let mut inner = self.inner.borrow_mut();
        let is_current = inner
            .in_flight
            .get(&visit_id)
            .is_some_and(|flight| flight.id == flight_id);
        if is_current {
            inner.in_flight.remove(&visit_id);
            if let Ok(value) = &result {
                inner.entries.insert(
                    visit_id,
                    CacheEntry {
                        value: value.clone(),
                        inserted_at_ms: (self.clock)(),
                    },
                );
            }
        }
        result
    }

    /// Abort an outstanding fetch. Waiting callers resolve with `Aborted`.
    pub fn cancel(&self, visit_id: i64) {
        if let Some(flight) = self.inner.borrow_mut().in_flight.remove(&visit_id) {
            flight.abort.abort();
        }
    }

    /// Drop the cached value and any fetch that could repopulate it with old data.
    pub fn invalidate(&self, visit_id: i64) {
        self.cancel(visit_id);
        self.inner.borrow_mut().entries.remove(&visit_id);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        for (_, flight) in inner.in_flight.drain() {
            flight.abort.abort();
        }
        inner.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::{HashSet, VecDeque};

    use futures::channel::oneshot;
    use futures::executor::{LocalPool, block_on};
    use futures::task::LocalSpawnExt;

    use super::*;

    fn photos(visit_id: i64, count: usize) -> Vec<PreviewPhoto> {
        (0..count)
            .map(|n| PreviewPhoto {
                id: visit_id * 100 + n as i64,
                visit_record_id: visit_id,
                image_url: format!("https://img.example/{visit_id}/{n}.jpg"),
                title: None,
                note: None,
                order: n as u32 + 1,
            })
            .collect()
    }

    #[derive(Default)]
    struct FakeFetcher {
        albums: RefCell<HashMap<i64, Vec<PreviewPhoto>>>,
        failing: RefCell<HashSet<i64>>,
        gates: RefCell<VecDeque<oneshot::Receiver<()>>>,
        calls: Cell<usize>,
    }

    impl FakeFetcher {
        fn with_album(visit_id: i64, count: usize) -> Rc<Self> {
            let fetcher = Self::default();
            fetcher.albums.borrow_mut().insert(visit_id, photos(visit_id, count));
            Rc::new(fetcher)
        }

        fn gate_next(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.gates.borrow_mut().push_back(rx);
            tx
        }
    }

    impl PreviewFetcher for FakeFetcher {
        async fn list_preview(&self, visit_id: i64) -> Result<Vec<PreviewPhoto>, ApiError> {
            self.calls.set(self.calls.get() + 1);
            let gate = self.gates.borrow_mut().pop_front();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if self.failing.borrow().contains(&visit_id) {
                return Err(ApiError::Http(503));
            }
            Ok(self.albums.borrow().get(&visit_id).cloned().unwrap_or_default())
        }
    }

    fn cache(fetcher: Rc<FakeFetcher>) -> (Rc<PreviewCache<FakeFetcher>>, Rc<Cell<f64>>) {
        let now = Rc::new(Cell::new(1_000.0));
        let clock = now.clone();
        (Rc::new(PreviewCache::new(fetcher, move || clock.get())), now)
    }

    #[test]
    fn fresh_entry_is_served_without_fetching() {
        let fetcher = FakeFetcher::with_album(3, 3);
        let (cache, now) = cache(fetcher.clone());

        assert_eq!(block_on(cache.get(3)).unwrap().len(), 3);
        assert_eq!(fetcher.calls.get(), 1);

        now.set(now.get() + PREVIEW_TTL_MS - 1.0);
        assert_eq!(cache.peek(3).map(|photos| photos.len()), Some(3));
        assert_eq!(block_on(cache.get(3)).unwrap().len(), 3);
        assert_eq!(fetcher.calls.get(), 1);
    }

    #[test]
    fn stale_entry_triggers_exactly_one_refetch() {
        let fetcher = FakeFetcher::with_album(3, 3);
        let (cache, now) = cache(fetcher.clone());
        block_on(cache.get(3)).unwrap();

        now.set(now.get() + PREVIEW_TTL_MS);
        assert!(cache.peek(3).is_none());

        let release = fetcher.gate_next();
        let mut pool = LocalPool::new();
        let results: Rc<RefCell<Vec<usize>>> = Rc::default();
        for _ in 0..3 {
            let task_cache = cache.clone();
            let task_results = results.clone();
            pool.spawner()
                .spawn_local(async move {
                    if let Ok(photos) = task_cache.get(3).await {
                        task_results.borrow_mut().push(photos.len());
                    }
                })
                .unwrap();
        }
        pool.run_until_stalled();
        assert!(cache.is_loading(3));

        release.send(()).unwrap();
        pool.run_until_stalled();

        assert_eq!(*results.borrow(), vec![3, 3, 3]);
        assert_eq!(fetcher.calls.get(), 2);
        assert!(!cache.is_loading(3));
    }

    #[test]
    fn cancelled_fetch_writes_nothing() {
        let fetcher = FakeFetcher::with_album(8, 2);
        let _held = fetcher.gate_next();
        let (cache, _now) = cache(fetcher);
        let mut pool = LocalPool::new();
        let outcome: Rc<RefCell<Option<FetchResult>>> = Rc::default();

        let task_cache = cache.clone();
        let task_outcome = outcome.clone();
        pool.spawner()
            .spawn_local(async move {
                *task_outcome.borrow_mut() = Some(task_cache.get(8).await);
            })
            .unwrap();
        pool.run_until_stalled();

        cache.cancel(8);
        pool.run_until_stalled();

        assert_eq!(*outcome.borrow(), Some(Err(ApiError::Aborted)));
        assert!(cache.is_empty());
        assert!(!cache.is_loading(8));
    }

    #[test]
    fn failures_are_not_cached() {
        let fetcher = FakeFetcher::with_album(4, 1);
        fetcher.failing.borrow_mut().insert(4);
        let (cache, _now) = cache(fetcher.clone());

        assert_eq!(block_on(cache.get(4)), Err(ApiError::Http(503)));
        fetcher.failing.borrow_mut().clear();
        assert_eq!(block_on(cache.get(4)).unwrap().len(), 1);
        assert_eq!(fetcher.calls.get(), 2);
    }

    #[test]
    fn invalidate_forces_next_read_to_fetch() {
        let fetcher = FakeFetcher::with_album(6, 1);
        let (cache, _now) = cache(fetcher.clone());
        block_on(cache.get(6)).unwrap();

        fetcher.albums.borrow_mut().insert(6, photos(6, 2));
        cache.invalidate(6);
        assert!(cache.peek(6).is_none());
        assert_eq!(block_on(cache.get(6)).unwrap().len(), 2);
        assert_eq!(fetcher.calls.get(), 2);
    }

    #[test]
    fn clear_drops_everything() {
        let fetcher = FakeFetcher::with_album(1, 1);
        let (cache, _now) = cache(fetcher);
        block_on(cache.get(1)).unwrap();
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
