//! Fetch coordination: single-flight deduplication and stale-while-revalidate.
//!
//! The coordinator owns the in-flight request records. At most one network
//! fetch exists per query key; every concurrent requester attaches to the
//! same record and receives the same settled outcome.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::{counter, histogram};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use super::error::{SyncError, SyncResult};
use super::keys::QueryKey;
use super::store::ResourceCache;

const METRIC_HIT: &str = "prenota_cache_hit_total";
const METRIC_MISS: &str = "prenota_cache_miss_total";
const METRIC_STALE_HIT: &str = "prenota_cache_stale_hit_total";
const METRIC_DEDUP: &str = "prenota_fetch_dedup_total";
const METRIC_FETCH_MS: &str = "prenota_fetch_ms";

/// How a fetch settled, fanned out to every attached waiter.
#[derive(Debug, Clone)]
enum FetchOutcome {
    Resolved(Value),
    Failed(SyncError),
    Cancelled,
}

/// At most one per key at any instant.
struct InFlightRecord {
    tx: watch::Sender<Option<FetchOutcome>>,
    abort: AbortHandle,
}

/// Deduplicating read-through in front of the resource cache.
pub struct FetchCoordinator {
    cache: Arc<ResourceCache>,
    in_flight: Arc<DashMap<QueryKey, InFlightRecord>>,
}

impl FetchCoordinator {
    pub fn new(cache: Arc<ResourceCache>) -> Self {
        Self { cache, in_flight: Arc::new(DashMap::new()) }
    }

    /// Resolve `key`, invoking `loader` only when no usable cached value and
    /// no in-flight fetch exists.
    ///
    /// A fresh success is served from cache. A stale success is returned
    /// synchronously while a background refetch revalidates it. Anything
    /// else joins or starts an in-flight fetch and awaits its settlement.
    pub async fn fetch<L, Fut>(&self, key: QueryKey, loader: L) -> SyncResult<Value>
    where
        L: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<Value>> + Send + 'static,
    {
        key.validate()?;

        match self.cache.get(&key)? {
            Some(entry) if entry.is_fresh() => {
                if let Some(value) = entry.value {
                    counter!(METRIC_HIT).increment(1);
                    return Ok(value);
                }
            }
            Some(entry) if entry.serves_stale() => {
                if let Some(value) = entry.value {
                    counter!(METRIC_STALE_HIT).increment(1);
                    // revalidate in the background; the loader is
                    // deduplicated against any refetch already underway
                    let _ = self.attach(&key, loader);
                    return Ok(value);
                }
            }
            _ => {}
        }

        counter!(METRIC_MISS).increment(1);
        let (rx, joined) = self.attach(&key, loader);
        if joined {
            counter!(METRIC_DEDUP).increment(1);
        }
        self.wait(&key, rx).await
    }

    /// Abort the in-flight fetch for `key`, if any.
    ///
    /// Called by the mutation engine before an optimistic write so a late
    /// fetch resolution cannot clobber the speculative value. Waiters are
    /// settled from whatever the cache holds at that point.
    pub fn cancel(&self, key: &QueryKey) -> bool {
        match self.in_flight.remove(key) {
            Some((_, record)) => {
                record.abort.abort();
                let _ = record.tx.send(Some(FetchOutcome::Cancelled));
                debug!(?key, "cancelled in-flight fetch");
                true
            }
            None => false,
        }
    }

    /// Number of fetches currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Join the existing record for `key` or start a new fetch task.
    ///
    /// Returns the outcome receiver and whether an existing record was
    /// joined, in which case `loader` is dropped unused (the dedup
    /// guarantee).
    fn attach<L, Fut>(&self, key: &QueryKey, loader: L) -> (watch::Receiver<Option<FetchOutcome>>, bool)
    where
        L: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<Value>> + Send + 'static,
    {
        // flip to Loading outside the in-flight map lock; subscriber
        // callbacks run synchronously and may re-enter the coordinator
        let _ = self.cache.begin_load(key);

        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(occupied) => (occupied.get().tx.subscribe(), true),
            Entry::Vacant(vacant) => {
                let (tx, rx) = watch::channel(None);
                let fut = loader();
                let task_cache = Arc::clone(&self.cache);
                let task_map = Arc::clone(&self.in_flight);
                let task_key = key.clone();
                let task_tx = tx.clone();
                let started_at = Instant::now();
                let handle = tokio::spawn(async move {
                    let outcome = match fut.await {
                        Ok(value) => {
                            let _ = task_cache.resolve(&task_key, value.clone());
                            FetchOutcome::Resolved(value)
                        }
                        Err(error) => {
                            warn!(key = ?task_key, %error, "fetch failed");
                            let _ = task_cache.fail(&task_key);
                            FetchOutcome::Failed(error)
                        }
                    };
                    histogram!(METRIC_FETCH_MS)
                        .record(started_at.elapsed().as_secs_f64() * 1000.0);
                    task_map.remove(&task_key);
                    let _ = task_tx.send(Some(outcome));
                });

                vacant.insert(InFlightRecord { tx, abort: handle.abort_handle() });
                (rx, false)
            }
        }
    }

    async fn wait(
        &self,
        key: &QueryKey,
        mut rx: watch::Receiver<Option<FetchOutcome>>,
    ) -> SyncResult<Value> {
        loop {
            let outcome = rx.borrow_and_update().clone();
            if let Some(outcome) = outcome {
                return self.settle(key, outcome);
            }
            if rx.changed().await.is_err() {
                // sender dropped without settling; treat as a cancellation
                return self.settle(key, FetchOutcome::Cancelled);
            }
        }
    }

    fn settle(&self, key: &QueryKey, outcome: FetchOutcome) -> SyncResult<Value> {
        match outcome {
            FetchOutcome::Resolved(value) => Ok(value),
            FetchOutcome::Failed(error) => Err(error),
            FetchOutcome::Cancelled => match self.cache.peek(key)?.and_then(|e| e.value) {
                Some(value) => Ok(value),
                None => Err(SyncError::network("fetch cancelled before any value arrived")),
            },
        }
    }
}
