//! Optimistic mutations with snapshot rollback.
//!
//! A mutation writes its speculative value into the cache before the network
//! call resolves, so every subscriber renders the edit immediately. The
//! pre-mutation entry is captured in a `MutationContext`; a failed network
//! call restores it exactly. Mutations on the same key are serialized, so a
//! snapshot is always taken against a settled state.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use metrics::counter;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::coordinator::FetchCoordinator;
use super::entry::CacheEntry;
use super::error::SyncResult;
use super::keys::QueryKey;
use super::store::ResourceCache;

const METRIC_MUTATION: &str = "prenota_mutation_total";
const METRIC_ROLLBACK: &str = "prenota_mutation_rollback_total";

/// Pending-mutation record: the key, the pre-mutation snapshot, and enough
/// identity to correlate log lines. One exists per in-flight mutation.
#[derive(Debug)]
pub struct MutationContext {
    pub id: Uuid,
    pub key: QueryKey,
    pub snapshot: Option<CacheEntry>,
    pub started_at: OffsetDateTime,
}

impl MutationContext {
    fn capture(cache: &ResourceCache, key: &QueryKey) -> SyncResult<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            key: key.clone(),
            snapshot: cache.peek(key)?,
            started_at: OffsetDateTime::now_utc(),
        })
    }
}

/// Applies speculative edits and reconciles them with server truth.
pub struct MutationEngine {
    cache: Arc<ResourceCache>,
    coordinator: Arc<FetchCoordinator>,
    key_locks: DashMap<QueryKey, Arc<Mutex<()>>>,
}

impl MutationEngine {
    pub fn new(cache: Arc<ResourceCache>, coordinator: Arc<FetchCoordinator>) -> Self {
        Self { cache, coordinator, key_locks: DashMap::new() }
    }

    /// Run an optimistic mutation against `key`.
    ///
    /// `speculative` builds the provisional value from the current one;
    /// `network` performs the server call. On success the key is marked
    /// stale so the next read reconciles with server truth; on failure the
    /// pre-mutation entry is restored and the error surfaced.
    pub async fn mutate<U, N, Fut>(
        &self,
        key: QueryKey,
        speculative: U,
        network: N,
    ) -> SyncResult<Value>
    where
        U: FnOnce(Option<&Value>) -> Value,
        N: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<Value>>,
    {
        key.validate()?;
        counter!(METRIC_MUTATION).increment(1);

        // serialize mutations per key: a later mutation waits for the
        // earlier one to settle, so interleaved rollbacks cannot occur
        let key_lock = self
            .key_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = key_lock.lock().await;

        // a late fetch resolution must not overwrite the speculative value
        self.coordinator.cancel(&key);

        let context = MutationContext::capture(&self.cache, &key)?;
        debug!(mutation_id = %context.id, key = ?key, "mutation started");

        let provisional = speculative(context.snapshot.as_ref().and_then(|e| e.value.as_ref()));
        self.cache.apply_speculative(&key, provisional)?;

        match network().await {
            Ok(response) => {
                self.cache.mark_stale(&key)?;
                debug!(mutation_id = %context.id, "mutation confirmed");
                Ok(response)
            }
            Err(error) => {
                warn!(mutation_id = %context.id, %error, "mutation failed, rolling back");
                self.cache.restore(&key, context.snapshot)?;
                counter!(METRIC_ROLLBACK).increment(1);
                Err(error)
            }
        }
    }
}
