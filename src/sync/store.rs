//! Resource cache storage.
//!
//! A process-wide keyed store mapping each `QueryKey` to its last-known
//! server value. Writes notify the key's subscribers synchronously, after
//! the store lock is released so callbacks may re-enter the cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use metrics::counter;
use serde_json::Value;
use tracing::{debug, warn};

use super::config::SyncConfig;
use super::entry::{CacheEntry, FetchStatus};
use super::error::SyncResult;
use super::keys::{QueryKey, ResourceClass};
use super::lock::{read, write};

const METRIC_STALE_MARK: &str = "prenota_cache_stale_mark_total";

type Callback = Arc<dyn Fn(&QueryKey, &CacheEntry) + Send + Sync>;

struct Subscriber {
    id: u64,
    callback: Callback,
}

/// Keyed store of query results with per-key subscriber notification.
///
/// Entries are never implicitly deleted except by the LRU capacity policy
/// (`SyncConfig::entry_limit`); `remove` evicts explicitly, `mark_stale`
/// flags without clearing so views keep rendering the previous value.
pub struct ResourceCache {
    entries: RwLock<LruCache<QueryKey, CacheEntry>>,
    subscribers: RwLock<HashMap<QueryKey, Vec<Subscriber>>>,
    next_subscriber_id: AtomicU64,
}

impl ResourceCache {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.entry_limit_non_zero())),
            subscribers: RwLock::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(0),
        }
    }

    /// Current entry for a key, touching LRU recency.
    pub fn get(&self, key: &QueryKey) -> SyncResult<Option<CacheEntry>> {
        key.validate()?;
        Ok(write(&self.entries, "get").get(key).cloned())
    }

    /// Current entry without touching recency (snapshots, introspection).
    pub fn peek(&self, key: &QueryKey) -> SyncResult<Option<CacheEntry>> {
        key.validate()?;
        Ok(read(&self.entries, "peek").peek(key).cloned())
    }

    /// Flip a key to `Loading` ahead of a fetch.
    ///
    /// A no-op when the key is already loading; the in-flight record is the
    /// authority on fetch concurrency, this only tracks presentation state.
    pub fn begin_load(&self, key: &QueryKey) -> SyncResult<()> {
        key.validate()?;
        let changed = {
            let mut entries = write(&self.entries, "begin_load");
            let entry = entry_or_default(&mut entries, key);
            if entry.status == FetchStatus::Loading {
                None
            } else {
                entry.status = FetchStatus::Loading;
                Some(entry.clone())
            }
        };
        if let Some(entry) = changed {
            self.notify(key, &entry);
        }
        Ok(())
    }

    /// Record a resolved fetch: value, `Success`, fresh timestamp.
    pub fn resolve(&self, key: &QueryKey, value: Value) -> SyncResult<()> {
        key.validate()?;
        let changed = {
            let mut entries = write(&self.entries, "resolve");
            let entry = entry_or_default(&mut entries, key);
            if !entry.status.can_transition_to(FetchStatus::Success) {
                warn!(?key, from = ?entry.status, "ignoring illegal transition to Success");
                None
            } else {
                *entry = CacheEntry::resolved(value);
                Some(entry.clone())
            }
        };
        if let Some(entry) = changed {
            self.notify(key, &entry);
        }
        Ok(())
    }

    /// Record a failed fetch. The previous value is preserved so the view
    /// can keep rendering it (stale-while-error).
    pub fn fail(&self, key: &QueryKey) -> SyncResult<()> {
        key.validate()?;
        let changed = {
            let mut entries = write(&self.entries, "fail");
            let entry = entry_or_default(&mut entries, key);
            if !entry.status.can_transition_to(FetchStatus::Error) {
                warn!(?key, from = ?entry.status, "ignoring illegal transition to Error");
                None
            } else {
                entry.status = FetchStatus::Error;
                Some(entry.clone())
            }
        };
        if let Some(entry) = changed {
            self.notify(key, &entry);
        }
        Ok(())
    }

    /// Write a speculative value ahead of a mutation's network call.
    ///
    /// Bypasses the transition guard: the mutation engine owns the key while
    /// a mutation is in flight and has already cancelled competing fetches.
    pub fn apply_speculative(&self, key: &QueryKey, value: Value) -> SyncResult<()> {
        key.validate()?;
        let entry = {
            let mut entries = write(&self.entries, "apply_speculative");
            let entry = entry_or_default(&mut entries, key);
            entry.value = Some(value);
            entry.status = FetchStatus::Success;
            entry.clone()
        };
        self.notify(key, &entry);
        Ok(())
    }

    /// Restore a key to a pre-mutation snapshot, flagged stale so the next
    /// read reconciles with server truth. `None` removes the entry.
    pub fn restore(&self, key: &QueryKey, snapshot: Option<CacheEntry>) -> SyncResult<()> {
        key.validate()?;
        let entry = {
            let mut entries = write(&self.entries, "restore");
            match snapshot {
                Some(mut entry) => {
                    entry.is_stale = true;
                    entries.put(key.clone(), entry.clone());
                    entry
                }
                None => {
                    entries.pop(key);
                    CacheEntry::default()
                }
            }
        };
        self.notify(key, &entry);
        Ok(())
    }

    /// Flag a key for refetch-on-next-access without clearing its value.
    ///
    /// Returns whether an entry existed to mark.
    pub fn mark_stale(&self, key: &QueryKey) -> SyncResult<bool> {
        key.validate()?;
        let changed = {
            let mut entries = write(&self.entries, "mark_stale");
            match entries.peek_mut(key) {
                Some(entry) if !entry.is_stale => {
                    entry.is_stale = true;
                    Some(entry.clone())
                }
                _ => None,
            }
        };
        match changed {
            Some(entry) => {
                counter!(METRIC_STALE_MARK).increment(1);
                self.notify(key, &entry);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Flag every cached key of a resource class.
    ///
    /// Idempotent: already-stale entries are skipped, so redelivered push
    /// events cause no extra notifications.
    pub fn mark_class_stale(&self, class: ResourceClass) -> Vec<QueryKey> {
        let matching: Vec<QueryKey> = {
            let entries = read(&self.entries, "mark_class_stale");
            entries
                .iter()
                .filter(|(key, entry)| key.class() == class && !entry.is_stale)
                .map(|(key, _)| key.clone())
                .collect()
        };
        let mut marked = Vec::with_capacity(matching.len());
        for key in matching {
            // validate() cannot fail for keys already admitted to the store
            if matches!(self.mark_stale(&key), Ok(true)) {
                marked.push(key);
            }
        }
        if !marked.is_empty() {
            debug!(?class, count = marked.len(), "class marked stale");
        }
        marked
    }

    /// Explicitly evict a key. Subscribers observe an empty entry.
    pub fn remove(&self, key: &QueryKey) -> SyncResult<()> {
        key.validate()?;
        let removed = write(&self.entries, "remove").pop(key).is_some();
        if removed {
            self.notify(key, &CacheEntry::default());
        }
        Ok(())
    }

    /// Drop every entry. Defined teardown for logout and test isolation;
    /// subscriptions stay registered.
    pub fn clear(&self) {
        write(&self.entries, "clear").clear();
    }

    pub fn len(&self) -> usize {
        read(&self.entries, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a callback invoked synchronously on every write to `key`.
    pub fn subscribe(
        self: &Arc<Self>,
        key: QueryKey,
        callback: impl Fn(&QueryKey, &CacheEntry) + Send + Sync + 'static,
    ) -> SyncResult<Subscription> {
        key.validate()?;
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        write(&self.subscribers, "subscribe")
            .entry(key.clone())
            .or_default()
            .push(Subscriber { id, callback: Arc::new(callback) });
        Ok(Subscription { cache: Arc::clone(self), key, id })
    }

    fn unsubscribe(&self, key: &QueryKey, id: u64) {
        let mut subscribers = write(&self.subscribers, "unsubscribe");
        if let Some(list) = subscribers.get_mut(key) {
            list.retain(|s| s.id != id);
            if list.is_empty() {
                subscribers.remove(key);
            }
        }
    }

    /// Whether any subscriber is registered for `key`.
    pub fn has_subscribers(&self, key: &QueryKey) -> bool {
        read(&self.subscribers, "has_subscribers").contains_key(key)
    }

    fn notify(&self, key: &QueryKey, entry: &CacheEntry) {
        let callbacks: Vec<Callback> = {
            let subscribers = read(&self.subscribers, "notify");
            match subscribers.get(key) {
                Some(list) => list.iter().map(|s| Arc::clone(&s.callback)).collect(),
                None => return,
            }
        };
        for callback in callbacks {
            callback(key, entry);
        }
    }
}

fn entry_or_default<'a>(
    entries: &'a mut LruCache<QueryKey, CacheEntry>,
    key: &QueryKey,
) -> &'a mut CacheEntry {
    entries.get_or_insert_mut(key.clone(), CacheEntry::default)
}

/// Handle returned by `subscribe`; dropping it unregisters the callback.
pub struct Subscription {
    cache: Arc<ResourceCache>,
    key: QueryKey,
    id: u64,
}

impl Subscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cache.unsubscribe(&self.key, self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::sync::keys::Locale;

    fn cache() -> Arc<ResourceCache> {
        Arc::new(ResourceCache::new(&SyncConfig::default()))
    }

    fn services_key(page: u32) -> QueryKey {
        QueryKey::Services { category: None, page, locale: Locale::It }
    }

    #[test]
    fn resolve_then_get_round_trips() {
        let cache = cache();
        let key = services_key(1);

        cache.begin_load(&key).unwrap();
        cache.resolve(&key, json!({"items": [1, 2]})).unwrap();

        let entry = cache.get(&key).unwrap().expect("entry");
        assert_eq!(entry.status, FetchStatus::Success);
        assert!(!entry.is_stale);
        assert_eq!(entry.value, Some(json!({"items": [1, 2]})));
        assert!(entry.fetched_at.is_some());
    }

    #[test]
    fn fail_preserves_previous_value() {
        let cache = cache();
        let key = services_key(1);

        cache.begin_load(&key).unwrap();
        cache.resolve(&key, json!([1])).unwrap();
        cache.begin_load(&key).unwrap();
        cache.fail(&key).unwrap();

        let entry = cache.get(&key).unwrap().expect("entry");
        assert_eq!(entry.status, FetchStatus::Error);
        assert_eq!(entry.value, Some(json!([1])));
    }

    #[test]
    fn resolve_without_begin_load_is_ignored() {
        let cache = cache();
        let key = services_key(1);

        // Idle -> Success is not a legal transition
        cache.resolve(&key, json!(1)).unwrap();

        let entry = cache.get(&key).unwrap().expect("entry");
        assert_eq!(entry.status, FetchStatus::Idle);
        assert_eq!(entry.value, None);
    }

    #[test]
    fn mark_stale_keeps_value() {
        let cache = cache();
        let key = services_key(1);

        cache.begin_load(&key).unwrap();
        cache.resolve(&key, json!("payload")).unwrap();
        assert!(cache.mark_stale(&key).unwrap());

        let entry = cache.get(&key).unwrap().expect("entry");
        assert!(entry.is_stale);
        assert_eq!(entry.value, Some(json!("payload")));
        assert_eq!(entry.status, FetchStatus::Success);
    }

    #[test]
    fn mark_stale_missing_key_reports_false() {
        let cache = cache();
        assert!(!cache.mark_stale(&services_key(9)).unwrap());
    }

    #[test]
    fn mark_class_stale_hits_every_page() {
        let cache = cache();
        for page in 1..=3 {
            let key = services_key(page);
            cache.begin_load(&key).unwrap();
            cache.resolve(&key, json!(page)).unwrap();
        }
        let other = QueryKey::Profile;
        cache.begin_load(&other).unwrap();
        cache.resolve(&other, json!("me")).unwrap();

        let marked = cache.mark_class_stale(ResourceClass::Services);
        assert_eq!(marked.len(), 3);
        assert!(!cache.get(&other).unwrap().unwrap().is_stale);
    }

    #[test]
    fn mark_class_stale_is_idempotent() {
        let cache = cache();
        let key = services_key(1);
        cache.begin_load(&key).unwrap();
        cache.resolve(&key, json!(1)).unwrap();

        assert_eq!(cache.mark_class_stale(ResourceClass::Services).len(), 1);
        assert_eq!(cache.mark_class_stale(ResourceClass::Services).len(), 0);
    }

    #[test]
    fn subscribers_see_writes_synchronously() {
        let cache = cache();
        let key = services_key(1);
        let seen: Arc<Mutex<Vec<FetchStatus>>> = Arc::new(Mutex::new(Vec::new()));

        let seen_by_callback = Arc::clone(&seen);
        let _subscription = cache
            .subscribe(key.clone(), move |_, entry| {
                seen_by_callback.lock().unwrap().push(entry.status);
            })
            .unwrap();

        cache.begin_load(&key).unwrap();
        cache.resolve(&key, json!(1)).unwrap();

        let statuses = seen.lock().unwrap().clone();
        assert_eq!(statuses, vec![FetchStatus::Loading, FetchStatus::Success]);
    }

    #[test]
    fn dropped_subscription_stops_notifications() {
        let cache = cache();
        let key = services_key(1);
        let count = Arc::new(AtomicU64::new(0));

        let count_in_callback = Arc::clone(&count);
        let subscription = cache
            .subscribe(key.clone(), move |_, _| {
                count_in_callback.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();

        cache.begin_load(&key).unwrap();
        drop(subscription);
        cache.resolve(&key, json!(1)).unwrap();

        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert!(!cache.has_subscribers(&key));
    }

    #[test]
    fn callback_may_reenter_the_cache() {
        let cache = cache();
        let key = services_key(1);
        let observed: Arc<Mutex<Option<CacheEntry>>> = Arc::new(Mutex::new(None));

        let reentrant_cache = Arc::clone(&cache);
        let reentrant_key = key.clone();
        let observed_by_callback = Arc::clone(&observed);
        let _subscription = cache
            .subscribe(key.clone(), move |_, _| {
                let entry = reentrant_cache.get(&reentrant_key).unwrap();
                *observed_by_callback.lock().unwrap() = entry;
            })
            .unwrap();

        cache.begin_load(&key).unwrap();
        assert!(observed.lock().unwrap().is_some());
    }

    #[test]
    fn restore_puts_back_snapshot_flagged_stale() {
        let cache = cache();
        let key = QueryKey::Favourites;

        cache.begin_load(&key).unwrap();
        cache.resolve(&key, json!(["a"])).unwrap();
        let snapshot = cache.peek(&key).unwrap();

        cache.apply_speculative(&key, json!(["a", "b"])).unwrap();
        cache.restore(&key, snapshot.clone()).unwrap();

        let entry = cache.get(&key).unwrap().expect("entry");
        let snapshot = snapshot.unwrap();
        assert_eq!(entry.value, snapshot.value);
        assert_eq!(entry.status, snapshot.status);
        assert!(entry.is_stale);
    }

    #[test]
    fn restore_none_removes_entry() {
        let cache = cache();
        let key = QueryKey::Favourites;

        cache.apply_speculative(&key, json!(["a"])).unwrap();
        cache.restore(&key, None).unwrap();

        assert!(cache.get(&key).unwrap().is_none());
    }

    #[test]
    fn remove_notifies_with_empty_entry() {
        let cache = cache();
        let key = services_key(1);
        let last: Arc<Mutex<Option<CacheEntry>>> = Arc::new(Mutex::new(None));

        cache.begin_load(&key).unwrap();
        cache.resolve(&key, json!(1)).unwrap();

        let last_by_callback = Arc::clone(&last);
        let _subscription = cache
            .subscribe(key.clone(), move |_, entry| {
                *last_by_callback.lock().unwrap() = Some(entry.clone());
            })
            .unwrap();

        cache.remove(&key).unwrap();

        let entry = last.lock().unwrap().clone().expect("notified");
        assert_eq!(entry.status, FetchStatus::Idle);
        assert!(entry.value.is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let config = SyncConfig { entry_limit: 2, ..Default::default() };
        let cache = Arc::new(ResourceCache::new(&config));

        for page in 1..=3 {
            let key = services_key(page);
            cache.begin_load(&key).unwrap();
            cache.resolve(&key, json!(page)).unwrap();
        }

        assert!(cache.get(&services_key(1)).unwrap().is_none());
        assert!(cache.get(&services_key(2)).unwrap().is_some());
        assert!(cache.get(&services_key(3)).unwrap().is_some());
    }

    #[test]
    fn invalid_key_is_rejected_at_the_boundary() {
        let cache = cache();
        let bad = QueryKey::Services { category: None, page: 0, locale: Locale::It };
        assert!(cache.get(&bad).is_err());
        assert!(cache.begin_load(&bad).is_err());
        assert!(cache.mark_stale(&bad).is_err());
    }

    #[test]
    fn clear_empties_the_store() {
        let cache = cache();
        let key = services_key(1);
        cache.begin_load(&key).unwrap();
        cache.resolve(&key, json!(1)).unwrap();

        cache.clear();
        assert!(cache.is_empty());
    }
}
