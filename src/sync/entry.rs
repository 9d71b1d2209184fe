//! Cache entry shape and fetch status transitions.

use serde_json::Value;
use time::OffsetDateTime;

/// Lifecycle of a cache entry's backing fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

impl FetchStatus {
    /// Legal transitions: `Idle -> Loading -> {Success, Error}` and
    /// `{Success, Error} -> Loading` on refetch.
    pub fn can_transition_to(self, next: FetchStatus) -> bool {
        matches!(
            (self, next),
            (FetchStatus::Idle, FetchStatus::Loading)
                | (FetchStatus::Loading, FetchStatus::Success)
                | (FetchStatus::Loading, FetchStatus::Error)
                | (FetchStatus::Success, FetchStatus::Loading)
                | (FetchStatus::Error, FetchStatus::Loading)
        )
    }
}

/// Last-known state of one query key.
///
/// `value` survives failed refetches and stale-marking; only an explicit
/// remove discards it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheEntry {
    pub value: Option<Value>,
    pub status: FetchStatus,
    pub fetched_at: Option<OffsetDateTime>,
    pub is_stale: bool,
}

impl CacheEntry {
    /// A fresh, renderable success entry.
    pub fn resolved(value: Value) -> Self {
        Self {
            value: Some(value),
            status: FetchStatus::Success,
            fetched_at: Some(OffsetDateTime::now_utc()),
            is_stale: false,
        }
    }

    /// Whether a read can be served without a network round-trip.
    pub fn is_fresh(&self) -> bool {
        self.status == FetchStatus::Success && !self.is_stale
    }

    /// Whether a read should serve the cached value while a refetch
    /// revalidates it. Holds across the whole revalidation window,
    /// including after a failed refetch (stale-while-error).
    pub fn serves_stale(&self) -> bool {
        self.is_stale && self.value.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legal_transitions() {
        use FetchStatus::*;
        assert!(Idle.can_transition_to(Loading));
        assert!(Loading.can_transition_to(Success));
        assert!(Loading.can_transition_to(Error));
        assert!(Success.can_transition_to(Loading));
        assert!(Error.can_transition_to(Loading));
    }

    #[test]
    fn illegal_transitions() {
        use FetchStatus::*;
        assert!(!Idle.can_transition_to(Success));
        assert!(!Idle.can_transition_to(Error));
        assert!(!Success.can_transition_to(Error));
        assert!(!Error.can_transition_to(Success));
        assert!(!Loading.can_transition_to(Idle));
        assert!(!Loading.can_transition_to(Loading));
    }

    #[test]
    fn resolved_entry_is_fresh() {
        let entry = CacheEntry::resolved(json!({"items": []}));
        assert!(entry.is_fresh());
        assert!(!entry.serves_stale());
        assert!(entry.fetched_at.is_some());
    }

    #[test]
    fn stale_entry_serves_while_revalidating() {
        let mut entry = CacheEntry::resolved(json!(1));
        entry.is_stale = true;
        assert!(!entry.is_fresh());
        assert!(entry.serves_stale());

        // still serves once the refetch has flipped it to Loading
        entry.status = FetchStatus::Loading;
        assert!(entry.serves_stale());

        // a stale entry with no value has nothing to serve
        entry.value = None;
        assert!(!entry.serves_stale());
    }
}
