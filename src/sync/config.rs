//! Synchronization core configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_ENTRY_LIMIT: usize = 512;
const DEFAULT_RECONNECT_BASE_MS: u64 = 1000;
const DEFAULT_RECONNECT_CAP_MS: u64 = 60_000;
const DEFAULT_EVENT_BATCH_LIMIT: usize = 64;

/// Tunables for the cache, coordinator, and push listener.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum cached query entries before LRU eviction.
    pub entry_limit: usize,
    /// Initial reconnect delay for push channels (ms), doubled per attempt.
    pub reconnect_base_ms: u64,
    /// Reconnect delay ceiling for push channels (ms).
    pub reconnect_cap_ms: u64,
    /// Maximum push events merged into one invalidation plan.
    pub event_batch_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            entry_limit: DEFAULT_ENTRY_LIMIT,
            reconnect_base_ms: DEFAULT_RECONNECT_BASE_MS,
            reconnect_cap_ms: DEFAULT_RECONNECT_CAP_MS,
            event_batch_limit: DEFAULT_EVENT_BATCH_LIMIT,
        }
    }
}

impl SyncConfig {
    /// Entry limit as `NonZeroUsize`, clamping to 1 if zero.
    pub fn entry_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.entry_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms.max(1))
    }

    pub fn reconnect_cap(&self) -> Duration {
        Duration::from_millis(self.reconnect_cap_ms.max(self.reconnect_base_ms.max(1)))
    }

    /// Event batch limit, never zero.
    pub fn event_batch_limit_non_zero(&self) -> usize {
        self.event_batch_limit.max(1)
    }
}
