//! Prenota synchronization core.
//!
//! The four collaborating pieces behind every data-bound view:
//!
//! - **`store`**: keyed resource cache with synchronous subscriber fan-out
//! - **`coordinator`**: single-flight fetch deduplication and
//!   stale-while-revalidate
//! - **`mutation`**: optimistic edits with snapshot rollback
//! - **`listener`**: push-driven invalidation over persistent channels
//!
//! `SyncEngine` wires them together around one explicitly constructed cache
//! (no hidden globals) and owns teardown.

pub mod config;
pub mod coordinator;
pub mod entry;
pub mod error;
pub mod events;
pub mod keys;
pub(crate) mod lock;
pub mod listener;
pub mod mutation;
pub mod planner;
pub mod store;

use std::sync::Arc;

use prenota_api_types::Credential;
use tokio::sync::watch;

pub use config::SyncConfig;
pub use coordinator::FetchCoordinator;
pub use entry::{CacheEntry, FetchStatus};
pub use error::{SyncError, SyncResult};
pub use events::{ChannelKind, InvalidationTarget, PushEvent, PushEventKind};
pub use keys::{Locale, QueryKey, ResourceClass};
pub use listener::{ChannelState, ListenerHandle, PushListener};
pub use mutation::{MutationContext, MutationEngine};
pub use planner::InvalidationPlan;
pub use store::{ResourceCache, Subscription};

use crate::transport::channel::ChannelTransport;

/// The assembled synchronization core.
///
/// Construct one per application and hand it (by reference) to every
/// consumer; `teardown` clears all cached state for logout and test
/// isolation.
pub struct SyncEngine {
    cache: Arc<ResourceCache>,
    coordinator: Arc<FetchCoordinator>,
    mutations: Arc<MutationEngine>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        let cache = Arc::new(ResourceCache::new(&config));
        let coordinator = Arc::new(FetchCoordinator::new(Arc::clone(&cache)));
        let mutations =
            Arc::new(MutationEngine::new(Arc::clone(&cache), Arc::clone(&coordinator)));
        Self { cache, coordinator, mutations, config }
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    pub fn coordinator(&self) -> &Arc<FetchCoordinator> {
        &self.coordinator
    }

    pub fn mutations(&self) -> &Arc<MutationEngine> {
        &self.mutations
    }

    /// Start the push listener against this engine's cache.
    pub fn start_listener(
        &self,
        transport: Arc<dyn ChannelTransport>,
        credentials: watch::Receiver<Option<Credential>>,
    ) -> ListenerHandle {
        PushListener::new(
            Arc::clone(&self.cache),
            transport,
            credentials,
            self.config.clone(),
        )
        .spawn()
    }

    /// Drop every cached entry.
    pub fn teardown(&self) {
        self.cache.clear();
    }
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}
