//! Prenota client data layer.
//!
//! The synchronization core behind the Prenota booking apps: a keyed
//! resource cache with single-flight fetches, optimistic mutations with
//! rollback, and push-driven invalidation over persistent notification
//! channels. View rendering, routing, and string localization live in the
//! hosting application; this crate owns everything between them and the
//! network.

pub mod api;
pub mod config;
pub mod session;
pub mod sync;
pub mod telemetry;
pub mod transport;

pub use api::PlatformClient;
pub use session::CredentialStore;
pub use sync::{
    CacheEntry, ChannelKind, ChannelState, FetchCoordinator, FetchStatus, ListenerHandle, Locale,
    MutationEngine, PushEvent, PushEventKind, QueryKey, ResourceCache, ResourceClass, SyncConfig,
    SyncEngine, SyncError, SyncResult,
};
pub use transport::{ApiClient, ChannelTransport, SessionState, WsChannelTransport};
