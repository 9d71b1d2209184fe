//! Push invalidation listener.
//!
//! One worker task per notification channel. Each worker drives an explicit
//! connection state machine bound to credential presence: a credential
//! appearing dials the channel, losing the connection reconnects with
//! doubling backoff, and removing the credential (or shutting the handle
//! down) tears the connection down. Received events are merged into
//! invalidation plans and applied to the resource cache; the resulting
//! subscriber notifications are what prompt active views to refetch.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use metrics::counter;
use prenota_api_types::Credential;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::transport::channel::{ChannelTransport, EventStream};

use super::config::SyncConfig;
use super::events::{ChannelKind, PushEvent};
use super::planner::InvalidationPlan;
use super::store::ResourceCache;

const METRIC_EVENTS: &str = "prenota_channel_event_total";
const METRIC_RECONNECTS: &str = "prenota_channel_reconnect_total";

/// Connection state of one notification channel, observable per channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Spawns and owns the per-channel worker tasks.
pub struct PushListener {
    cache: Arc<ResourceCache>,
    transport: Arc<dyn ChannelTransport>,
    credentials: watch::Receiver<Option<Credential>>,
    config: SyncConfig,
}

impl PushListener {
    pub fn new(
        cache: Arc<ResourceCache>,
        transport: Arc<dyn ChannelTransport>,
        credentials: watch::Receiver<Option<Credential>>,
        config: SyncConfig,
    ) -> Self {
        Self { cache, transport, credentials, config }
    }

    /// Start one worker per channel and return the controlling handle.
    pub fn spawn(self) -> ListenerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut states = HashMap::new();
        let mut tasks = Vec::new();

        for channel in ChannelKind::ALL {
            let (state_tx, state_rx) = watch::channel(ChannelState::Disconnected);
            states.insert(channel, state_rx);
            let worker = ChannelWorker {
                cache: Arc::clone(&self.cache),
                transport: Arc::clone(&self.transport),
                credentials: self.credentials.clone(),
                shutdown: shutdown_rx.clone(),
                state: state_tx,
                config: self.config.clone(),
                channel,
            };
            tasks.push(tokio::spawn(worker.run()));
        }

        ListenerHandle { states, shutdown: shutdown_tx, tasks }
    }
}

/// Controls the listener's worker tasks; dropping it aborts them.
pub struct ListenerHandle {
    states: HashMap<ChannelKind, watch::Receiver<ChannelState>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Observe one channel's connection state.
    pub fn state(&self, channel: ChannelKind) -> watch::Receiver<ChannelState> {
        self.states
            .get(&channel)
            .cloned()
            .unwrap_or_else(|| watch::channel(ChannelState::Disconnected).1)
    }

    /// Graceful teardown: signal every worker and wait for it to stop.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            if let Err(error) = task.await
                && !error.is_cancelled()
            {
                warn!(%error, "listener worker ended abnormally");
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        for task in &self.tasks {
            task.abort();
        }
    }
}

enum PumpEnd {
    Shutdown,
    CredentialChanged,
    Lost(String),
}

struct ChannelWorker {
    cache: Arc<ResourceCache>,
    transport: Arc<dyn ChannelTransport>,
    credentials: watch::Receiver<Option<Credential>>,
    shutdown: watch::Receiver<bool>,
    state: watch::Sender<ChannelState>,
    config: SyncConfig,
    channel: ChannelKind,
}

impl ChannelWorker {
    async fn run(mut self) {
        // true once an established connection has been lost
        let mut resume = false;
        let mut backoff = self.config.reconnect_base();

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let Some(token) = self.current_token() else {
                resume = false;
                backoff = self.config.reconnect_base();
                self.set_state(ChannelState::Disconnected);
                tokio::select! {
                    changed = self.credentials.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = self.shutdown.changed() => {}
                }
                continue;
            };

            self.set_state(if resume { ChannelState::Reconnecting } else { ChannelState::Connecting });
            if resume {
                counter!(METRIC_RECONNECTS, "channel" => self.channel.as_str()).increment(1);
            }

            match self.transport.connect(self.channel, &token).await {
                Ok(stream) => {
                    info!(channel = self.channel.as_str(), "channel connected");
                    self.set_state(ChannelState::Connected);
                    backoff = self.config.reconnect_base();
                    match self.pump(stream).await {
                        PumpEnd::Shutdown => break,
                        PumpEnd::CredentialChanged => {
                            resume = false;
                            continue;
                        }
                        PumpEnd::Lost(reason) => {
                            warn!(channel = self.channel.as_str(), %reason, "channel lost");
                            resume = true;
                        }
                    }
                }
                Err(error) => {
                    // never fatal: log and retry with backoff
                    warn!(channel = self.channel.as_str(), %error, "channel handshake failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = self.shutdown.changed() => {}
                changed = self.credentials.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            backoff = (backoff * 2).min(self.config.reconnect_cap());
        }

        self.set_state(ChannelState::Disconnected);
        debug!(channel = self.channel.as_str(), "channel worker stopped");
    }

    fn current_token(&self) -> Option<String> {
        self.credentials.borrow().as_ref().map(|c| c.access_token.clone())
    }

    fn set_state(&self, next: ChannelState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(channel = self.channel.as_str(), ?previous, ?next, "channel state");
        }
    }

    /// Read events until shutdown, credential change, or connection loss.
    async fn pump(&mut self, mut stream: EventStream) -> PumpEnd {
        loop {
            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        return PumpEnd::Shutdown;
                    }
                }
                changed = self.credentials.changed() => {
                    // removal and rotation both force a fresh handshake
                    return match changed {
                        Ok(()) => PumpEnd::CredentialChanged,
                        Err(_) => PumpEnd::Shutdown,
                    };
                }
                next = stream.next() => match next {
                    Some(Ok(event)) => {
                        if let Some(end) = self.consume(event, &mut stream) {
                            return end;
                        }
                    }
                    Some(Err(error)) => return PumpEnd::Lost(error.to_string()),
                    None => return PumpEnd::Lost("stream ended".into()),
                },
            }
        }
    }

    /// Merge the received event with any already-buffered ones and apply
    /// the resulting plan. Events are handled strictly in receipt order.
    fn consume(&self, first: PushEvent, stream: &mut EventStream) -> Option<PumpEnd> {
        let mut batch = vec![first];
        let mut end = None;
        while batch.len() < self.config.event_batch_limit_non_zero() {
            match stream.next().now_or_never() {
                None => break,
                Some(Some(Ok(event))) => batch.push(event),
                Some(Some(Err(error))) => {
                    end = Some(PumpEnd::Lost(error.to_string()));
                    break;
                }
                Some(None) => {
                    end = Some(PumpEnd::Lost("stream ended".into()));
                    break;
                }
            }
        }

        counter!(METRIC_EVENTS, "channel" => self.channel.as_str()).increment(batch.len() as u64);
        let plan = InvalidationPlan::from_events(batch);
        if !plan.is_empty() {
            let marked = plan.apply(&self.cache);
            info!(
                channel = self.channel.as_str(),
                %plan,
                marked = marked.len(),
                "push invalidation applied"
            );
        }
        end
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::channel::mpsc;
    use prenota_api_types::Role;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::sync::QueryKey;
    use crate::sync::events::PushEventKind;
    use crate::transport::error::TransportError;

    type EventSender = mpsc::UnboundedSender<Result<PushEvent, TransportError>>;

    /// Transport that hands each connection's sender to the test.
    struct MockTransport {
        connects: AtomicUsize,
        fail_first: usize,
        taps: std::sync::Mutex<HashMap<ChannelKind, EventSender>>,
    }

    impl MockTransport {
        fn new(fail_first: usize) -> Arc<Self> {
            Arc::new(Self {
                connects: AtomicUsize::new(0),
                fail_first,
                taps: std::sync::Mutex::new(HashMap::new()),
            })
        }

        fn connect_count(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        fn tap(&self, channel: ChannelKind) -> Option<EventSender> {
            self.taps.lock().unwrap().get(&channel).cloned()
        }
    }

    #[async_trait]
    impl ChannelTransport for MockTransport {
        async fn connect(
            &self,
            channel: ChannelKind,
            _token: &str,
        ) -> Result<EventStream, TransportError> {
            let attempt = self.connects.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first {
                return Err(TransportError::Handshake("scripted failure".into()));
            }
            let (tx, rx) = mpsc::unbounded();
            self.taps.lock().unwrap().insert(channel, tx);
            Ok(Box::pin(rx))
        }
    }

    fn fast_config() -> SyncConfig {
        SyncConfig { reconnect_base_ms: 5, reconnect_cap_ms: 20, ..Default::default() }
    }

    fn credential() -> Credential {
        Credential {
            access_token: "tok".into(),
            refresh_token: "ref".into(),
            role: Role::Resident,
        }
    }

    async fn wait_for_state(
        rx: &mut watch::Receiver<ChannelState>,
        wanted: ChannelState,
    ) {
        for _ in 0..200 {
            if *rx.borrow() == wanted {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("channel never reached {wanted:?}, stuck at {:?}", *rx.borrow());
    }

    #[tokio::test]
    async fn channels_stay_disconnected_without_credential() {
        let cache = Arc::new(ResourceCache::new(&SyncConfig::default()));
        let transport = MockTransport::new(0);
        let (_cred_tx, cred_rx) = watch::channel(None);

        let handle = PushListener::new(cache, transport.clone(), cred_rx, fast_config()).spawn();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(*handle.state(ChannelKind::Booking).borrow(), ChannelState::Disconnected);
        assert_eq!(transport.connect_count(), 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn credential_arrival_connects_every_channel() {
        let cache = Arc::new(ResourceCache::new(&SyncConfig::default()));
        let transport = MockTransport::new(0);
        let (cred_tx, cred_rx) = watch::channel(None);

        let handle = PushListener::new(cache, transport.clone(), cred_rx, fast_config()).spawn();
        cred_tx.send(Some(credential())).unwrap();

        for channel in ChannelKind::ALL {
            wait_for_state(&mut handle.state(channel), ChannelState::Connected).await;
        }
        assert_eq!(transport.connect_count(), 3);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn event_marks_cached_key_stale() {
        let cache = Arc::new(ResourceCache::new(&SyncConfig::default()));
        let key = QueryKey::BookingDetail { booking_id: Uuid::from_u128(7) };
        cache.begin_load(&key).unwrap();
        cache.resolve(&key, json!({"status": "confirmed"})).unwrap();

        let transport = MockTransport::new(0);
        let (_cred_tx, cred_rx) = watch::channel(Some(credential()));
        let handle =
            PushListener::new(Arc::clone(&cache), transport.clone(), cred_rx, fast_config())
                .spawn();
        wait_for_state(&mut handle.state(ChannelKind::Booking), ChannelState::Connected).await;

        let tap = transport.tap(ChannelKind::Booking).unwrap();
        tap.unbounded_send(Ok(PushEvent {
            id: Uuid::from_u128(1),
            kind: PushEventKind::BookingCompleted { booking_id: Some(Uuid::from_u128(7)) },
        }))
        .unwrap();

        for _ in 0..200 {
            if cache.peek(&key).unwrap().unwrap().is_stale {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(cache.peek(&key).unwrap().unwrap().is_stale);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn lost_connection_reconnects_with_backoff() {
        let cache = Arc::new(ResourceCache::new(&SyncConfig::default()));
        let transport = MockTransport::new(0);
        let (_cred_tx, cred_rx) = watch::channel(Some(credential()));
        let handle = PushListener::new(cache, transport.clone(), cred_rx, fast_config()).spawn();

        wait_for_state(&mut handle.state(ChannelKind::Booking), ChannelState::Connected).await;
        let before = transport.connect_count();

        // sever the booking channel by dropping its sender
        drop(transport.tap(ChannelKind::Booking).unwrap());
        transport.taps.lock().unwrap().remove(&ChannelKind::Booking);

        wait_for_state(&mut handle.state(ChannelKind::Booking), ChannelState::Connected).await;
        assert!(transport.connect_count() > before);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn handshake_failures_retry_until_success() {
        let cache = Arc::new(ResourceCache::new(&SyncConfig::default()));
        // the first three dials fail, one per channel
        let transport = MockTransport::new(3);
        let (_cred_tx, cred_rx) = watch::channel(Some(credential()));
        let handle = PushListener::new(cache, transport.clone(), cred_rx, fast_config()).spawn();

        for channel in ChannelKind::ALL {
            wait_for_state(&mut handle.state(channel), ChannelState::Connected).await;
        }
        assert!(transport.connect_count() >= 6);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn credential_removal_disconnects_all_channels() {
        let cache = Arc::new(ResourceCache::new(&SyncConfig::default()));
        let key = QueryKey::BookingDetail { booking_id: Uuid::from_u128(9) };
        cache.begin_load(&key).unwrap();
        cache.resolve(&key, json!({})).unwrap();

        let transport = MockTransport::new(0);
        let (cred_tx, cred_rx) = watch::channel(Some(credential()));
        let handle =
            PushListener::new(Arc::clone(&cache), transport.clone(), cred_rx, fast_config())
                .spawn();
        wait_for_state(&mut handle.state(ChannelKind::Booking), ChannelState::Connected).await;

        let tap = transport.tap(ChannelKind::Booking).unwrap();
        cred_tx.send(None).unwrap();
        for channel in ChannelKind::ALL {
            wait_for_state(&mut handle.state(channel), ChannelState::Disconnected).await;
        }

        // events sent after disconnection no longer mark anything stale
        let _ = tap.unbounded_send(Ok(PushEvent {
            id: Uuid::from_u128(2),
            kind: PushEventKind::BookingCompleted { booking_id: Some(Uuid::from_u128(9)) },
        }));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!cache.peek(&key).unwrap().unwrap().is_stale);
        handle.shutdown().await;
    }
}
