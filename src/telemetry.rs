//! Tracing installation and metric descriptions.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LoadError, LogFormat, LoggingSettings};

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), LoadError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            LoadError::Telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "prenota_cache_hit_total",
            Unit::Count,
            "Fetches served from a fresh cache entry."
        );
        describe_counter!(
            "prenota_cache_miss_total",
            Unit::Count,
            "Fetches that required a network round-trip."
        );
        describe_counter!(
            "prenota_cache_stale_hit_total",
            Unit::Count,
            "Fetches served stale while a revalidation ran in the background."
        );
        describe_counter!(
            "prenota_cache_stale_mark_total",
            Unit::Count,
            "Cache entries flagged for refetch-on-next-access."
        );
        describe_counter!(
            "prenota_fetch_dedup_total",
            Unit::Count,
            "Fetch calls that attached to an already in-flight request."
        );
        describe_histogram!(
            "prenota_fetch_ms",
            Unit::Milliseconds,
            "Network fetch latency in milliseconds."
        );
        describe_counter!(
            "prenota_mutation_total",
            Unit::Count,
            "Optimistic mutations started."
        );
        describe_counter!(
            "prenota_mutation_rollback_total",
            Unit::Count,
            "Optimistic mutations rolled back after a server rejection."
        );
        describe_counter!(
            "prenota_channel_event_total",
            Unit::Count,
            "Push events received, per channel."
        );
        describe_counter!(
            "prenota_channel_reconnect_total",
            Unit::Count,
            "Push channel reconnection attempts, per channel."
        );
    });
}
