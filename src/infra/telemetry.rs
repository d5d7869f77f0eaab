use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
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
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "folio_cache_hit_total",
            Unit::Count,
            "Total number of lookups answered by a fresh entry."
        );
        describe_counter!(
            "folio_cache_stale_total",
            Unit::Count,
            "Total number of lookups answered by a stale entry."
        );
        describe_counter!(
            "folio_cache_miss_total",
            Unit::Count,
            "Total number of lookups that waited on a production."
        );
        describe_counter!(
            "folio_cache_evict_total",
            Unit::Count,
            "Total number of entries evicted due to capacity."
        );
        describe_counter!(
            "folio_cache_self_heal_total",
            Unit::Count,
            "Total number of entries removed because a production returned no content."
        );
        describe_counter!(
            "folio_cache_validation_failure_total",
            Unit::Count,
            "Total number of values rejected by a shape check."
        );
        describe_histogram!(
            "folio_cache_produce_ms",
            Unit::Milliseconds,
            "Production latency in milliseconds."
        );
        describe_histogram!(
            "folio_warm_ms",
            Unit::Milliseconds,
            "Cache warm run latency in milliseconds."
        );
    });
}
