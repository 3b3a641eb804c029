use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
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
            "mecenate_source_fetch_errors_total",
            Unit::Count,
            "Total number of failed platform fetches, labelled by platform."
        );
        describe_counter!(
            "mecenate_avatar_cache_hits_total",
            Unit::Count,
            "Total number of avatar resolutions served from the disk cache."
        );
        describe_counter!(
            "mecenate_avatar_cache_misses_total",
            Unit::Count,
            "Total number of avatar resolutions that had to re-read the source."
        );
        describe_gauge!(
            "mecenate_sponsors",
            Unit::Count,
            "Sponsor count in the most recent successful build."
        );
        describe_histogram!(
            "mecenate_rebuild_ms",
            Unit::Milliseconds,
            "Full pipeline rebuild latency in milliseconds."
        );
        describe_histogram!(
            "mecenate_raster_ms",
            Unit::Milliseconds,
            "Raster derivative conversion latency in milliseconds."
        );
    });
}
