//! Tracing and metrics bootstrap for host applications embedding the engine.

use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the global tracing subscriber and register metric descriptions.
///
/// Call once at process start. Fails if another subscriber is already
/// installed, which usually means the host application set up its own.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let output = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default())
        .with(output)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("tracing subscriber rejected: {err}")))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "scorcio_preview_start_total",
            Unit::Count,
            "Preview sessions started."
        );
        describe_counter!(
            "scorcio_preview_stop_total",
            Unit::Count,
            "Preview sessions stopped."
        );
        describe_counter!(
            "scorcio_preview_render_full_total",
            Unit::Count,
            "Full page-shell renders."
        );
        describe_counter!(
            "scorcio_preview_render_partial_total",
            Unit::Count,
            "Partial content-fragment renders."
        );
        describe_counter!(
            "scorcio_store_hit_total",
            Unit::Count,
            "Session store hits."
        );
        describe_counter!(
            "scorcio_store_miss_total",
            Unit::Count,
            "Session store misses."
        );
        describe_counter!(
            "scorcio_store_expired_total",
            Unit::Count,
            "Session entries dropped after TTL expiry."
        );
    });
}
