/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Sindri Telemetry Module
//!
//! OpenTelemetry-based distributed tracing for the controller.
//!
//! - OTLP export to any OpenTelemetry-compatible collector
//! - Configurable sampling rate
//! - Falls back to plain structured logging when disabled
//!
//! ```rust,ignore
//! let settings = sindri_utils::Settings::new(None)?;
//! sindri_utils::telemetry::init(
//!     &settings.telemetry.for_controller(),
//!     &settings.log.level,
//!     &settings.log.format,
//! )?;
//! ```

use crate::config::ResolvedTelemetry;
use crate::logging;
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::Sampler;
use opentelemetry_sdk::{runtime, Resource};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Error type for telemetry initialization
#[derive(Debug)]
pub enum TelemetryError {
    /// Failed to create OTLP exporter
    ExporterError(String),
    /// Failed to set global subscriber
    SubscriberError(String),
}

impl std::fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryError::ExporterError(e) => write!(f, "OTLP exporter error: {}", e),
            TelemetryError::SubscriberError(e) => write!(f, "Subscriber error: {}", e),
        }
    }
}

impl std::error::Error for TelemetryError {}

/// Maps a sampling rate onto an OpenTelemetry sampler.
pub fn sampler_for(rate: f64) -> Sampler {
    if rate >= 1.0 {
        Sampler::AlwaysOn
    } else if rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(rate)
    }
}

/// Initialize tracing with the given configuration.
///
/// If telemetry is disabled this only installs the logging subscriber.
///
/// # Arguments
/// * `config` - Resolved telemetry configuration (from `Telemetry::for_controller()`)
/// * `log_level` - Log level filter string (e.g., "info", "debug")
/// * `log_format` - Log format ("text" or "json")
pub fn init(
    config: &ResolvedTelemetry,
    log_level: &str,
    log_format: &str,
) -> Result<(), TelemetryError> {
    if !config.enabled {
        return logging::init(log_level, log_format)
            .map_err(|e| TelemetryError::SubscriberError(e.to_string()));
    }

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()
        .map_err(|e| TelemetryError::ExporterError(e.to_string()))?;

    let tracer_provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_sampler(sampler_for(config.sampling_rate))
        .with_resource(Resource::new(vec![
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                config.service_name.clone(),
            ),
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            ),
        ]))
        .build();

    let tracer = tracer_provider.tracer(config.service_name.clone());
    opentelemetry::global::set_tracer_provider(tracer_provider);

    tracing_subscriber::registry()
        .with(logging::env_filter(log_level))
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(logging::fmt_layer(log_format))
        .try_init()
        .map_err(|e| TelemetryError::SubscriberError(e.to_string()))
}

/// Shutdown OpenTelemetry, flushing any pending traces.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampler_bounds() {
        assert!(matches!(sampler_for(1.5), Sampler::AlwaysOn));
        assert!(matches!(sampler_for(1.0), Sampler::AlwaysOn));
        assert!(matches!(sampler_for(-0.5), Sampler::AlwaysOff));
        assert!(matches!(sampler_for(0.25), Sampler::TraceIdRatioBased(r) if (r - 0.25).abs() < f64::EPSILON));
    }

    #[test]
    fn test_error_display() {
        let err = TelemetryError::ExporterError("unreachable".to_string());
        assert_eq!(err.to_string(), "OTLP exporter error: unreachable");
    }
}
