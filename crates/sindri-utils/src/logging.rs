/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Sindri Logging Module
//!
//! Structured logging for the Sindri crates, built on `tracing`.
//!
//! ## Usage
//!
//! 1. Initialize the subscriber once at startup (or let [`crate::telemetry::init`] do it):
//!    ```rust,ignore
//!    sindri_utils::logging::init("info", "text")?;
//!    ```
//!
//! 2. Use the macros from the prelude:
//!    ```rust,ignore
//!    use sindri_utils::logging::prelude::*;
//!    info!(cluster = "c1", "Restore started");
//!    ```
//!
//! ## Log Levels
//!
//! "off", "error", "warn", "info" (default), "debug", "trace". Unknown values fall
//! back to "info". `RUST_LOG` takes precedence over the configured level when set.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Parses a configured level, falling back to `info` for anything unrecognised.
pub fn level_filter(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "off" => LevelFilter::OFF,
        "error" => LevelFilter::ERROR,
        "warn" => LevelFilter::WARN,
        "info" => LevelFilter::INFO,
        "debug" => LevelFilter::DEBUG,
        "trace" => LevelFilter::TRACE,
        _ => LevelFilter::INFO,
    }
}

/// Builds the env filter: `RUST_LOG` if present, the configured level otherwise.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level_filter(level).into()))
}

/// Returns the output layer for the requested format ("json" or anything else for text).
pub fn fmt_layer<S>(format: &str) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    }
}

/// Initializes a plain tracing subscriber without trace export.
///
/// # Arguments
/// * `level` - Log level ("trace", "debug", "info", "warn", "error", "off")
/// * `format` - Output format ("text" or "json")
pub fn init(level: &str, format: &str) -> Result<(), TryInitError> {
    Registry::default()
        .with(env_filter(level))
        .with(fmt_layer(format))
        .try_init()
}

pub mod prelude {
    pub use tracing::{debug, error, info, instrument, trace, warn};
}
