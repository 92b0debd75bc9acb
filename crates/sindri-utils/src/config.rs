/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Sindri Config Module
//! This module provides the configuration framework shared by the Sindri crates.
//!
//! # Variable Naming Convention
//!
//! - Struct fields use snake_case (e.g., `controller`, `health_port`)
//! - Environment variables use SCREAMING_SNAKE_CASE and are prefixed with "SINDRI__"
//!   (e.g., `SINDRI__CONTROLLER__HEALTH_PORT`)
//! - Configuration file keys use snake_case (e.g., `controller.health_port`, `log.level`)
//!
//! # Configuration Overriding
//!
//! Values are loaded in the following order (later sources take precedence):
//!
//! 1. Default values from the embedded `default.toml` file
//! 2. Values from an optional external configuration file (if provided)
//! 3. Environment variables
//!
//! # Available Environment Variables
//!
//! - `SINDRI__LOG__LEVEL`: log level ("trace", "debug", "info", "warn", "error"). Default: "info"
//! - `SINDRI__LOG__FORMAT`: "text" or "json". Default: "text"
//! - `SINDRI__CONTROLLER__KUBECONFIG_PATH`: kubeconfig for the management cluster.
//!   Default: unset (in-cluster or `KUBECONFIG`)
//! - `SINDRI__CONTROLLER__HEALTH_PORT`: port of the health, metrics and admission server.
//!   Default: 8080
//! - `SINDRI__CONTROLLER__CONTROLLER_IDENTITY`: username the admission gate always admits.
//! - `SINDRI__CONTROLLER__PLAN_POLL_INTERVAL`: seconds between checks of an unapplied plan. Default: 5
//! - `SINDRI__CONTROLLER__ADDRESS_POLL_INTERVAL`: seconds between checks for a machine address. Default: 10
//! - `SINDRI__CONTROLLER__CONVERGENCE_POLL_INTERVAL`: seconds between multi-machine checks. Default: 30
//! - `SINDRI__CONTROLLER__INVENTORY_INTERVAL`: seconds between inventory syncs. Default: 300

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

// Include the default settings file as a string constant
const DEFAULT_SETTINGS: &str = include_str!("../default.toml");

/// Represents the main settings structure for the application
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Logging configuration
    pub log: Log,
    /// Controller configuration
    pub controller: Controller,
    /// Telemetry configuration
    pub telemetry: Telemetry,
}

/// Represents the controller configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Controller {
    /// Kubeconfig path for the management cluster
    pub kubeconfig_path: Option<String>,
    /// Health, metrics and admission HTTP server port
    pub health_port: u16,
    /// Username of the controller itself; always admitted by the admission gate
    pub controller_identity: String,
    /// Suffix appended to a machine name to form its agent's ServiceAccount name
    pub agent_service_account_suffix: String,
    /// Control plane kinds for which snapshot inventories are synced
    pub supported_control_planes: Vec<String>,
    /// Seconds between polls of a plan that has not been applied yet
    pub plan_poll_interval: u64,
    /// Seconds between polls for a machine's internal address
    pub address_poll_interval: u64,
    /// Seconds between polls of multi-machine convergence
    pub convergence_poll_interval: u64,
    /// Seconds between snapshot inventory syncs of a cluster
    pub inventory_interval: u64,
    /// Seconds before a failed reconciliation is retried
    pub error_requeue_interval: u64,
}

/// Fixed requeue delays used by the reconcilers. None of them back off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequeueIntervals {
    pub plan: Duration,
    pub address: Duration,
    pub convergence: Duration,
    pub inventory: Duration,
    pub error: Duration,
}

impl Default for RequeueIntervals {
    fn default() -> Self {
        Self {
            plan: Duration::from_secs(5),
            address: Duration::from_secs(10),
            convergence: Duration::from_secs(30),
            inventory: Duration::from_secs(300),
            error: Duration::from_secs(15),
        }
    }
}

impl Controller {
    /// Requeue delays derived from the configured poll intervals
    pub fn requeue_intervals(&self) -> RequeueIntervals {
        RequeueIntervals {
            plan: Duration::from_secs(self.plan_poll_interval),
            address: Duration::from_secs(self.address_poll_interval),
            convergence: Duration::from_secs(self.convergence_poll_interval),
            inventory: Duration::from_secs(self.inventory_interval),
            error: Duration::from_secs(self.error_requeue_interval),
        }
    }
}

/// Represents the logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Log {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,
    /// Log format: "text" for human-readable, "json" for structured JSON
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Represents the telemetry (OpenTelemetry) configuration with per-component overrides
#[derive(Debug, Deserialize, Clone)]
pub struct Telemetry {
    /// Whether telemetry is enabled (base default)
    #[serde(default)]
    pub enabled: bool,
    /// OTLP endpoint for trace export (gRPC)
    #[serde(default = "default_otlp_endpoint")]
    pub otlp_endpoint: String,
    /// Service name for traces
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Sampling rate (0.0 to 1.0)
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
    /// Controller-specific overrides
    #[serde(default)]
    pub controller: TelemetryOverride,
}

/// Component-specific telemetry overrides (all fields optional)
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelemetryOverride {
    pub enabled: Option<bool>,
    pub otlp_endpoint: Option<String>,
    pub service_name: Option<String>,
    pub sampling_rate: Option<f64>,
}

/// Resolved telemetry configuration after merging base with overrides
#[derive(Debug, Clone)]
pub struct ResolvedTelemetry {
    pub enabled: bool,
    pub otlp_endpoint: String,
    pub service_name: String,
    pub sampling_rate: f64,
}

impl Telemetry {
    /// Get resolved telemetry config for the controller (base merged with controller overrides)
    pub fn for_controller(&self) -> ResolvedTelemetry {
        ResolvedTelemetry {
            enabled: self.controller.enabled.unwrap_or(self.enabled),
            otlp_endpoint: self
                .controller
                .otlp_endpoint
                .clone()
                .unwrap_or_else(|| self.otlp_endpoint.clone()),
            service_name: self
                .controller
                .service_name
                .clone()
                .unwrap_or_else(|| self.service_name.clone()),
            sampling_rate: self.controller.sampling_rate.unwrap_or(self.sampling_rate),
        }
    }
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "sindri".to_string()
}

fn default_sampling_rate() -> f64 {
    0.1
}

impl Settings {
    /// Creates a new `Settings` instance
    ///
    /// # Arguments
    ///
    /// * `file` - An optional path to a configuration file
    pub fn new(file: Option<String>) -> Result<Self, ConfigError> {
        let mut s = Config::builder()
            .add_source(File::from_str(DEFAULT_SETTINGS, config::FileFormat::Toml));

        s = match file {
            Some(x) => s.add_source(File::with_name(x.as_str())),
            None => s,
        };

        // Environment variables are prefixed with "SINDRI" and use "__" as a separator;
        // list settings take comma-separated values
        s = s.add_source(
            Environment::with_prefix("SINDRI")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("controller.supported_control_planes"),
        );

        s.build()?.try_deserialize()
    }
}
