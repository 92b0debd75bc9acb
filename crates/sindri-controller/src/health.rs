/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Health Check Module
//!
//! HTTP endpoints for Kubernetes probes and Prometheus scraping.
//!
//! ## Endpoints
//!
//! - `GET /healthz`: liveness, 200 while the process runs
//! - `GET /readyz`: readiness, 200 when the management API server answers
//! - `GET /health`: JSON status with uptime and version
//! - `GET /metrics`: Prometheus text exposition
//!
//! The admission route is merged in by [`configure_routes`].

use crate::admission::{configure_admission_routes, AdmissionState};
use crate::metrics;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use kube::Client;
use serde::Serialize;
use sindri_utils::logging::prelude::*;
use std::time::SystemTime;

/// Shared state for health endpoints
#[derive(Clone)]
pub struct HealthState {
    pub k8s_client: Client,
    pub start_time: SystemTime,
}

#[derive(Serialize)]
struct HealthStatus {
    status: String,
    kubernetes: KubernetesStatus,
    uptime_seconds: u64,
    version: String,
    timestamp: String,
}

#[derive(Serialize)]
struct KubernetesStatus {
    connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Configures the health check router
pub fn configure_health_routes(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Health, metrics and admission routes served on the health port.
pub fn configure_routes(health: HealthState, admission: AdmissionState) -> Router {
    configure_health_routes(health).merge(configure_admission_routes(admission))
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Returns 503 when the management API server cannot be reached.
async fn readyz(State(state): State<HealthState>) -> impl IntoResponse {
    match state.k8s_client.apiserver_version().await {
        Ok(_) => (StatusCode::OK, "Ready"),
        Err(e) => {
            error!("Kubernetes API connectivity check failed: {:?}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Kubernetes API unavailable",
            )
        }
    }
}

async fn health(State(state): State<HealthState>) -> impl IntoResponse {
    let uptime = state
        .start_time
        .elapsed()
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let (connected, error) = match state.k8s_client.apiserver_version().await {
        Ok(_) => (true, None),
        Err(e) => {
            error!("Kubernetes API connectivity check failed: {:?}", e);
            (false, Some(e.to_string()))
        }
    };

    let status_code = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = HealthStatus {
        status: if connected { "healthy" } else { "unhealthy" }.to_string(),
        kubernetes: KubernetesStatus { connected, error },
        uptime_seconds: uptime,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (status_code, Json(body))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        metrics::encode_metrics(),
    )
}
