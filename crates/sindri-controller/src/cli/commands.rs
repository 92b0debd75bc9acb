/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # CLI Commands Module
//!
//! ## Startup Sequence
//!
//! ```mermaid
//! flowchart TD
//!     A[Load Config] --> B[Init Telemetry]
//!     B --> C[Create Kubernetes Client]
//!     C --> D[Start Health/Admission Server]
//!     D --> E[Run Controllers]
//!     E -->|SIGTERM/SIGINT| F[Stop Server]
//!     F --> G[Flush Traces]
//! ```

use crate::admission::{AdmissionState, KubeAccessReviewer};
use crate::cluster::KubeClusterControl;
use crate::controllers::{self, Context, Orchestrator};
use crate::plan::secret_store::SecretPlanStore;
use crate::plan::Planner;
use crate::remote::RemoteSnapshotFiles;
use crate::{health, k8s};
use sindri_utils::config::Settings;
use sindri_utils::logging::prelude::*;
use sindri_utils::telemetry;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::oneshot;

pub async fn start(config: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::new(config)?;
    telemetry::init(
        &settings.telemetry.for_controller(),
        &settings.log.level,
        &settings.log.format,
    )?;
    info!("Starting Sindri controller");

    let controller = &settings.controller;
    let client = k8s::api::create_k8s_client(controller.kubeconfig_path.as_deref()).await?;

    let store = Arc::new(SecretPlanStore::new(
        client.clone(),
        controller.agent_service_account_suffix.clone(),
    ));
    let orchestrator = Orchestrator {
        planner: Planner::new(store),
        snapshot_files: Arc::new(RemoteSnapshotFiles::new(client.clone())),
        clusters: Arc::new(KubeClusterControl::new(client.clone())),
        intervals: controller.requeue_intervals(),
    };
    let ctx = Arc::new(Context::new(
        client.clone(),
        orchestrator,
        controller.supported_control_planes.clone(),
    ));

    let router = health::configure_routes(
        health::HealthState {
            k8s_client: client.clone(),
            start_time: SystemTime::now(),
        },
        AdmissionState {
            identity: controller.controller_identity.clone(),
            reviewer: Arc::new(KubeAccessReviewer::new(client.clone())),
        },
    );

    info!(
        "Starting health and admission server on port {} (plain HTTP, terminate TLS in front of /validate)",
        controller.health_port
    );
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", controller.health_port)).await?;
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let shutdown = async {
            let _ = stop_rx.await;
        };
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("Health server failed: {}", e);
        }
    });

    controllers::run(ctx).await;

    info!("Shutting down");
    let _ = stop_tx.send(());
    if let Err(e) = server.await {
        warn!("Health server task ended abnormally: {}", e);
    }
    telemetry::shutdown();
    Ok(())
}

/// Prints the CRDs as a multi-document YAML stream.
pub fn crds() -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", render_crds()?);
    Ok(())
}

fn render_crds() -> Result<String, serde_yaml::Error> {
    let documents = sindri_models::crds()
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(documents.join("---\n"))
}
