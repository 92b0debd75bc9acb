/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Controllers
//!
//! Three level-triggered reconcile loops built on `kube::runtime::Controller`:
//!
//! | loop | watches | module |
//! |---|---|---|
//! | snapshot | `ETCDMachineSnapshot` | [`snapshot`] |
//! | restore | `ETCDSnapshotRestore` | [`restore`] |
//! | inventory | Cluster API `Cluster` | [`inventory`] |
//!
//! The task orchestrators are split in two. `advance` decides the next step
//! from the task, the already resolved machines and the collaborators in
//! [`Orchestrator`]; it never sleeps and never touches the task object. The
//! reconcile wrapper resolves the scope, calls `advance`, then persists the
//! returned status with a merge patch and hands the requeue action back to
//! the runtime.
//!
//! "Not ready yet" is always a requeue with a fixed delay, never an error.

pub mod inventory;
pub mod restore;
pub mod snapshot;

use crate::cluster::ClusterControl;
use crate::error::{Error, Result};
use crate::metrics;
use crate::plan::Planner;
use crate::remote::SnapshotFileSource;
use futures::StreamExt;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::watcher;
use kube::runtime::Controller;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use sindri_models::models::{Cluster, EtcdMachineSnapshot, EtcdSnapshotRestore};
use sindri_utils::config::RequeueIntervals;
use sindri_utils::logging::prelude::*;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

/// Finalizer carried by both task kinds; its cleanup revokes plan access
pub const FINALIZER: &str = "etcd.sindri.io/cleanup";

/// Everything the orchestrators need besides the task itself.
#[derive(Clone)]
pub struct Orchestrator {
    pub planner: Planner,
    pub snapshot_files: Arc<dyn SnapshotFileSource>,
    pub clusters: Arc<dyn ClusterControl>,
    pub intervals: RequeueIntervals,
}

/// Shared state of the reconcile loops.
pub struct Context {
    pub client: Client,
    pub orchestrator: Orchestrator,
    pub supported_control_planes: Vec<String>,
    pub inventory: inventory::SyncState,
}

impl Context {
    pub fn new(
        client: Client,
        orchestrator: Orchestrator,
        supported_control_planes: Vec<String>,
    ) -> Self {
        Self {
            client,
            orchestrator,
            supported_control_planes,
            inventory: inventory::SyncState::default(),
        }
    }
}

/// Outcome of one `advance` call: an optional new status and when to look again.
#[derive(Debug, Clone, PartialEq)]
pub struct Step<S> {
    pub status: Option<S>,
    pub action: Action,
}

impl<S> Step<S> {
    pub fn requeue(after: std::time::Duration) -> Self {
        Self {
            status: None,
            action: Action::requeue(after),
        }
    }

    pub fn transition(status: S, action: Action) -> Self {
        Self {
            status: Some(status),
            action,
        }
    }

    /// Nothing left to do until the object changes.
    pub fn idle() -> Self {
        Self {
            status: None,
            action: Action::await_change(),
        }
    }
}

/// Persists `status` on the object's status subresource.
pub async fn patch_status<K, S>(api: &Api<K>, name: &str, status: &S) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug,
    S: Serialize,
{
    let patch = Patch::Merge(json!({ "status": status }));
    api.patch_status(name, &PatchParams::default(), &patch)
        .await?;
    Ok(())
}

/// Shared error policy: log, count, retry after the fixed error delay.
pub fn error_policy<K>(controller: &'static str, object: Arc<K>, error: &Error, ctx: Arc<Context>) -> Action
where
    K: Resource,
{
    let name = object.name_any();
    let namespace = object.namespace().unwrap_or_default();
    warn!(controller, %name, %namespace, "reconcile failed: {}", error);
    metrics::reconciliations_total()
        .with_label_values(&[controller, "error"])
        .inc();
    metrics::reconcile_errors_total()
        .with_label_values(&[controller, error.metric_label()])
        .inc();
    Action::requeue(ctx.orchestrator.intervals.error)
}

/// Records a successful reconcile and its duration.
pub(crate) fn observe_success(controller: &'static str, started: Instant) {
    metrics::reconciliations_total()
        .with_label_values(&[controller, "success"])
        .inc();
    metrics::reconcile_duration_seconds()
        .with_label_values(&[controller])
        .observe(started.elapsed().as_secs_f64());
}

/// Runs the three reconcile loops until a shutdown signal arrives.
pub async fn run(ctx: Arc<Context>) {
    let client = ctx.client.clone();

    let snapshots = Controller::new(
        Api::<EtcdMachineSnapshot>::all(client.clone()),
        watcher::Config::default(),
    )
    .shutdown_on_signal()
    .run(
        snapshot::reconcile,
        |obj, err, ctx| error_policy("snapshot", obj, err, ctx),
        ctx.clone(),
    )
    .for_each(|result| async move {
        if let Err(e) = result {
            debug!("snapshot controller event: {}", e);
        }
    });

    let restores = Controller::new(
        Api::<EtcdSnapshotRestore>::all(client.clone()),
        watcher::Config::default(),
    )
    .shutdown_on_signal()
    .run(
        restore::reconcile,
        |obj, err, ctx| error_policy("restore", obj, err, ctx),
        ctx.clone(),
    )
    .for_each(|result| async move {
        if let Err(e) = result {
            debug!("restore controller event: {}", e);
        }
    });

    let inventories = Controller::new(Api::<Cluster>::all(client), watcher::Config::default())
        .shutdown_on_signal()
        .run(
            inventory::reconcile,
            |obj, err, ctx| error_policy("inventory", obj, err, ctx),
            ctx.clone(),
        )
        .for_each(|result| async move {
            if let Err(e) = result {
                debug!("inventory controller event: {}", e);
            }
        });

    info!("Controllers started");
    tokio::join!(snapshots, restores, inventories);
    info!("Controllers stopped");
}
