/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Snapshot Inventory Sync
//!
//! Publishes the snapshots a cluster's RKE2 servers report as one
//! `ETCDSnapshotInventory` per cluster, named after the cluster.
//!
//! A sync runs on every `Cluster` reconcile and, once the cluster has been
//! synced, whenever a remote `ETCDSnapshotFile` changes. Both paths take the
//! same per-cluster lock.
//!
//! A remote watch belongs to one incarnation (uid) of a cluster. It stops when
//! that incarnation is deleted or, after a watch error, no longer eligible; a
//! re-created cluster of the same name replaces a watch that is still running.

use super::{observe_success, patch_status, Context};
use crate::cluster::list_machines;
use crate::error::{Error, Result};
use crate::k8s::api::{remote_client, with_retries, RetryConfig, FIELD_MANAGER};
use crate::metrics;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource, ResourceExt};
use sindri_models::models::{
    Cluster, EtcdSnapshotFile, EtcdSnapshotInventory, EtcdSnapshotInventorySpec,
    EtcdSnapshotInventoryStatus, LocalSnapshot, Machine, S3Snapshot,
};
use sindri_utils::logging::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;

struct RemoteWatch {
    uid: String,
    task: Option<AbortHandle>,
}

/// Per-cluster sync locks and the live remote watches.
#[derive(Default)]
pub struct SyncState {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    watches: Mutex<HashMap<String, RemoteWatch>>,
}

impl SyncState {
    async fn lock_for(&self, cluster: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(cluster.to_string())
            .or_default()
            .clone()
    }

    /// Registers a watch for incarnation `uid` of `cluster`; `false` when one
    /// already runs for it. A watch of an earlier incarnation is aborted.
    async fn begin_watch(&self, cluster: &str, uid: &str) -> bool {
        let mut watches = self.watches.lock().await;
        if let Some(existing) = watches.get(cluster) {
            if existing.uid == uid {
                return false;
            }
            debug!("replacing snapshot file watch of re-created cluster {}", cluster);
            if let Some(task) = &existing.task {
                task.abort();
            }
        }
        watches.insert(
            cluster.to_string(),
            RemoteWatch {
                uid: uid.to_string(),
                task: None,
            },
        );
        true
    }

    /// Hands the running task to the registration made by `begin_watch`.
    async fn attach(&self, cluster: &str, uid: &str, task: AbortHandle) {
        match self.watches.lock().await.get_mut(cluster) {
            Some(watch) if watch.uid == uid => watch.task = Some(task),
            _ => task.abort(),
        }
    }

    /// Drops the registration of `uid`. Returns `false`, leaving the state
    /// untouched, when a newer incarnation has taken over.
    async fn end_watch(&self, cluster: &str, uid: &str) -> bool {
        let mut watches = self.watches.lock().await;
        if !watches.get(cluster).is_some_and(|w| w.uid == uid) {
            return false;
        }
        watches.remove(cluster);
        self.locks.lock().await.remove(cluster);
        true
    }
}

/// `current` if it is still the incarnation `uid` of the cluster.
fn same_incarnation(current: Option<Cluster>, uid: &str) -> Option<Cluster> {
    current.filter(|cluster| cluster.uid().unwrap_or_default() == uid)
}

/// Whether the inventory of `cluster` should be synced now.
pub fn should_sync(cluster: &Cluster, supported_control_planes: &[String]) -> bool {
    cluster.control_plane_ready()
        && !cluster.is_paused()
        && cluster
            .control_plane_kind()
            .is_some_and(|kind| supported_control_planes.iter().any(|s| s == kind))
}

/// Builds the inventory status from the remote reports.
///
/// Files that are not ready are skipped. Local files whose node matches no
/// machine are dropped until a later sync can resolve them.
pub fn build_inventory(
    files: &[EtcdSnapshotFile],
    machines: &[Machine],
    now: DateTime<Utc>,
) -> EtcdSnapshotInventoryStatus {
    let mut status = EtcdSnapshotInventoryStatus {
        last_sync_time: Some(Time(now)),
        ..Default::default()
    };

    for file in files.iter().filter(|f| f.is_ready()) {
        if file.is_s3() {
            status.s3_snapshots.push(S3Snapshot {
                name: file.spec.snapshot_name.clone(),
                location: file.spec.location.clone(),
                creation_time: file.creation_time(),
            });
            continue;
        }

        let owner = machines
            .iter()
            .find(|m| m.node_name() == Some(file.spec.node_name.as_str()));
        match owner {
            Some(machine) => status.snapshots.push(LocalSnapshot {
                name: file.spec.snapshot_name.clone(),
                location: file.spec.location.clone(),
                machine_name: machine.name_any(),
                creation_time: file.creation_time(),
            }),
            None => trace!(
                "no machine for node {} of snapshot {}",
                file.spec.node_name,
                file.spec.snapshot_name
            ),
        }
    }

    status
}

fn cluster_key(cluster: &Cluster) -> Result<(String, String)> {
    let namespace = cluster
        .namespace()
        .ok_or_else(|| Error::MissingField(format!("Cluster {}", cluster.name_any()), "metadata.namespace"))?;
    Ok((namespace, cluster.name_any()))
}

/// Rebuilds and publishes the inventory of `cluster`. Returns the entry count.
pub async fn sync_cluster(ctx: &Context, cluster: &Cluster) -> Result<usize> {
    let (namespace, name) = cluster_key(cluster)?;
    let key = format!("{}/{}", namespace, name);
    let lock = ctx.inventory.lock_for(&key).await;
    let _guard = lock.lock().await;

    let files = ctx.orchestrator.snapshot_files.list(&namespace, &name).await?;
    let machines = list_machines(&ctx.client, &namespace, &name).await?;
    let status = build_inventory(&files, &machines, Utc::now());

    let api: Api<EtcdSnapshotInventory> = Api::namespaced(ctx.client.clone(), &namespace);
    let mut inventory = EtcdSnapshotInventory::new(
        &name,
        EtcdSnapshotInventorySpec {
            cluster_name: name.clone(),
        },
    );
    inventory.metadata.owner_references = cluster.controller_owner_ref(&()).map(|owner| vec![owner]);

    let params = PatchParams::apply(FIELD_MANAGER).force();
    let patch = Patch::Apply(&inventory);
    with_retries(|| api.patch(&name, &params, &patch), RetryConfig::default()).await?;
    patch_status(&api, &name, &status).await?;

    metrics::inventory_entries()
        .with_label_values(&[key.as_str(), "local"])
        .set(status.snapshots.len() as i64);
    metrics::inventory_entries()
        .with_label_values(&[key.as_str(), "s3"])
        .set(status.s3_snapshots.len() as i64);

    debug!(
        local = status.snapshots.len(),
        s3 = status.s3_snapshots.len(),
        "synced inventory {}",
        key
    );
    Ok(status.len())
}

/// Starts the remote `ETCDSnapshotFile` watch for `cluster` unless one runs.
async fn ensure_remote_watch(ctx: &Arc<Context>, cluster: &Cluster) -> Result<()> {
    let (namespace, name) = cluster_key(cluster)?;
    let key = format!("{}/{}", namespace, name);
    let uid = cluster.uid().unwrap_or_default();
    if !ctx.inventory.begin_watch(&key, &uid).await {
        return Ok(());
    }

    let remote = match remote_client(&ctx.client, &namespace, &name).await {
        Ok(remote) => remote,
        Err(e) => {
            ctx.inventory.end_watch(&key, &uid).await;
            return Err(e);
        }
    };

    info!("watching snapshot files of cluster {}", key);
    let task = tokio::spawn(watch_remote_files(ctx.clone(), namespace, name, uid.clone(), remote));
    ctx.inventory.attach(&key, &uid, task.abort_handle()).await;
    Ok(())
}

/// Resyncs the cluster on every remote snapshot file change.
async fn watch_remote_files(
    ctx: Arc<Context>,
    namespace: String,
    name: String,
    uid: String,
    remote: Client,
) {
    let key = format!("{}/{}", namespace, name);
    let clusters: Api<Cluster> = Api::namespaced(ctx.client.clone(), &namespace);
    let mut events = watcher(Api::<EtcdSnapshotFile>::all(remote), watcher::Config::default())
        .default_backoff()
        .boxed();
    let mut gone = false;

    while let Some(event) = events.next().await {
        let failed = match event {
            Ok(watcher::Event::Apply(_) | watcher::Event::Delete(_) | watcher::Event::InitDone) => false,
            Ok(_) => continue,
            Err(e) => {
                warn!("snapshot file watch on {} failed: {}", key, e);
                true
            }
        };

        let cluster = match clusters.get_opt(&name).await {
            Ok(current) => match same_incarnation(current, &uid) {
                Some(cluster) => cluster,
                None => {
                    gone = true;
                    break;
                }
            },
            Err(e) => {
                warn!("failed to get cluster {}: {}", key, e);
                continue;
            }
        };

        let eligible = should_sync(&cluster, &ctx.supported_control_planes);
        if failed {
            // The next eligible reconcile starts a fresh watch
            if !eligible {
                debug!("cluster {} no longer eligible", key);
                break;
            }
            continue;
        }
        if !eligible {
            debug!("skipping sync of {}, cluster not eligible", key);
            continue;
        }
        if let Err(e) = sync_cluster(&ctx, &cluster).await {
            warn!("inventory sync of {} failed: {}", key, e);
        }
    }

    if ctx.inventory.end_watch(&key, &uid).await && gone {
        metrics::forget_inventory(&key);
    }
    info!("stopped watching snapshot files of cluster {}", key);
}

#[instrument(skip(cluster, ctx), fields(name = %cluster.name_any()))]
pub async fn reconcile(cluster: Arc<Cluster>, ctx: Arc<Context>) -> Result<Action> {
    let started = Instant::now();
    let interval = ctx.orchestrator.intervals.inventory;

    if !should_sync(&cluster, &ctx.supported_control_planes) {
        debug!("cluster not eligible for inventory sync");
        observe_success("inventory", started);
        return Ok(Action::requeue(interval));
    }

    ensure_remote_watch(&ctx, &cluster).await?;
    sync_cluster(&ctx, &cluster).await?;

    observe_success("inventory", started);
    Ok(Action::requeue(interval))
}
