/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Snapshot reports from inside target clusters.
//!
//! The RKE2 server in each target cluster publishes one cluster-scoped
//! `ETCDSnapshotFile` per snapshot it knows about. Sindri reaches them through
//! the cluster's Cluster API kubeconfig secret.

use crate::error::Result;
use crate::k8s::api::remote_client;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::ListParams;
use kube::{Api, Client};
use sindri_models::models::EtcdSnapshotFile;

#[async_trait]
pub trait SnapshotFileSource: Send + Sync {
    /// Every snapshot file reported by the cluster `namespace/cluster`.
    async fn list(&self, namespace: &str, cluster: &str) -> Result<Vec<EtcdSnapshotFile>>;
}

/// Lists snapshot files through the target cluster's kubeconfig.
#[derive(Clone)]
pub struct RemoteSnapshotFiles {
    client: Client,
}

impl RemoteSnapshotFiles {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SnapshotFileSource for RemoteSnapshotFiles {
    async fn list(&self, namespace: &str, cluster: &str) -> Result<Vec<EtcdSnapshotFile>> {
        let remote = remote_client(&self.client, namespace, cluster).await?;
        let api: Api<EtcdSnapshotFile> = Api::all(remote);
        Ok(api.list(&ListParams::default()).await?.items)
    }
}

/// The newest report of the snapshot `name` taken on `node`.
///
/// RKE2 names snapshots `<name>-<node>-<timestamp>`, so a report belongs to
/// `name` only when its snapshot name equals it or continues with `-`.
/// Reports created before `not_before` belong to an earlier task of the same
/// name and are skipped.
pub fn find_snapshot_file<'a>(
    files: &'a [EtcdSnapshotFile],
    name: &str,
    node: &str,
    not_before: Option<&Time>,
) -> Option<&'a EtcdSnapshotFile> {
    files
        .iter()
        .filter(|f| names_snapshot(&f.spec.snapshot_name, name))
        .filter(|f| f.spec.node_name == node)
        .filter(|f| match (not_before, f.creation_time()) {
            (Some(floor), Some(created)) => created.0 >= floor.0,
            _ => true,
        })
        .max_by_key(|f| f.creation_time().map(|t| t.0))
}

fn names_snapshot(snapshot_name: &str, name: &str) -> bool {
    match snapshot_name.strip_prefix(name) {
        Some(rest) => rest.is_empty() || rest.starts_with('-'),
        None => false,
    }
}
