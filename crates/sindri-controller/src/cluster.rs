/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Access to Cluster API clusters and machines on the management cluster.

use crate::error::{Error, Result};
use crate::k8s::api::{with_retries, RetryConfig};
use async_trait::async_trait;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use sindri_models::models::cluster_api::CLUSTER_NAME_LABEL;
use sindri_models::models::{Cluster, Machine};
use sindri_utils::logging::prelude::*;

/// Administrative control over a Cluster API cluster.
#[async_trait]
pub trait ClusterControl: Send + Sync {
    /// Sets `spec.paused`. Setting the current value again is a no-op.
    async fn set_paused(&self, namespace: &str, cluster: &str, paused: bool) -> Result<()>;
}

#[derive(Clone)]
pub struct KubeClusterControl {
    client: Client,
}

impl KubeClusterControl {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterControl for KubeClusterControl {
    async fn set_paused(&self, namespace: &str, cluster: &str, paused: bool) -> Result<()> {
        let api: Api<Cluster> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::default();
        let patch = Patch::Merge(json!({"spec": {"paused": paused}}));

        with_retries(|| api.patch(cluster, &params, &patch), RetryConfig::default()).await?;
        info!("Set paused={} on cluster {}/{}", paused, namespace, cluster);
        Ok(())
    }
}

/// Fetches a cluster; a missing cluster is a resolution error.
pub async fn get_cluster(client: &Client, namespace: &str, name: &str) -> Result<Cluster> {
    let api: Api<Cluster> = Api::namespaced(client.clone(), namespace);
    api.get_opt(name)
        .await?
        .ok_or_else(|| Error::not_found("Cluster", format!("{}/{}", namespace, name)))
}

/// All machines of a cluster, sorted by name.
pub async fn list_machines(client: &Client, namespace: &str, cluster: &str) -> Result<Vec<Machine>> {
    let api: Api<Machine> = Api::namespaced(client.clone(), namespace);
    let params = ListParams::default().labels(&format!("{}={}", CLUSTER_NAME_LABEL, cluster));
    let mut machines = api.list(&params).await?.items;
    machines.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
    Ok(machines)
}
