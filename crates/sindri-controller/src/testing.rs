/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! In-memory stand-ins for the plan store, the remote snapshot reports and
//! cluster control, plus builders for the resources the orchestrators read.

use crate::cluster::ClusterControl;
use crate::error::Result;
use crate::plan::codec::{checksum, encode_output};
use crate::plan::{Plan, PlanError, PlanOutput, PlanRecord, PlanStore, PlanTarget};
use crate::remote::SnapshotFileSource;
use async_trait::async_trait;
use serde_json::json;
use sindri_models::models::{EtcdSnapshotFile, Machine};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub const NAMESPACE: &str = "fleet";
pub const CLUSTER: &str = "c1";

#[derive(Default)]
pub struct MemoryPlanStore {
    records: Mutex<HashMap<String, PlanRecord>>,
    writes: Mutex<HashMap<String, usize>>,
    grants: Mutex<HashSet<String>>,
    revokes: Mutex<HashMap<String, usize>>,
}

impl MemoryPlanStore {
    pub fn plan_bytes(&self, target: &PlanTarget) -> Option<Vec<u8>> {
        self.records
            .lock()
            .unwrap()
            .get(&target.to_string())
            .map(|r| r.plan.clone())
    }

    /// The plan currently stored for `target`.
    pub fn plan(&self, target: &PlanTarget) -> Option<Plan> {
        self.plan_bytes(target)
            .map(|bytes| serde_json::from_slice(&bytes).unwrap())
    }

    /// Instruction names currently stored for `target`.
    pub fn instruction_names(&self, target: &PlanTarget) -> Vec<String> {
        self.plan(target)
            .map(|p| p.instructions.into_iter().map(|i| i.name).collect())
            .unwrap_or_default()
    }

    pub fn write_count(&self, target: &PlanTarget) -> usize {
        self.writes
            .lock()
            .unwrap()
            .get(&target.to_string())
            .copied()
            .unwrap_or(0)
    }

    pub fn is_granted(&self, target: &PlanTarget) -> bool {
        self.grants.lock().unwrap().contains(&target.to_string())
    }

    pub fn revoke_count(&self, target: &PlanTarget) -> usize {
        self.revokes
            .lock()
            .unwrap()
            .get(&target.to_string())
            .copied()
            .unwrap_or(0)
    }

    /// Acts like the agent executing the current plan successfully.
    pub fn agent_applies(&self, target: &PlanTarget, output: &PlanOutput) {
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&target.to_string()).expect("no plan written");
        record.applied_checksum = Some(checksum(&record.plan));
        record.applied_output = Some(encode_output(output).unwrap());
    }

    /// Acts like the agent executing the current plan and failing.
    pub fn agent_fails(&self, target: &PlanTarget, output: &PlanOutput) {
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&target.to_string()).expect("no plan written");
        record.failed_checksum = Some(checksum(&record.plan));
        record.failed_output = Some(encode_output(output).unwrap());
    }
}

#[async_trait]
impl PlanStore for MemoryPlanStore {
    async fn read(&self, target: &PlanTarget) -> Result<Option<PlanRecord>, PlanError> {
        Ok(self.records.lock().unwrap().get(&target.to_string()).cloned())
    }

    async fn write(&self, target: &PlanTarget, plan: &[u8]) -> Result<(), PlanError> {
        let key = target.to_string();
        self.records
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_default()
            .plan = plan.to_vec();
        *self.writes.lock().unwrap().entry(key).or_default() += 1;
        Ok(())
    }

    async fn grant(&self, target: &PlanTarget) -> Result<(), PlanError> {
        self.grants.lock().unwrap().insert(target.to_string());
        Ok(())
    }

    async fn revoke(&self, target: &PlanTarget) -> Result<(), PlanError> {
        let key = target.to_string();
        self.grants.lock().unwrap().remove(&key);
        *self.revokes.lock().unwrap().entry(key).or_default() += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct StaticSnapshotFiles {
    files: Mutex<Vec<EtcdSnapshotFile>>,
}

impl StaticSnapshotFiles {
    pub fn set(&self, files: Vec<EtcdSnapshotFile>) {
        *self.files.lock().unwrap() = files;
    }
}

#[async_trait]
impl SnapshotFileSource for StaticSnapshotFiles {
    async fn list(&self, _namespace: &str, _cluster: &str) -> Result<Vec<EtcdSnapshotFile>> {
        Ok(self.files.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct RecordingClusterControl {
    calls: Mutex<Vec<(String, bool)>>,
}

impl RecordingClusterControl {
    pub fn calls(&self) -> Vec<(String, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterControl for RecordingClusterControl {
    async fn set_paused(&self, namespace: &str, cluster: &str, paused: bool) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((format!("{}/{}", namespace, cluster), paused));
        Ok(())
    }
}

/// A machine of cluster `c1`. `None` for `node` leaves it without a node.
pub fn machine(name: &str, node: Option<&str>, ip: Option<&str>, running: bool, healthy: bool) -> Machine {
    let phase = if running { "Running" } else { "Provisioning" };
    let agent_healthy = if healthy { "True" } else { "False" };
    let mut status = json!({
        "phase": phase,
        "addresses": [],
        "conditions": [{"type": "AgentHealthy", "status": agent_healthy}]
    });
    if let Some(node) = node {
        status["nodeRef"] = json!({"kind": "Node", "name": node});
    }
    if let Some(ip) = ip {
        status["addresses"] = json!([{"type": "InternalIP", "address": ip}]);
    }

    serde_json::from_value(json!({
        "apiVersion": "cluster.x-k8s.io/v1beta1",
        "kind": "Machine",
        "metadata": {
            "name": name,
            "namespace": NAMESPACE,
            "labels": {"cluster.x-k8s.io/cluster-name": CLUSTER}
        },
        "spec": {"clusterName": CLUSTER},
        "status": status
    }))
    .unwrap()
}

/// A running, healthy machine whose node shares its name.
pub fn running_machine(name: &str, ip: &str) -> Machine {
    machine(name, Some(name), Some(ip), true, true)
}

pub fn snapshot_file(
    snapshot_name: &str,
    node_name: &str,
    ready: bool,
    creation_time: Option<&str>,
) -> EtcdSnapshotFile {
    let mut status = json!({"readyToUse": ready});
    if let Some(time) = creation_time {
        status["creationTime"] = json!(time);
    }
    serde_json::from_value(json!({
        "apiVersion": "k3s.cattle.io/v1",
        "kind": "ETCDSnapshotFile",
        "metadata": {"name": format!("local-{}", snapshot_name)},
        "spec": {
            "snapshotName": snapshot_name,
            "nodeName": node_name,
            "location": format!("file:///var/lib/rancher/rke2/server/db/snapshots/{}", snapshot_name)
        },
        "status": status
    }))
    .unwrap()
}

pub fn failed_snapshot_file(snapshot_name: &str, node_name: &str, message: &str) -> EtcdSnapshotFile {
    let mut file = snapshot_file(snapshot_name, node_name, false, None);
    file.status = Some(
        serde_json::from_value(json!({
            "readyToUse": false,
            "error": {"message": message}
        }))
        .unwrap(),
    );
    file
}

pub fn s3_snapshot_file(snapshot_name: &str) -> EtcdSnapshotFile {
    serde_json::from_value(json!({
        "apiVersion": "k3s.cattle.io/v1",
        "kind": "ETCDSnapshotFile",
        "metadata": {"name": format!("s3-{}", snapshot_name)},
        "spec": {
            "snapshotName": snapshot_name,
            "nodeName": "s3",
            "location": format!("s3://backups/{}", snapshot_name),
            "s3": {"bucket": "backups"}
        },
        "status": {"readyToUse": true, "creationTime": "2024-05-01T10:00:00Z"}
    }))
    .unwrap()
}
