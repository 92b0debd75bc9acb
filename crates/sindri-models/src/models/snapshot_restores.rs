/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Snapshot Restore Module
//!
//! `ETCDSnapshotRestore` restores a whole cluster from one inventoried
//! snapshot.
//!
//! ## Phase Flow
//!
//! ```text
//! Pending -> Started -> Shutdown -> Running -> AgentRestart -> Unpause -> Joining -> Finished
//!    \__________\__________\__________\____________\______________\__________\-----> Failed
//! ```
//!
//! Phases only move one step forward, or to `Failed`.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "etcd.sindri.io",
    version = "v1alpha1",
    kind = "ETCDSnapshotRestore",
    root = "EtcdSnapshotRestore",
    namespaced,
    status = "EtcdSnapshotRestoreStatus",
    shortname = "esr",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterName"}"#,
    printcolumn = r#"{"name":"Snapshot","type":"string","jsonPath":".spec.etcdMachineSnapshotName"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct EtcdSnapshotRestoreSpec {
    pub cluster_name: String,
    /// Name of the snapshot entry in the cluster's snapshot inventory
    pub etcd_machine_snapshot_name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EtcdSnapshotRestoreStatus {
    #[serde(default)]
    pub phase: RestorePhase,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, JsonSchema)]
pub enum RestorePhase {
    #[default]
    Pending,
    Started,
    Shutdown,
    Running,
    AgentRestart,
    Unpause,
    Joining,
    Finished,
    Failed,
}

impl RestorePhase {
    /// Every phase in forward order, `Failed` excluded.
    pub const SEQUENCE: [RestorePhase; 8] = [
        RestorePhase::Pending,
        RestorePhase::Started,
        RestorePhase::Shutdown,
        RestorePhase::Running,
        RestorePhase::AgentRestart,
        RestorePhase::Unpause,
        RestorePhase::Joining,
        RestorePhase::Finished,
    ];

    /// The phase that follows this one, `None` for terminal phases.
    pub fn next(self) -> Option<RestorePhase> {
        match self {
            RestorePhase::Pending => Some(RestorePhase::Started),
            RestorePhase::Started => Some(RestorePhase::Shutdown),
            RestorePhase::Shutdown => Some(RestorePhase::Running),
            RestorePhase::Running => Some(RestorePhase::AgentRestart),
            RestorePhase::AgentRestart => Some(RestorePhase::Unpause),
            RestorePhase::Unpause => Some(RestorePhase::Joining),
            RestorePhase::Joining => Some(RestorePhase::Finished),
            RestorePhase::Finished | RestorePhase::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RestorePhase::Finished | RestorePhase::Failed)
    }

    /// Whether moving from `self` to `to` is allowed: stay, one step forward,
    /// or fail out of an in-flight phase.
    pub fn can_transition_to(self, to: RestorePhase) -> bool {
        self == to
            || self.next() == Some(to)
            || (to == RestorePhase::Failed && !self.is_terminal())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RestorePhase::Pending => "Pending",
            RestorePhase::Started => "Started",
            RestorePhase::Shutdown => "Shutdown",
            RestorePhase::Running => "Running",
            RestorePhase::AgentRestart => "AgentRestart",
            RestorePhase::Unpause => "Unpause",
            RestorePhase::Joining => "Joining",
            RestorePhase::Finished => "Finished",
            RestorePhase::Failed => "Failed",
        }
    }
}

impl fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EtcdSnapshotRestore {
    pub fn phase(&self) -> RestorePhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }
}
