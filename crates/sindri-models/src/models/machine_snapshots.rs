/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Machine Snapshot Module
//!
//! `ETCDMachineSnapshot` requests one etcd snapshot taken on one machine.
//!
//! ## Phase Flow
//!
//! ```text
//! (unset) -> Pending -> Planning -> Running -> Done
//!                          |           |
//!                          +-----------+----> Failed
//! ```
//!
//! `Done` and `Failed` are terminal. The phase is only written by the
//! snapshot orchestrator.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "etcd.sindri.io",
    version = "v1alpha1",
    kind = "ETCDMachineSnapshot",
    root = "EtcdMachineSnapshot",
    namespaced,
    status = "EtcdMachineSnapshotStatus",
    shortname = "ems",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterName"}"#,
    printcolumn = r#"{"name":"Machine","type":"string","jsonPath":".spec.machineName"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct EtcdMachineSnapshotSpec {
    pub cluster_name: String,
    pub machine_name: String,
    /// Directory (or object store prefix) the snapshot is written to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EtcdMachineSnapshotStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<SnapshotPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum SnapshotPhase {
    Pending,
    Planning,
    Running,
    Failed,
    Done,
}

impl SnapshotPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, SnapshotPhase::Failed | SnapshotPhase::Done)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotPhase::Pending => "Pending",
            SnapshotPhase::Planning => "Planning",
            SnapshotPhase::Running => "Running",
            SnapshotPhase::Failed => "Failed",
            SnapshotPhase::Done => "Done",
        }
    }
}

impl fmt::Display for SnapshotPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EtcdMachineSnapshot {
    /// Current phase; `None` until the orchestrator has seen the object.
    pub fn phase(&self) -> Option<SnapshotPhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }
}
