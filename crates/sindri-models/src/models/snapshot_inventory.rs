/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Snapshot Inventory Module
//!
//! One `ETCDSnapshotInventory` per cluster, named after the cluster. Its
//! status is rebuilt from the cluster's `ETCDSnapshotFile` reports on every
//! sync and replaces whatever was there before.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "etcd.sindri.io",
    version = "v1alpha1",
    kind = "ETCDSnapshotInventory",
    root = "EtcdSnapshotInventory",
    namespaced,
    plural = "etcdsnapshotinventories",
    status = "EtcdSnapshotInventoryStatus",
    shortname = "esi",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterName"}"#,
    printcolumn = r#"{"name":"Last Sync","type":"date","jsonPath":".status.lastSyncTime"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct EtcdSnapshotInventorySpec {
    pub cluster_name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EtcdSnapshotInventoryStatus {
    #[serde(default)]
    pub snapshots: Vec<LocalSnapshot>,
    #[serde(default)]
    pub s3_snapshots: Vec<S3Snapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<Time>,
}

/// A snapshot stored on a machine's local disk.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalSnapshot {
    pub name: String,
    pub location: String,
    /// Machine whose node produced the snapshot
    pub machine_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<Time>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3Snapshot {
    pub name: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<Time>,
}

/// Result of looking a snapshot up by name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InventoryEntry<'a> {
    Local(&'a LocalSnapshot),
    S3(&'a S3Snapshot),
}

impl EtcdSnapshotInventoryStatus {
    /// Finds a snapshot by name, local entries first.
    pub fn find(&self, name: &str) -> Option<InventoryEntry<'_>> {
        self.snapshots
            .iter()
            .find(|s| s.name == name)
            .map(InventoryEntry::Local)
            .or_else(|| {
                self.s3_snapshots
                    .iter()
                    .find(|s| s.name == name)
                    .map(InventoryEntry::S3)
            })
    }

    pub fn len(&self) -> usize {
        self.snapshots.len() + self.s3_snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EtcdSnapshotInventory {
    pub fn find(&self, name: &str) -> Option<InventoryEntry<'_>> {
        self.status.as_ref().and_then(|s| s.find(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status() -> EtcdSnapshotInventoryStatus {
        serde_json::from_value(json!({
            "snapshots": [{
                "name": "c1-m0-1714557600",
                "location": "file:///var/lib/rancher/rke2/server/db/snapshots/c1-m0-1714557600",
                "machineName": "m0",
                "creationTime": "2024-05-01T10:00:00Z"
            }],
            "s3Snapshots": [{
                "name": "c1-s3-1714557600",
                "location": "s3://backups/c1-s3-1714557600"
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_find_local_and_s3() {
        let status = status();

        match status.find("c1-m0-1714557600") {
            Some(InventoryEntry::Local(entry)) => assert_eq!(entry.machine_name, "m0"),
            other => panic!("expected local entry, got {:?}", other),
        }
        assert!(matches!(
            status.find("c1-s3-1714557600"),
            Some(InventoryEntry::S3(_))
        ));
        assert!(status.find("missing").is_none());
        assert_eq!(status.len(), 2);
    }

    #[test]
    fn test_s3_entries_serialize_without_machine_name() {
        let value = serde_json::to_value(&status()).unwrap();
        assert!(value["s3Snapshots"][0].get("machineName").is_none());
        assert_eq!(value["snapshots"][0]["machineName"], "m0");
    }
}
