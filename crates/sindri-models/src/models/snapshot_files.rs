/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! `ETCDSnapshotFile` as reported by the RKE2 server inside a target
//! cluster. Sindri only reads these.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "k3s.cattle.io",
    version = "v1",
    kind = "ETCDSnapshotFile",
    root = "EtcdSnapshotFile",
    status = "EtcdSnapshotFileStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct EtcdSnapshotFileSpec {
    pub snapshot_name: String,
    pub node_name: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<EtcdSnapshotS3>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EtcdSnapshotS3 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EtcdSnapshotFileStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_to_use: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EtcdSnapshotError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<Time>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EtcdSnapshotError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EtcdSnapshotFile {
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.ready_to_use)
            .unwrap_or(false)
    }

    /// The reported error message. An error without a message still counts.
    pub fn error_message(&self) -> Option<String> {
        self.status.as_ref().and_then(|s| s.error.as_ref()).map(|e| {
            e.message
                .clone()
                .unwrap_or_else(|| "snapshot failed without a message".to_string())
        })
    }

    pub fn is_s3(&self) -> bool {
        self.spec.s3.is_some()
    }

    pub fn creation_time(&self) -> Option<Time> {
        self.status.as_ref().and_then(|s| s.creation_time.clone())
    }
}
