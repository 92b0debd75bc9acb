/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Cluster API Models
//!
//! The subset of the Cluster API `Cluster` and `Machine` resources
//! (`cluster.x-k8s.io/v1beta1`) that the orchestrators read or patch.
//! Fields not listed here are left untouched: every write Sindri makes to
//! these resources is a merge patch.

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label Cluster API puts on every machine of a cluster.
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Machine phase reported once the machine's node is up.
pub const MACHINE_PHASE_RUNNING: &str = "Running";

/// Machine condition reporting that the node's agent is healthy.
pub const AGENT_HEALTHY_CONDITION: &str = "AgentHealthy";

/// Machine address type carrying the node's internal IP.
pub const INTERNAL_IP_ADDRESS: &str = "InternalIP";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Cluster",
    namespaced,
    status = "ClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Pauses reconciliation of the cluster and everything it owns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_ref: Option<ObjectReference>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub control_plane_ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl Cluster {
    pub fn is_paused(&self) -> bool {
        self.spec.paused.unwrap_or(false)
    }

    pub fn control_plane_ready(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.control_plane_ready)
            .unwrap_or(false)
    }

    pub fn control_plane_kind(&self) -> Option<&str> {
        self.spec
            .control_plane_ref
            .as_ref()
            .and_then(|r| r.kind.as_deref())
    }
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Machine",
    namespaced,
    status = "MachineStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    pub cluster_name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// The node backing this machine, once it has joined
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_ref: Option<ObjectReference>,
    #[serde(default)]
    pub addresses: Vec<MachineAddress>,
    #[serde(default)]
    pub conditions: Vec<MachineCondition>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct MachineAddress {
    #[serde(rename = "type")]
    pub type_: String,
    pub address: String,
}

/// Cluster API condition (`severity` and `reason` are Cluster API specific).
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,
}

impl Machine {
    pub fn phase(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.phase.as_deref())
    }

    pub fn is_running(&self) -> bool {
        self.phase() == Some(MACHINE_PHASE_RUNNING)
    }

    /// Name of the node backing this machine, if it has one yet
    pub fn node_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.node_ref.as_ref())
            .and_then(|r| r.name.as_deref())
    }

    /// First address of the given type
    pub fn address(&self, address_type: &str) -> Option<&str> {
        self.status.as_ref().and_then(|s| {
            s.addresses
                .iter()
                .find(|a| a.type_ == address_type && !a.address.is_empty())
                .map(|a| a.address.as_str())
        })
    }

    pub fn internal_ip(&self) -> Option<&str> {
        self.address(INTERNAL_IP_ADDRESS)
    }

    pub fn condition_is_true(&self, condition_type: &str) -> bool {
        self.status
            .as_ref()
            .map(|s| {
                s.conditions
                    .iter()
                    .any(|c| c.type_ == condition_type && c.status == "True")
            })
            .unwrap_or(false)
    }

    pub fn agent_healthy(&self) -> bool {
        self.condition_is_true(AGENT_HEALTHY_CONDITION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn machine_from(value: serde_json::Value) -> Machine {
        serde_json::from_value(value).expect("machine should deserialize")
    }

    #[test]
    fn test_machine_ignores_unknown_fields() {
        let machine = machine_from(json!({
            "apiVersion": "cluster.x-k8s.io/v1beta1",
            "kind": "Machine",
            "metadata": {"name": "m0", "namespace": "fleet"},
            "spec": {
                "clusterName": "c1",
                "bootstrap": {"dataSecretName": "m0-bootstrap"},
                "version": "v1.30.1+rke2r1"
            },
            "status": {
                "phase": "Running",
                "nodeRef": {"kind": "Node", "name": "m0-node"},
                "addresses": [
                    {"type": "Hostname", "address": "m0"},
                    {"type": "InternalIP", "address": "10.0.0.5"}
                ],
                "conditions": [
                    {"type": "AgentHealthy", "status": "True", "lastTransitionTime": "2024-05-01T10:00:00Z"}
                ]
            }
        }));

        assert!(machine.is_running());
        assert_eq!(machine.node_name(), Some("m0-node"));
        assert_eq!(machine.internal_ip(), Some("10.0.0.5"));
        assert!(machine.agent_healthy());
    }

    #[test]
    fn test_machine_without_status() {
        let machine = machine_from(json!({
            "apiVersion": "cluster.x-k8s.io/v1beta1",
            "kind": "Machine",
            "metadata": {"name": "m1"},
            "spec": {"clusterName": "c1"}
        }));

        assert!(!machine.is_running());
        assert_eq!(machine.node_name(), None);
        assert_eq!(machine.internal_ip(), None);
        assert!(!machine.agent_healthy());
    }

    #[test]
    fn test_agent_healthy_requires_true_status() {
        let machine = machine_from(json!({
            "apiVersion": "cluster.x-k8s.io/v1beta1",
            "kind": "Machine",
            "metadata": {"name": "m1"},
            "spec": {"clusterName": "c1"},
            "status": {"conditions": [{"type": "AgentHealthy", "status": "False", "severity": "Warning"}]}
        }));

        assert!(!machine.agent_healthy());
    }

    #[test]
    fn test_cluster_helpers() {
        let cluster: Cluster = serde_json::from_value(json!({
            "apiVersion": "cluster.x-k8s.io/v1beta1",
            "kind": "Cluster",
            "metadata": {"name": "c1", "namespace": "fleet"},
            "spec": {
                "paused": true,
                "controlPlaneRef": {"kind": "RKE2ControlPlane", "name": "c1-cp"}
            },
            "status": {"controlPlaneReady": true, "phase": "Provisioned"}
        }))
        .unwrap();

        assert!(cluster.is_paused());
        assert!(cluster.control_plane_ready());
        assert_eq!(cluster.control_plane_kind(), Some("RKE2ControlPlane"));
    }
}
