/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Kubernetes resource types used by Sindri.
//!
//! Resources in the `etcd.sindri.io` group are owned by Sindri: the two task
//! kinds (`ETCDMachineSnapshot`, `ETCDSnapshotRestore`) and the per-cluster
//! snapshot inventory. The Cluster API `Cluster`/`Machine` types and the
//! downstream `ETCDSnapshotFile` are consumed only, and only the fields Sindri
//! reads are modelled.
pub mod models;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

/// API group of the resources Sindri owns.
pub const SINDRI_GROUP: &str = "etcd.sindri.io";

/// CustomResourceDefinitions for every resource Sindri owns.
pub fn crds() -> Vec<CustomResourceDefinition> {
    vec![
        models::EtcdMachineSnapshot::crd(),
        models::EtcdSnapshotRestore::crd(),
        models::EtcdSnapshotInventory::crd(),
    ]
}
