//! Resource models for Sindri and the resources it consumes
pub mod cluster_api;
pub mod conditions;
pub mod machine_snapshots;
pub mod snapshot_files;
pub mod snapshot_inventory;
pub mod snapshot_restores;

pub use cluster_api::{Cluster, ClusterSpec, ClusterStatus, Machine, MachineSpec, MachineStatus};
pub use machine_snapshots::{
    EtcdMachineSnapshot, EtcdMachineSnapshotSpec, EtcdMachineSnapshotStatus, SnapshotPhase,
};
pub use snapshot_files::{EtcdSnapshotFile, EtcdSnapshotFileSpec, EtcdSnapshotFileStatus};
pub use snapshot_inventory::{
    EtcdSnapshotInventory, EtcdSnapshotInventorySpec, EtcdSnapshotInventoryStatus, InventoryEntry,
    LocalSnapshot, S3Snapshot,
};
pub use snapshot_restores::{
    EtcdSnapshotRestore, EtcdSnapshotRestoreSpec, EtcdSnapshotRestoreStatus, RestorePhase,
};
