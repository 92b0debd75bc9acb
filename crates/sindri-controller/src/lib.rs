//! # Sindri Controller
//!
//! Sindri takes and restores etcd snapshots of RKE2 clusters managed through
//! Cluster API. The controller never talks to a machine directly: it writes a
//! *plan* (a list of shell instructions) into a per-machine Secret, the node's
//! agent executes it and writes back the SHA-256 of what it ran. A plan counts
//! as done only when that checksum matches the plan currently stored.
//!
//! ## Architecture
//!
//! ### Plan Module
//! ```rust,ignore
//! pub mod plan;
//! ```
//! Instruction rendering, checksum-gated completion and the Secret-backed
//! plan store with its Role/RoleBinding access grants.
//!
//! ### Controllers Module
//! ```rust,ignore
//! pub mod controllers;
//! ```
//! The snapshot and restore orchestrators and the snapshot inventory sync.
//!
//! ### Admission Module
//! ```rust,ignore
//! pub mod admission;
//! ```
//! Validating webhook that only admits tasks from users allowed to manage
//! the referenced cluster.
//!
//! ## Operation Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Controller
//!     participant Secret as Plan Secret
//!     participant Agent
//!
//!     Controller->>Secret: write plan, grant agent access
//!     Agent->>Secret: read plan
//!     Agent->>Agent: execute instructions
//!     Agent->>Secret: applied-checksum, applied-output
//!     Controller->>Secret: re-read, compare checksum
//!     Controller->>Secret: next plan or revoke access
//! ```

pub mod admission;
pub mod cli;
pub mod cluster;
pub mod controllers;
pub mod error;
pub mod health;
pub mod k8s;
pub mod metrics;
pub mod plan;
pub mod remote;

#[cfg(test)]
pub(crate) mod testing;
