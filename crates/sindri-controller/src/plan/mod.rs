/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Plan Module
//!
//! Checksum-gated remote execution. The controller writes a [`Plan`] into a
//! per-machine Plan Record; the machine's agent executes it and writes back
//! the checksum of what it ran plus the captured output. A plan is finished
//! only when the stored checksum matches the plan currently in the record.
//!
//! ## Plan Record
//!
//! | key | writer | content |
//! |---|---|---|
//! | `plan` | controller | canonical JSON of the plan |
//! | `applied-checksum` | agent | hex SHA-256 of the executed plan bytes |
//! | `applied-output` | agent | gzip(JSON `{name: base64}`) |
//! | `failed-checksum` | agent | hex SHA-256 of plan bytes that failed |
//! | `failed-output` | agent | same encoding as `applied-output` |
//!
//! ## Flow
//!
//! ```text
//! Planner::apply ──write plan──▶ PlanStore ◀──applied-checksum── agent
//!        └──────re-read, compare checksum──────┘
//! ```

pub mod codec;
pub mod instructions;
pub mod secret_store;

pub use instructions::{Instruction, Plan, PlanInstruction};
pub use secret_store::SecretPlanStore;

use crate::metrics;
use async_trait::async_trait;
use sindri_utils::logging::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Captured output of a plan, keyed by instruction name.
pub type PlanOutput = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("plan store unavailable: {0}")]
    Store(#[from] kube::Error),
    #[error("malformed plan output: {0}")]
    MalformedOutput(String),
    #[error("failed to serialize plan: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Which kind of task owns a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Snapshot,
    Restore,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Snapshot => "snapshot",
            Operation::Restore => "restore",
        }
    }
}

/// Identifies one Plan Record: one task, one machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanTarget {
    pub operation: Operation,
    /// Name of the owning task resource
    pub owner: String,
    pub machine: String,
    /// Namespace of the machine; the record lives there
    pub namespace: String,
}

impl PlanTarget {
    pub fn new(
        operation: Operation,
        owner: impl Into<String>,
        machine: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            owner: owner.into(),
            machine: machine.into(),
            namespace: namespace.into(),
        }
    }

    /// Name shared by the record and the rights guarding it.
    pub fn record_name(&self) -> String {
        format!("{}-{}-{}", self.operation.as_str(), self.owner, self.machine)
    }
}

impl fmt::Display for PlanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.record_name())
    }
}

/// Raw contents of a Plan Record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanRecord {
    pub plan: Vec<u8>,
    pub applied_checksum: Option<String>,
    pub applied_output: Option<Vec<u8>>,
    pub failed_checksum: Option<String>,
    pub failed_output: Option<Vec<u8>>,
}

/// Storage and authorization for Plan Records.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Current record, `None` if it has never been written.
    async fn read(&self, target: &PlanTarget) -> Result<Option<PlanRecord>, PlanError>;

    /// Writes `plan`, creating the record if needed. Agent-written keys are kept.
    async fn write(&self, target: &PlanTarget, plan: &[u8]) -> Result<(), PlanError>;

    /// Lets the machine's agent read and execute the record. Idempotent.
    async fn grant(&self, target: &PlanTarget) -> Result<(), PlanError>;

    /// Removes what `grant` created. Idempotent.
    async fn revoke(&self, target: &PlanTarget) -> Result<(), PlanError>;
}

/// Result of applying a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    /// The agent has not executed this plan yet
    Pending,
    Applied(PlanOutput),
    /// The agent executed this plan and reported a failure
    Failed(PlanOutput),
}

impl PlanOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, PlanOutcome::Applied(_))
    }

    fn label(&self) -> &'static str {
        match self {
            PlanOutcome::Pending => "pending",
            PlanOutcome::Applied(_) => "applied",
            PlanOutcome::Failed(_) => "failed",
        }
    }
}

/// Compares the record's plan against the agent's checksums.
pub fn evaluate(record: &PlanRecord) -> Result<PlanOutcome, PlanError> {
    let current = codec::checksum(&record.plan);

    if record.applied_checksum.as_deref() == Some(current.as_str()) {
        let output = codec::decode_output(record.applied_output.as_deref().unwrap_or_default())?;
        return Ok(PlanOutcome::Applied(output));
    }
    if record.failed_checksum.as_deref() == Some(current.as_str()) {
        let output = codec::decode_output(record.failed_output.as_deref().unwrap_or_default())?;
        return Ok(PlanOutcome::Failed(output));
    }
    Ok(PlanOutcome::Pending)
}

/// Renders failure output as one line for task status.
pub fn describe_failure(output: &PlanOutput) -> String {
    if output.is_empty() {
        return "plan failed without output".to_string();
    }
    output
        .iter()
        .map(|(name, raw)| format!("{}: {}", name, String::from_utf8_lossy(raw).trim()))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Builds plans and talks to the plan store on behalf of the orchestrators.
#[derive(Clone)]
pub struct Planner {
    store: Arc<dyn PlanStore>,
}

impl Planner {
    pub fn new(store: Arc<dyn PlanStore>) -> Self {
        Self { store }
    }

    /// Writes the plan for `instructions` to `target` and reports whether the
    /// agent has executed exactly that plan.
    ///
    /// The `plan` key is rewritten on every call, even when unchanged.
    #[instrument(skip(self, instructions), fields(target = %target))]
    pub async fn apply(
        &self,
        target: &PlanTarget,
        instructions: &[Instruction],
    ) -> Result<PlanOutcome, PlanError> {
        let plan = Plan::new(instructions);
        let bytes = plan.to_bytes()?;
        debug!(instructions = ?plan.names(), checksum = %codec::checksum(&bytes), "writing plan");

        self.store.write(target, &bytes).await?;

        let outcome = match self.store.read(target).await? {
            Some(record) => evaluate(&record),
            None => Ok(PlanOutcome::Pending),
        };

        let label = match &outcome {
            Ok(outcome) => outcome.label(),
            Err(_) => "malformed",
        };
        metrics::plan_applications_total()
            .with_label_values(&[target.operation.as_str(), label])
            .inc();

        outcome
    }

    #[instrument(skip(self), fields(target = %target))]
    pub async fn permit(&self, target: &PlanTarget) -> Result<(), PlanError> {
        self.store.grant(target).await
    }

    #[instrument(skip(self), fields(target = %target))]
    pub async fn revoke(&self, target: &PlanTarget) -> Result<(), PlanError> {
        self.store.revoke(target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryPlanStore;

    fn target() -> PlanTarget {
        PlanTarget::new(Operation::Snapshot, "c1", "m1", "fleet")
    }

    #[test]
    fn test_record_name_includes_machine() {
        assert_eq!(target().record_name(), "snapshot-c1-m1");
        assert_eq!(target().to_string(), "fleet/snapshot-c1-m1");
    }

    #[tokio::test]
    async fn test_apply_is_pending_until_checksum_matches() {
        let store = Arc::new(MemoryPlanStore::default());
        let planner = Planner::new(store.clone());
        let instructions = [Instruction::StopAgent];

        let first = planner.apply(&target(), &instructions).await.unwrap();
        let first_bytes = store.plan_bytes(&target()).unwrap();
        let second = planner.apply(&target(), &instructions).await.unwrap();
        let second_bytes = store.plan_bytes(&target()).unwrap();

        assert_eq!(first, PlanOutcome::Pending);
        assert_eq!(second, PlanOutcome::Pending);
        assert_eq!(codec::checksum(&first_bytes), codec::checksum(&second_bytes));
        // Both calls wrote the plan
        assert_eq!(store.write_count(&target()), 2);

        let mut output = PlanOutput::new();
        output.insert("stop-agent".to_string(), b"stopped".to_vec());
        store.agent_applies(&target(), &output);

        let third = planner.apply(&target(), &instructions).await.unwrap();
        assert_eq!(third, PlanOutcome::Applied(output));
    }

    #[tokio::test]
    async fn test_changed_plan_is_pending_again() {
        let store = Arc::new(MemoryPlanStore::default());
        let planner = Planner::new(store.clone());

        planner.apply(&target(), &[Instruction::StopAgent]).await.unwrap();
        store.agent_applies(&target(), &PlanOutput::new());
        assert!(planner
            .apply(&target(), &[Instruction::StopAgent])
            .await
            .unwrap()
            .is_applied());

        let outcome = planner.apply(&target(), &[Instruction::StartAgent]).await.unwrap();
        assert_eq!(outcome, PlanOutcome::Pending);
    }

    #[tokio::test]
    async fn test_failed_checksum_reports_failure() {
        let store = Arc::new(MemoryPlanStore::default());
        let planner = Planner::new(store.clone());

        planner.apply(&target(), &[Instruction::StopAgent]).await.unwrap();
        let mut output = PlanOutput::new();
        output.insert("stop-agent".to_string(), b"unit not found\n".to_vec());
        store.agent_fails(&target(), &output);

        match planner.apply(&target(), &[Instruction::StopAgent]).await.unwrap() {
            PlanOutcome::Failed(out) => {
                assert_eq!(describe_failure(&out), "stop-agent: unit not found")
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_output_is_an_error() {
        let plan = b"{}".to_vec();
        let record = PlanRecord {
            applied_checksum: Some(codec::checksum(&plan)),
            applied_output: Some(b"garbage".to_vec()),
            plan,
            ..Default::default()
        };
        assert!(matches!(evaluate(&record), Err(PlanError::MalformedOutput(_))));
    }

    #[tokio::test]
    async fn test_permit_and_revoke_are_idempotent() {
        let store = Arc::new(MemoryPlanStore::default());
        let planner = Planner::new(store.clone());

        planner.permit(&target()).await.unwrap();
        planner.permit(&target()).await.unwrap();
        assert!(store.is_granted(&target()));

        planner.revoke(&target()).await.unwrap();
        planner.revoke(&target()).await.unwrap();
        assert!(!store.is_granted(&target()));
    }
}
