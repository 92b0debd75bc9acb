/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Snapshot Orchestrator
//!
//! Takes one etcd snapshot on one machine.
//!
//! ```text
//! (unset)          permit                               -> Pending
//! Pending/Planning apply [TakeSnapshot]
//!                    not applied yet                    -> Planning   (requeue plan interval)
//!                    applied                            -> Running
//!                    agent reported failure             -> Failed
//! Running          look for "<task>-<machine>*" report
//!                    ready                              -> Done
//!                    error                              -> Failed
//!                    absent                             (requeue convergence interval)
//! Done/Failed      revoke on every reconcile
//! ```

use super::{observe_success, patch_status, Context, Orchestrator, Step, FINALIZER};
use crate::error::{Error, Result};
use crate::metrics;
use crate::plan::{describe_failure, Instruction, Operation, PlanOutcome, PlanTarget};
use crate::remote::find_snapshot_file;
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event};
use kube::{Api, ResourceExt};
use sindri_models::models::{EtcdMachineSnapshot, EtcdMachineSnapshotStatus, Machine, SnapshotPhase};
use sindri_utils::logging::prelude::*;
use std::sync::Arc;
use std::time::Instant;

fn namespace_of(snapshot: &EtcdMachineSnapshot) -> Result<String> {
    snapshot
        .namespace()
        .ok_or_else(|| Error::MissingField(format!("ETCDMachineSnapshot {}", snapshot.name_any()), "metadata.namespace"))
}

/// Plan Record target of a snapshot task.
pub fn plan_target(snapshot: &EtcdMachineSnapshot) -> Result<PlanTarget> {
    Ok(PlanTarget::new(
        Operation::Snapshot,
        snapshot.name_any(),
        snapshot.spec.machine_name.clone(),
        namespace_of(snapshot)?,
    ))
}

/// Name handed to `rke2 etcd-snapshot save`; also the prefix of the report.
pub fn snapshot_name(snapshot: &EtcdMachineSnapshot) -> String {
    format!("{}-{}", snapshot.name_any(), snapshot.spec.machine_name)
}

fn with_phase(
    current: &EtcdMachineSnapshotStatus,
    phase: SnapshotPhase,
) -> EtcdMachineSnapshotStatus {
    EtcdMachineSnapshotStatus {
        phase: Some(phase),
        ..current.clone()
    }
}

/// Decides the next step for `snapshot`. `machine` is `None` when the
/// referenced machine does not exist.
pub async fn advance(
    orchestrator: &Orchestrator,
    snapshot: &EtcdMachineSnapshot,
    machine: Option<&Machine>,
) -> Result<Step<EtcdMachineSnapshotStatus>> {
    let target = plan_target(snapshot)?;
    let intervals = &orchestrator.intervals;
    let current = snapshot.status.clone().unwrap_or_default();
    let phase = snapshot.phase();

    if let Some(phase) = phase.filter(|p| p.is_terminal()) {
        debug!("snapshot {} is {}, revoking plan access", target, phase);
        orchestrator.planner.revoke(&target).await?;
        return Ok(Step::idle());
    }

    let machine = machine.ok_or_else(|| {
        Error::not_found(
            "Machine",
            format!("{}/{}", target.namespace, snapshot.spec.machine_name),
        )
    })?;
    if machine.node_name().is_none() {
        debug!("machine {} has no node yet", machine.name_any());
        return Ok(Step::requeue(intervals.address));
    }

    match phase {
        None => {
            orchestrator.planner.permit(&target).await?;
            Ok(Step::transition(
                with_phase(&current, SnapshotPhase::Pending),
                Action::requeue(intervals.plan),
            ))
        }
        Some(SnapshotPhase::Pending) | Some(SnapshotPhase::Planning) => {
            let instruction = Instruction::TakeSnapshot {
                name: snapshot_name(snapshot),
                location: snapshot.spec.location.clone(),
            };

            match orchestrator.planner.apply(&target, &[instruction]).await? {
                PlanOutcome::Pending if phase == Some(SnapshotPhase::Planning) => {
                    Ok(Step::requeue(intervals.plan))
                }
                PlanOutcome::Pending => Ok(Step::transition(
                    with_phase(&current, SnapshotPhase::Planning),
                    Action::requeue(intervals.plan),
                )),
                PlanOutcome::Applied(_) => Ok(Step::transition(
                    with_phase(&current, SnapshotPhase::Running),
                    Action::requeue(intervals.plan),
                )),
                PlanOutcome::Failed(output) => {
                    orchestrator.planner.revoke(&target).await?;
                    let mut status = with_phase(&current, SnapshotPhase::Failed);
                    status.error = Some(describe_failure(&output));
                    Ok(Step::transition(status, Action::await_change()))
                }
            }
        }
        Some(SnapshotPhase::Running) => {
            let files = orchestrator
                .snapshot_files
                .list(&target.namespace, &snapshot.spec.cluster_name)
                .await?;

            let Some(file) = find_snapshot_file(
                &files,
                &snapshot_name(snapshot),
                machine.node_name().unwrap_or_default(),
                snapshot.metadata.creation_timestamp.as_ref(),
            ) else {
                debug!("no snapshot report for {} yet", target);
                return Ok(Step::requeue(intervals.convergence));
            };

            if file.is_ready() {
                orchestrator.planner.revoke(&target).await?;
                let mut status = with_phase(&current, SnapshotPhase::Done);
                status.snapshot_file_name = Some(file.spec.snapshot_name.clone());
                return Ok(Step::transition(status, Action::await_change()));
            }
            if let Some(message) = file.error_message() {
                orchestrator.planner.revoke(&target).await?;
                let mut status = with_phase(&current, SnapshotPhase::Failed);
                status.error = Some(message);
                return Ok(Step::transition(status, Action::await_change()));
            }
            Ok(Step::requeue(intervals.convergence))
        }
        Some(SnapshotPhase::Done) | Some(SnapshotPhase::Failed) => Ok(Step::idle()),
    }
}

#[instrument(skip(snapshot, ctx), fields(name = %snapshot.name_any()))]
pub async fn reconcile(snapshot: Arc<EtcdMachineSnapshot>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = namespace_of(&snapshot)?;
    let api: Api<EtcdMachineSnapshot> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, FINALIZER, snapshot, |event| async {
        match event {
            Event::Apply(snapshot) => apply(snapshot, &api, &ctx).await,
            Event::Cleanup(snapshot) => cleanup(snapshot, &ctx).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

async fn apply(
    snapshot: Arc<EtcdMachineSnapshot>,
    api: &Api<EtcdMachineSnapshot>,
    ctx: &Context,
) -> Result<Action> {
    let started = Instant::now();
    let namespace = namespace_of(&snapshot)?;
    let machines: Api<Machine> = Api::namespaced(ctx.client.clone(), &namespace);
    let machine = machines.get_opt(&snapshot.spec.machine_name).await?;

    let step = advance(&ctx.orchestrator, &snapshot, machine.as_ref()).await?;

    if let Some(status) = &step.status {
        if let Some(phase) = status.phase {
            info!("snapshot {}/{} -> {}", namespace, snapshot.name_any(), phase);
            metrics::phase_transitions_total()
                .with_label_values(&["snapshot", phase.as_str()])
                .inc();
        }
        patch_status(api, &snapshot.name_any(), status).await?;
    }

    observe_success("snapshot", started);
    Ok(step.action)
}

/// Revokes plan access when the task is deleted. Work already sent to the
/// machine is not retracted.
async fn cleanup(snapshot: Arc<EtcdMachineSnapshot>, ctx: &Context) -> Result<Action> {
    let target = plan_target(&snapshot)?;
    ctx.orchestrator.planner.revoke(&target).await?;
    info!("cleaned up snapshot {}", target);
    Ok(Action::await_change())
}
