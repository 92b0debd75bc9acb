/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Restore Orchestrator
//!
//! Restores every machine of a cluster from one inventoried local snapshot.
//! The machine that produced the snapshot is the *init machine*: it resets
//! etcd from the file, every other machine wipes its etcd data and rejoins
//! through it.
//!
//! | phase | work | advances when |
//! |---|---|---|
//! | Pending | pause the Cluster | paused |
//! | Started | permit every machine | granted |
//! | Shutdown | `StopAgent` on every machine | all applied |
//! | Running | reset etcd on the init machine | applied |
//! | AgentRestart | start init, rejoin the rest | all applied |
//! | Unpause | unpause the Cluster | unpaused |
//! | Joining | wait for `AgentHealthy` everywhere | all healthy |
//!
//! Before any non-terminal phase runs, every machine must be `Running` and
//! exactly one of them must be the init machine; anything else is a requeue.
//! A failure reported by an agent ends the restore in `Failed`.

use super::{observe_success, patch_status, Context, Orchestrator, Step, FINALIZER};
use crate::cluster::{get_cluster, list_machines};
use crate::error::{Error, Result};
use crate::metrics;
use crate::plan::{describe_failure, Instruction, Operation, PlanOutcome, PlanTarget};
use chrono::Utc;
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event};
use kube::{Api, Client, ResourceExt};
use sindri_models::models::conditions::{set_condition, READY_CONDITION};
use sindri_models::models::{
    EtcdSnapshotInventory, EtcdSnapshotRestore, EtcdSnapshotRestoreStatus, InventoryEntry, Machine,
    RestorePhase,
};
use sindri_utils::logging::prelude::*;
use std::sync::Arc;
use std::time::Instant;

const LOCAL_LOCATION_SCHEME: &str = "file://";

/// The snapshot a restore starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitSnapshot {
    /// Machine holding the snapshot file
    pub machine: String,
    /// Path of the snapshot file on that machine
    pub path: String,
}

/// Everything a restore reconcile needs besides the task.
#[derive(Debug, Clone, Default)]
pub struct RestoreScope {
    pub machines: Vec<Machine>,
    /// Unset for terminal phases, which only need the machines
    pub init: Option<InitSnapshot>,
}

fn namespace_of(restore: &EtcdSnapshotRestore) -> Result<String> {
    restore
        .namespace()
        .ok_or_else(|| Error::MissingField(format!("ETCDSnapshotRestore {}", restore.name_any()), "metadata.namespace"))
}

/// Resolves the inventory entry named by a restore into its init machine.
pub fn init_snapshot(entry: Option<InventoryEntry<'_>>, snapshot: &str) -> Result<InitSnapshot> {
    match entry {
        Some(InventoryEntry::Local(local)) => Ok(InitSnapshot {
            machine: local.machine_name.clone(),
            path: local
                .location
                .strip_prefix(LOCAL_LOCATION_SCHEME)
                .unwrap_or(&local.location)
                .to_string(),
        }),
        Some(InventoryEntry::S3(_)) => Err(Error::resolution(
            "ETCDSnapshot",
            snapshot,
            "stored in S3, only local snapshots can be restored",
        )),
        None => Err(Error::resolution(
            "ETCDSnapshot",
            snapshot,
            "not present in the cluster's snapshot inventory",
        )),
    }
}

/// Builds the scope of `restore`. Missing cluster, inventory or entry are
/// errors; terminal phases only look up the machines.
pub async fn resolve_scope(client: &Client, restore: &EtcdSnapshotRestore) -> Result<RestoreScope> {
    let namespace = namespace_of(restore)?;
    let cluster = &restore.spec.cluster_name;

    if restore.phase().is_terminal() {
        return Ok(RestoreScope {
            machines: list_machines(client, &namespace, cluster).await?,
            init: None,
        });
    }

    get_cluster(client, &namespace, cluster).await?;
    let machines = list_machines(client, &namespace, cluster).await?;

    let inventories: Api<EtcdSnapshotInventory> = Api::namespaced(client.clone(), &namespace);
    let inventory = inventories
        .get_opt(cluster)
        .await?
        .ok_or_else(|| Error::not_found("ETCDSnapshotInventory", format!("{}/{}", namespace, cluster)))?;

    let snapshot = &restore.spec.etcd_machine_snapshot_name;
    let init = init_snapshot(inventory.find(snapshot), snapshot)?;

    Ok(RestoreScope {
        machines,
        init: Some(init),
    })
}

fn plan_target(restore: &EtcdSnapshotRestore, namespace: &str, machine: &str) -> PlanTarget {
    PlanTarget::new(Operation::Restore, restore.name_any(), machine, namespace)
}

/// The init snapshot, if every machine is running and exactly one of them is
/// the init machine.
fn ready_init(scope: &RestoreScope) -> Option<&InitSnapshot> {
    let init = scope.init.as_ref()?;
    if scope.machines.is_empty() || !scope.machines.iter().all(Machine::is_running) {
        return None;
    }
    let matching = scope
        .machines
        .iter()
        .filter(|m| m.name_any() == init.machine)
        .count();
    (matching == 1).then_some(init)
}

/// Work for the AgentRestart phase, init machine first.
pub fn restart_plan(
    restore: &EtcdSnapshotRestore,
    namespace: &str,
    machines: &[Machine],
    init: &InitSnapshot,
    init_address: &str,
) -> Vec<(PlanTarget, Vec<Instruction>)> {
    let mut work = vec![(
        plan_target(restore, namespace, &init.machine),
        vec![Instruction::StartAgent],
    )];
    work.extend(
        machines
            .iter()
            .map(|m| m.name_any())
            .filter(|name| *name != init.machine)
            .map(|name| {
                (
                    plan_target(restore, namespace, &name),
                    vec![
                        Instruction::RemoveServerUrl,
                        Instruction::SetServerUrl(init_address.to_string()),
                        Instruction::RemoveEtcdData,
                        Instruction::RemoveManifests,
                        Instruction::StartAgent,
                    ],
                )
            }),
    );
    work
}

#[derive(Debug, PartialEq)]
enum Barrier {
    Passed,
    Waiting,
    Failed(String),
}

/// Applies every plan in `work` and reports whether all of them finished.
async fn barrier(
    orchestrator: &Orchestrator,
    work: &[(PlanTarget, Vec<Instruction>)],
) -> Result<Barrier> {
    let mut waiting = Vec::new();
    for (target, instructions) in work {
        match orchestrator.planner.apply(target, instructions).await? {
            PlanOutcome::Applied(_) => {}
            PlanOutcome::Pending => waiting.push(target.machine.as_str()),
            PlanOutcome::Failed(output) => {
                return Ok(Barrier::Failed(format!(
                    "machine {}: {}",
                    target.machine,
                    describe_failure(&output)
                )))
            }
        }
    }

    if waiting.is_empty() {
        Ok(Barrier::Passed)
    } else {
        debug!("waiting for machines {:?}", waiting);
        Ok(Barrier::Waiting)
    }
}

async fn revoke_all(orchestrator: &Orchestrator, targets: &[PlanTarget]) -> Result<()> {
    for target in targets {
        orchestrator.planner.revoke(target).await?;
    }
    Ok(())
}

/// Status after moving to `phase`, with the `Ready` condition following it.
fn status_for(
    restore: &EtcdSnapshotRestore,
    phase: RestorePhase,
    failure: Option<&str>,
) -> EtcdSnapshotRestoreStatus {
    let mut status = restore.status.clone().unwrap_or_default();
    debug_assert!(status.phase.can_transition_to(phase));
    status.phase = phase;

    let (ready, message) = match phase {
        RestorePhase::Finished => (true, "restore finished".to_string()),
        RestorePhase::Failed => (false, failure.unwrap_or("restore failed").to_string()),
        other => (false, format!("restore is in phase {}", other)),
    };
    set_condition(
        &mut status.conditions,
        READY_CONDITION,
        ready,
        phase.as_str(),
        &message,
        Utc::now(),
    );
    status
}

/// Decides the next step for `restore` given its resolved scope.
pub async fn advance(
    orchestrator: &Orchestrator,
    restore: &EtcdSnapshotRestore,
    scope: &RestoreScope,
) -> Result<Step<EtcdSnapshotRestoreStatus>> {
    let namespace = namespace_of(restore)?;
    let cluster = &restore.spec.cluster_name;
    let intervals = &orchestrator.intervals;
    let phase = restore.phase();
    let targets: Vec<PlanTarget> = scope
        .machines
        .iter()
        .map(|m| plan_target(restore, &namespace, &m.name_any()))
        .collect();

    if phase.is_terminal() {
        revoke_all(orchestrator, &targets).await?;
        return Ok(Step::idle());
    }

    let Some(init) = ready_init(scope) else {
        debug!(
            "restore {}/{} waiting for machines to be running",
            namespace,
            restore.name_any()
        );
        return Ok(Step::requeue(intervals.convergence));
    };

    let next = |phase| Step::transition(status_for(restore, phase, None), Action::requeue(intervals.plan));

    match phase {
        RestorePhase::Pending => {
            orchestrator.clusters.set_paused(&namespace, cluster, true).await?;
            Ok(next(RestorePhase::Started))
        }
        RestorePhase::Started => {
            for target in &targets {
                orchestrator.planner.permit(target).await?;
            }
            Ok(next(RestorePhase::Shutdown))
        }
        RestorePhase::Shutdown => {
            let work: Vec<_> = targets
                .iter()
                .map(|t| (t.clone(), vec![Instruction::StopAgent]))
                .collect();
            match barrier(orchestrator, &work).await? {
                Barrier::Passed => Ok(next(RestorePhase::Running)),
                Barrier::Waiting => Ok(Step::requeue(intervals.convergence)),
                Barrier::Failed(message) => fail(orchestrator, restore, &targets, &message).await,
            }
        }
        RestorePhase::Running => {
            let work = vec![(
                plan_target(restore, &namespace, &init.machine),
                vec![
                    Instruction::RemoveServerUrl,
                    Instruction::RemoveManifests,
                    Instruction::RestoreFromSnapshot(init.path.clone()),
                ],
            )];
            match barrier(orchestrator, &work).await? {
                Barrier::Passed => Ok(next(RestorePhase::AgentRestart)),
                Barrier::Waiting => Ok(Step::requeue(intervals.plan)),
                Barrier::Failed(message) => fail(orchestrator, restore, &targets, &message).await,
            }
        }
        RestorePhase::AgentRestart => {
            let address = scope
                .machines
                .iter()
                .find(|m| m.name_any() == init.machine)
                .and_then(Machine::internal_ip);
            let Some(address) = address else {
                debug!("init machine {} has no internal address yet", init.machine);
                return Ok(Step::requeue(intervals.address));
            };

            let work = restart_plan(restore, &namespace, &scope.machines, init, address);
            match barrier(orchestrator, &work).await? {
                Barrier::Passed => Ok(next(RestorePhase::Unpause)),
                Barrier::Waiting => Ok(Step::requeue(intervals.convergence)),
                Barrier::Failed(message) => fail(orchestrator, restore, &targets, &message).await,
            }
        }
        RestorePhase::Unpause => {
            orchestrator.clusters.set_paused(&namespace, cluster, false).await?;
            Ok(next(RestorePhase::Joining))
        }
        RestorePhase::Joining => {
            if !scope.machines.iter().all(Machine::agent_healthy) {
                return Ok(Step::requeue(intervals.convergence));
            }
            revoke_all(orchestrator, &targets).await?;
            Ok(Step::transition(
                status_for(restore, RestorePhase::Finished, None),
                Action::await_change(),
            ))
        }
        RestorePhase::Finished | RestorePhase::Failed => Ok(Step::idle()),
    }
}

async fn fail(
    orchestrator: &Orchestrator,
    restore: &EtcdSnapshotRestore,
    targets: &[PlanTarget],
    message: &str,
) -> Result<Step<EtcdSnapshotRestoreStatus>> {
    warn!("restore {} failed: {}", restore.name_any(), message);
    revoke_all(orchestrator, targets).await?;
    Ok(Step::transition(
        status_for(restore, RestorePhase::Failed, Some(message)),
        Action::await_change(),
    ))
}

#[instrument(skip(restore, ctx), fields(name = %restore.name_any()))]
pub async fn reconcile(restore: Arc<EtcdSnapshotRestore>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = namespace_of(&restore)?;
    let api: Api<EtcdSnapshotRestore> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, FINALIZER, restore, |event| async {
        match event {
            Event::Apply(restore) => apply(restore, &api, &ctx).await,
            Event::Cleanup(restore) => cleanup(restore, &ctx).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

async fn apply(
    restore: Arc<EtcdSnapshotRestore>,
    api: &Api<EtcdSnapshotRestore>,
    ctx: &Context,
) -> Result<Action> {
    let started = Instant::now();
    let scope = resolve_scope(&ctx.client, &restore).await?;
    let step = advance(&ctx.orchestrator, &restore, &scope).await?;

    if let Some(status) = &step.status {
        info!(
            "restore {} of cluster {}: {} -> {}",
            restore.name_any(),
            restore.spec.cluster_name,
            restore.phase(),
            status.phase
        );
        metrics::phase_transitions_total()
            .with_label_values(&["restore", status.phase.as_str()])
            .inc();
        patch_status(api, &restore.name_any(), status).await?;
    }

    observe_success("restore", started);
    Ok(step.action)
}

/// Revokes plan access on every machine of the cluster. The cluster may be
/// left paused if the restore is deleted mid-flight.
async fn cleanup(restore: Arc<EtcdSnapshotRestore>, ctx: &Context) -> Result<Action> {
    let namespace = namespace_of(&restore)?;
    let machines = list_machines(&ctx.client, &namespace, &restore.spec.cluster_name).await?;
    let targets: Vec<PlanTarget> = machines
        .iter()
        .map(|m| plan_target(&restore, &namespace, &m.name_any()))
        .collect();
    revoke_all(&ctx.orchestrator, &targets).await?;
    info!("cleaned up restore {}/{}", namespace, restore.name_any());
    Ok(Action::await_change())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::fixtures::{harness, Harness};
    use crate::plan::PlanOutput;
    use crate::testing::{machine, running_machine, NAMESPACE};
    use sindri_models::models::conditions::find_condition;
    use sindri_models::models::{EtcdSnapshotRestoreSpec, LocalSnapshot, S3Snapshot};
    use std::time::Duration;

    const SNAPSHOT_PATH: &str = "/var/lib/rancher/rke2/server/db/snapshots/c1-m0-node-1714557600";

    fn task(phase: Option<RestorePhase>) -> EtcdSnapshotRestore {
        let mut restore = EtcdSnapshotRestore::new(
            "r1",
            EtcdSnapshotRestoreSpec {
                cluster_name: "c1".to_string(),
                etcd_machine_snapshot_name: "c1-m0-node-1714557600".to_string(),
            },
        );
        restore.metadata.namespace = Some(NAMESPACE.to_string());
        restore.status = phase.map(|phase| EtcdSnapshotRestoreStatus {
            phase,
            conditions: vec![],
        });
        restore
    }

    fn scope() -> RestoreScope {
        RestoreScope {
            machines: vec![
                running_machine("m0", "10.0.0.5"),
                running_machine("m1", "10.0.0.6"),
                running_machine("m2", "10.0.0.7"),
            ],
            init: Some(InitSnapshot {
                machine: "m0".to_string(),
                path: SNAPSHOT_PATH.to_string(),
            }),
        }
    }

    fn target(machine: &str) -> PlanTarget {
        PlanTarget::new(Operation::Restore, "r1", machine, NAMESPACE)
    }

    /// Every agent executes whatever plan it currently has.
    fn agents_apply(h: &Harness) {
        for name in ["m0", "m1", "m2"] {
            if h.store.plan_bytes(&target(name)).is_some() {
                h.store.agent_applies(&target(name), &PlanOutput::new());
            }
        }
    }

    #[tokio::test]
    async fn test_walks_every_phase_in_order() {
        let h = harness();
        let scope = scope();
        let mut restore = task(None);
        let mut seen = vec![restore.phase()];

        for _ in 0..30 {
            if restore.phase().is_terminal() {
                break;
            }
            let step = advance(&h.orchestrator, &restore, &scope).await.unwrap();
            match step.status {
                Some(status) => {
                    assert!(restore.phase().can_transition_to(status.phase));
                    seen.push(status.phase);
                    restore.status = Some(status);
                }
                None => agents_apply(&h),
            }
        }

        assert_eq!(seen, RestorePhase::SEQUENCE.to_vec());
        assert_eq!(
            h.clusters.calls(),
            vec![("fleet/c1".to_string(), true), ("fleet/c1".to_string(), false)]
        );
        for name in ["m0", "m1", "m2"] {
            assert!(!h.store.is_granted(&target(name)));
        }

        let ready = find_condition(&restore.status.unwrap().conditions, READY_CONDITION)
            .cloned()
            .unwrap();
        assert_eq!(ready.status, "True");
        assert_eq!(ready.reason, "Finished");
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_every_machine() {
        let h = harness();
        let scope = scope();
        let restore = task(Some(RestorePhase::Shutdown));

        let step = advance(&h.orchestrator, &restore, &scope).await.unwrap();
        assert_eq!(step, Step::requeue(Duration::from_secs(30)));
        for name in ["m0", "m1", "m2"] {
            assert_eq!(h.store.instruction_names(&target(name)), vec!["stop-agent"]);
        }

        h.store.agent_applies(&target("m0"), &PlanOutput::new());
        h.store.agent_applies(&target("m1"), &PlanOutput::new());
        let step = advance(&h.orchestrator, &restore, &scope).await.unwrap();
        assert_eq!(step, Step::requeue(Duration::from_secs(30)));

        h.store.agent_applies(&target("m2"), &PlanOutput::new());
        let step = advance(&h.orchestrator, &restore, &scope).await.unwrap();
        assert_eq!(step.status.unwrap().phase, RestorePhase::Running);
    }

    #[tokio::test]
    async fn test_running_resets_etcd_on_init_machine_only() {
        let h = harness();
        let scope = scope();
        let restore = task(Some(RestorePhase::Running));

        let step = advance(&h.orchestrator, &restore, &scope).await.unwrap();
        assert_eq!(step, Step::requeue(Duration::from_secs(5)));
        assert_eq!(
            h.store.instruction_names(&target("m0")),
            vec!["remove-server-url", "remove-manifests", "etcd-restore"]
        );
        assert!(h.store.plan_bytes(&target("m1")).is_none());

        let plan = h.store.plan(&target("m0")).unwrap();
        assert_eq!(plan.instructions[2].command, "rke2");
        assert!(plan.instructions[2].args.last().unwrap().ends_with(SNAPSHOT_PATH));
    }

    #[tokio::test]
    async fn test_restart_rejoins_through_init_machine() {
        let h = harness();
        let scope = scope();
        let restore = task(Some(RestorePhase::AgentRestart));

        let step = advance(&h.orchestrator, &restore, &scope).await.unwrap();
        assert_eq!(step, Step::requeue(Duration::from_secs(30)));

        assert_eq!(h.store.instruction_names(&target("m0")), vec!["start-agent"]);
        for name in ["m1", "m2"] {
            assert_eq!(
                h.store.instruction_names(&target(name)),
                vec![
                    "remove-server-url",
                    "set-server-url",
                    "remove-etcd-data",
                    "remove-manifests",
                    "start-agent"
                ]
            );
            let plan = h.store.plan(&target(name)).unwrap();
            assert_eq!(plan.instructions[1].args.last().unwrap(), "10.0.0.5");
        }

        // Unpause only once the whole set has restarted
        h.store.agent_applies(&target("m0"), &PlanOutput::new());
        h.store.agent_applies(&target("m1"), &PlanOutput::new());
        let step = advance(&h.orchestrator, &restore, &scope).await.unwrap();
        assert!(step.status.is_none());

        h.store.agent_applies(&target("m2"), &PlanOutput::new());
        let step = advance(&h.orchestrator, &restore, &scope).await.unwrap();
        assert_eq!(step.status.unwrap().phase, RestorePhase::Unpause);
    }

    #[test]
    fn test_restart_plan_puts_init_first() {
        let restore = task(Some(RestorePhase::AgentRestart));
        let machines = vec![
            running_machine("m0", "10.0.0.5"),
            running_machine("m1", "10.0.0.6"),
            running_machine("m2", "10.0.0.7"),
        ];
        let init = InitSnapshot {
            machine: "m2".to_string(),
            path: SNAPSHOT_PATH.to_string(),
        };

        let work = restart_plan(&restore, NAMESPACE, &machines, &init, "10.0.0.7");
        let order: Vec<&str> = work.iter().map(|(t, _)| t.machine.as_str()).collect();
        assert_eq!(order, vec!["m2", "m0", "m1"]);
        assert_eq!(work[0].1, vec![Instruction::StartAgent]);
        assert!(work[1..]
            .iter()
            .all(|(_, i)| i.contains(&Instruction::SetServerUrl("10.0.0.7".to_string()))));
    }

    #[tokio::test]
    async fn test_restart_waits_for_init_address() {
        let h = harness();
        let mut scope = scope();
        scope.machines[0] = machine("m0", Some("m0"), None, true, true);
        let restore = task(Some(RestorePhase::AgentRestart));

        let step = advance(&h.orchestrator, &restore, &scope).await.unwrap();
        assert_eq!(step, Step::requeue(Duration::from_secs(10)));
        assert!(h.store.plan_bytes(&target("m1")).is_none());
    }

    #[tokio::test]
    async fn test_preconditions_requeue_without_side_effects() {
        let h = harness();
        let restore = task(None);

        let mut not_running = scope();
        not_running.machines[1] = machine("m1", Some("m1"), Some("10.0.0.6"), false, false);
        let step = advance(&h.orchestrator, &restore, &not_running).await.unwrap();
        assert_eq!(step, Step::requeue(Duration::from_secs(30)));

        let mut no_init = scope();
        no_init.machines.remove(0);
        let step = advance(&h.orchestrator, &restore, &no_init).await.unwrap();
        assert_eq!(step, Step::requeue(Duration::from_secs(30)));

        assert!(h.clusters.calls().is_empty());
    }

    #[tokio::test]
    async fn test_joining_waits_for_healthy_agents() {
        let h = harness();
        let mut scope = scope();
        scope.machines[2] = machine("m2", Some("m2"), Some("10.0.0.7"), true, false);
        let restore = task(Some(RestorePhase::Joining));

        let step = advance(&h.orchestrator, &restore, &scope).await.unwrap();
        assert_eq!(step, Step::requeue(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_agent_failure_fails_restore() {
        let h = harness();
        let scope = scope();
        let restore = task(Some(RestorePhase::Shutdown));

        advance(&h.orchestrator, &restore, &scope).await.unwrap();
        let mut output = PlanOutput::new();
        output.insert("stop-agent".to_string(), b"unit not found".to_vec());
        h.store.agent_fails(&target("m1"), &output);

        let step = advance(&h.orchestrator, &restore, &scope).await.unwrap();
        let status = step.status.unwrap();
        assert_eq!(status.phase, RestorePhase::Failed);

        let ready = find_condition(&status.conditions, READY_CONDITION).unwrap();
        assert_eq!(ready.status, "False");
        assert_eq!(ready.message, "machine m1: stop-agent: unit not found");
        for name in ["m0", "m1", "m2"] {
            assert_eq!(h.store.revoke_count(&target(name)), 1);
        }
    }

    #[tokio::test]
    async fn test_terminal_phases_revoke_every_time() {
        for phase in [RestorePhase::Finished, RestorePhase::Failed] {
            let h = harness();
            let scope = RestoreScope {
                machines: scope().machines,
                init: None,
            };
            let restore = task(Some(phase));

            for _ in 0..2 {
                let step = advance(&h.orchestrator, &restore, &scope).await.unwrap();
                assert_eq!(step, Step::idle());
            }
            for name in ["m0", "m1", "m2"] {
                assert_eq!(h.store.revoke_count(&target(name)), 2);
            }
        }
    }

    #[test]
    fn test_init_snapshot_from_local_entry() {
        let local = LocalSnapshot {
            name: "c1-m0-node-1714557600".to_string(),
            location: format!("file://{}", SNAPSHOT_PATH),
            machine_name: "m0".to_string(),
            creation_time: None,
        };

        let init = init_snapshot(Some(InventoryEntry::Local(&local)), &local.name).unwrap();
        assert_eq!(init.machine, "m0");
        assert_eq!(init.path, SNAPSHOT_PATH);
    }

    #[test]
    fn test_init_snapshot_rejects_s3_and_missing_entries() {
        let s3 = S3Snapshot {
            name: "c1-m0-node-1714557600".to_string(),
            location: "s3://backups/c1-m0-node-1714557600".to_string(),
            creation_time: None,
        };

        let err = init_snapshot(Some(InventoryEntry::S3(&s3)), &s3.name).unwrap_err();
        assert!(err.to_string().contains("S3"));

        let err = init_snapshot(None, "gone").unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }
}
