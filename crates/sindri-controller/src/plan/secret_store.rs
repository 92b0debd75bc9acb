/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! [`PlanStore`] backed by Kubernetes objects in the machine's namespace.
//!
//! - the record is a `Secret` of type `sindri.io/machine-plan`
//! - `grant` creates a `Role` allowing get/watch/update/patch on that one
//!   Secret and a `RoleBinding` to the machine agent's ServiceAccount
//! - `revoke` deletes both; a missing object counts as deleted
//!
//! The controller owns only the `plan` key. It is written with server-side
//! apply, so keys written by the agent survive every rewrite.

use super::{PlanError, PlanRecord, PlanStore, PlanTarget};
use crate::k8s::api::{is_not_found, with_retries, RetryConfig, FIELD_MANAGER};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{DeleteParams, Patch, PatchParams};
use kube::{Api, Client};
use sindri_utils::logging::prelude::*;
use std::collections::BTreeMap;

pub const PLAN_SECRET_TYPE: &str = "sindri.io/machine-plan";

pub const PLAN_KEY: &str = "plan";
pub const APPLIED_CHECKSUM_KEY: &str = "applied-checksum";
pub const APPLIED_OUTPUT_KEY: &str = "applied-output";
pub const FAILED_CHECKSUM_KEY: &str = "failed-checksum";
pub const FAILED_OUTPUT_KEY: &str = "failed-output";

const OPERATION_LABEL: &str = "etcd.sindri.io/operation";
const OWNER_LABEL: &str = "etcd.sindri.io/owner";
const MACHINE_LABEL: &str = "etcd.sindri.io/machine";
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

#[derive(Clone)]
pub struct SecretPlanStore {
    client: Client,
    service_account_suffix: String,
}

impl SecretPlanStore {
    pub fn new(client: Client, service_account_suffix: impl Into<String>) -> Self {
        Self {
            client,
            service_account_suffix: service_account_suffix.into(),
        }
    }

    fn metadata(target: &PlanTarget) -> ObjectMeta {
        ObjectMeta {
            name: Some(target.record_name()),
            namespace: Some(target.namespace.clone()),
            labels: Some(labels(target)),
            ..Default::default()
        }
    }

    async fn apply<K>(&self, api: &Api<K>, name: &str, object: &K) -> Result<(), PlanError>
    where
        K: kube::Resource + Clone + serde::Serialize + serde::de::DeserializeOwned + std::fmt::Debug,
    {
        let params = PatchParams::apply(FIELD_MANAGER).force();
        let patch = Patch::Apply(object);
        with_retries(|| api.patch(name, &params, &patch), RetryConfig::default()).await?;
        Ok(())
    }

    async fn delete<K>(&self, api: &Api<K>, name: &str) -> Result<(), PlanError>
    where
        K: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
    {
        let params = DeleteParams::default();
        let result = with_retries(|| api.delete(name, &params), RetryConfig::default()).await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!("{} already deleted", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Name of the ServiceAccount the agent on `machine` runs as.
pub fn agent_service_account(machine: &str, suffix: &str) -> String {
    format!("{}-{}", machine, suffix)
}

fn labels(target: &PlanTarget) -> BTreeMap<String, String> {
    BTreeMap::from([
        (OPERATION_LABEL.to_string(), target.operation.as_str().to_string()),
        (OWNER_LABEL.to_string(), target.owner.clone()),
        (MACHINE_LABEL.to_string(), target.machine.clone()),
        (MANAGED_BY_LABEL.to_string(), "sindri".to_string()),
    ])
}

/// Secret carrying only the controller-owned key.
pub fn plan_secret(target: &PlanTarget, plan: &[u8]) -> Secret {
    Secret {
        metadata: SecretPlanStore::metadata(target),
        type_: Some(PLAN_SECRET_TYPE.to_string()),
        data: Some(BTreeMap::from([(
            PLAN_KEY.to_string(),
            ByteString(plan.to_vec()),
        )])),
        ..Default::default()
    }
}

pub fn plan_role(target: &PlanTarget) -> Role {
    Role {
        metadata: SecretPlanStore::metadata(target),
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec![String::new()]),
            resources: Some(vec!["secrets".to_string()]),
            resource_names: Some(vec![target.record_name()]),
            verbs: ["get", "watch", "update", "patch"]
                .iter()
                .map(|v| v.to_string())
                .collect(),
            ..Default::default()
        }]),
    }
}

pub fn plan_role_binding(target: &PlanTarget, service_account_suffix: &str) -> RoleBinding {
    RoleBinding {
        metadata: SecretPlanStore::metadata(target),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: target.record_name(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: agent_service_account(&target.machine, service_account_suffix),
            namespace: Some(target.namespace.clone()),
            api_group: None,
        }]),
    }
}

/// Reads a Plan Record out of its Secret.
pub fn record_from_secret(secret: Secret) -> PlanRecord {
    let mut data = secret.data.unwrap_or_default();
    let mut take = |key: &str| data.remove(key).map(|b| b.0);
    let text = |bytes: Option<Vec<u8>>| {
        bytes.map(|b| String::from_utf8_lossy(&b).trim().to_string())
    };

    PlanRecord {
        plan: take(PLAN_KEY).unwrap_or_default(),
        applied_checksum: text(take(APPLIED_CHECKSUM_KEY)),
        applied_output: take(APPLIED_OUTPUT_KEY),
        failed_checksum: text(take(FAILED_CHECKSUM_KEY)),
        failed_output: take(FAILED_OUTPUT_KEY),
    }
}

#[async_trait]
impl PlanStore for SecretPlanStore {
    async fn read(&self, target: &PlanTarget) -> Result<Option<PlanRecord>, PlanError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &target.namespace);
        let name = target.record_name();
        let secret = with_retries(|| api.get_opt(&name), RetryConfig::default()).await?;
        Ok(secret.map(record_from_secret))
    }

    async fn write(&self, target: &PlanTarget, plan: &[u8]) -> Result<(), PlanError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &target.namespace);
        self.apply(&api, &target.record_name(), &plan_secret(target, plan))
            .await
    }

    async fn grant(&self, target: &PlanTarget) -> Result<(), PlanError> {
        let name = target.record_name();

        let roles: Api<Role> = Api::namespaced(self.client.clone(), &target.namespace);
        self.apply(&roles, &name, &plan_role(target)).await?;

        let bindings: Api<RoleBinding> = Api::namespaced(self.client.clone(), &target.namespace);
        self.apply(
            &bindings,
            &name,
            &plan_role_binding(target, &self.service_account_suffix),
        )
        .await?;

        info!("Granted plan access for {}", target);
        Ok(())
    }

    async fn revoke(&self, target: &PlanTarget) -> Result<(), PlanError> {
        let name = target.record_name();

        let bindings: Api<RoleBinding> = Api::namespaced(self.client.clone(), &target.namespace);
        self.delete(&bindings, &name).await?;

        let roles: Api<Role> = Api::namespaced(self.client.clone(), &target.namespace);
        self.delete(&roles, &name).await?;

        info!("Revoked plan access for {}", target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Operation;

    fn target() -> PlanTarget {
        PlanTarget::new(Operation::Restore, "r1", "m2", "fleet")
    }

    #[test]
    fn test_plan_secret_carries_only_plan_key() {
        let secret = plan_secret(&target(), b"{}");
        assert_eq!(secret.metadata.name.as_deref(), Some("restore-r1-m2"));
        assert_eq!(secret.type_.as_deref(), Some(PLAN_SECRET_TYPE));
        let data = secret.data.unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[PLAN_KEY].0, b"{}".to_vec());
    }

    #[test]
    fn test_role_is_scoped_to_one_secret() {
        let role = plan_role(&target());
        let rule = &role.rules.unwrap()[0];
        assert_eq!(rule.resource_names.as_deref(), Some(&["restore-r1-m2".to_string()][..]));
        assert_eq!(rule.verbs, vec!["get", "watch", "update", "patch"]);
    }

    #[test]
    fn test_binding_targets_machine_agent() {
        let binding = plan_role_binding(&target(), "system-agent");
        let subject = &binding.subjects.unwrap()[0];
        assert_eq!(subject.kind, "ServiceAccount");
        assert_eq!(subject.name, "m2-system-agent");
        assert_eq!(subject.namespace.as_deref(), Some("fleet"));
        assert_eq!(binding.role_ref.name, "restore-r1-m2");
    }

    #[test]
    fn test_record_from_secret_trims_checksums() {
        let secret = Secret {
            data: Some(BTreeMap::from([
                (PLAN_KEY.to_string(), ByteString(b"{}".to_vec())),
                (APPLIED_CHECKSUM_KEY.to_string(), ByteString(b"abc123\n".to_vec())),
            ])),
            ..Default::default()
        };

        let record = record_from_secret(secret);
        assert_eq!(record.plan, b"{}".to_vec());
        assert_eq!(record.applied_checksum.as_deref(), Some("abc123"));
        assert_eq!(record.applied_output, None);
        assert_eq!(record.failed_checksum, None);
    }
}
