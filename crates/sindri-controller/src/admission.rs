/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Admission Gate
//!
//! Validating webhook for the task resources. A snapshot or restore task
//! acts on a whole Cluster API cluster, so creating or changing one requires
//! full rights on that cluster:
//!
//! - requests from the controller's own identity are allowed
//! - requests without `spec.clusterName` are denied
//! - otherwise a `SubjectAccessReview` for verb `*` on the referenced
//!   `clusters.cluster.x-k8s.io` object decides
//!
//! A review that cannot be performed denies the request.

use crate::error::Result;
use crate::metrics;
use async_trait::async_trait;
use axum::{extract::State, routing::post, Json, Router};
use k8s_openapi::api::authentication::v1::UserInfo;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SubjectAccessReview, SubjectAccessReviewSpec,
};
use kube::api::PostParams;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::DynamicObject;
use kube::{Api, Client};
use sindri_utils::logging::prelude::*;
use std::sync::Arc;

const CLUSTER_API_GROUP: &str = "cluster.x-k8s.io";
const CLUSTERS_RESOURCE: &str = "clusters";

/// Answers whether a user may manage a cluster.
#[async_trait]
pub trait AccessReviewer: Send + Sync {
    async fn can_manage_cluster(
        &self,
        user: &UserInfo,
        namespace: &str,
        cluster: &str,
    ) -> Result<bool>;
}

/// Asks the API server through a `SubjectAccessReview`.
#[derive(Clone)]
pub struct KubeAccessReviewer {
    client: Client,
}

impl KubeAccessReviewer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AccessReviewer for KubeAccessReviewer {
    async fn can_manage_cluster(
        &self,
        user: &UserInfo,
        namespace: &str,
        cluster: &str,
    ) -> Result<bool> {
        let review = SubjectAccessReview {
            spec: SubjectAccessReviewSpec {
                user: user.username.clone(),
                groups: user.groups.clone(),
                uid: user.uid.clone(),
                extra: user.extra.clone(),
                resource_attributes: Some(ResourceAttributes {
                    group: Some(CLUSTER_API_GROUP.to_string()),
                    resource: Some(CLUSTERS_RESOURCE.to_string()),
                    verb: Some("*".to_string()),
                    namespace: Some(namespace.to_string()),
                    name: Some(cluster.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        let api: Api<SubjectAccessReview> = Api::all(self.client.clone());
        let result = api.create(&PostParams::default(), &review).await?;
        Ok(result.status.map(|s| s.allowed).unwrap_or(false))
    }
}

/// Shared state of the admission route.
#[derive(Clone)]
pub struct AdmissionState {
    /// Username of the controller itself
    pub identity: String,
    pub reviewer: Arc<dyn AccessReviewer>,
}

fn spec_cluster(object: &DynamicObject) -> Option<String> {
    object
        .data
        .get("spec")
        .and_then(|spec| spec.get("clusterName"))
        .and_then(|name| name.as_str())
        .map(str::to_string)
}

/// `spec.clusterName` of the new object, or of the old one on delete. An
/// update may not move a task to another cluster.
fn target_cluster(request: &AdmissionRequest<DynamicObject>) -> std::result::Result<String, String> {
    let new = request.object.as_ref().and_then(spec_cluster);
    let old = request.old_object.as_ref().and_then(spec_cluster);
    match (new, old) {
        (Some(new), Some(old)) if new != old => Err(format!(
            "{} {} cannot move from cluster {} to {}",
            request.kind.kind, request.name, old, new
        )),
        (Some(cluster), _) | (None, Some(cluster)) => Ok(cluster),
        (None, None) => Err(format!(
            "{} {} does not reference a cluster in spec.clusterName",
            request.kind.kind, request.name
        )),
    }
}

/// Decides one admission request.
pub async fn decide(
    request: &AdmissionRequest<DynamicObject>,
    identity: &str,
    reviewer: &dyn AccessReviewer,
) -> AdmissionResponse {
    let response = AdmissionResponse::from(request);
    let username = request.user_info.username.as_deref().unwrap_or_default();

    let verdict = if username == identity {
        Ok(())
    } else {
        match target_cluster(request) {
            Err(message) => Err(message),
            Ok(cluster) => {
                let namespace = request.namespace.as_deref().unwrap_or_default();
                match reviewer
                    .can_manage_cluster(&request.user_info, namespace, &cluster)
                    .await
                {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(format!(
                        "user {} is not allowed to manage cluster {}/{}",
                        username, namespace, cluster
                    )),
                    Err(e) => {
                        warn!("access review for {} failed: {}", username, e);
                        Err(format!("could not review access to cluster {}/{}: {}", namespace, cluster, e))
                    }
                }
            }
        }
    };

    match verdict {
        Ok(()) => {
            metrics::admission_decisions_total()
                .with_label_values(&["true"])
                .inc();
            response
        }
        Err(message) => {
            info!(user = username, "denied {} {}: {}", request.kind.kind, request.name, message);
            metrics::admission_decisions_total()
                .with_label_values(&["false"])
                .inc();
            response.deny(message)
        }
    }
}

async fn validate(
    State(state): State<AdmissionState>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            warn!("invalid admission review: {}", e);
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let response = decide(&request, &state.identity, state.reviewer.as_ref()).await;
    Json(response.into_review())
}

/// Router serving `POST /validate`.
///
/// The route speaks plain HTTP. The API server only calls webhooks over
/// HTTPS, so TLS must be terminated in front of it.
pub fn configure_admission_routes(state: AdmissionState) -> Router {
    Router::new()
        .route("/validate", post(validate))
        .with_state(state)
}
