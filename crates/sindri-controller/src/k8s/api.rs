/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Kubernetes API Module
//!
//! Client construction and retry handling shared by every component that
//! writes to the API server.
//!
//! ## Clients
//!
//! - [`create_k8s_client`] connects to the management cluster, either through
//!   an explicit kubeconfig path or the default in-cluster/`KUBECONFIG` lookup.
//! - [`remote_client`] connects to a target cluster using the kubeconfig
//!   Cluster API stores in the `<cluster>-kubeconfig` secret.
//!
//! ## Retries
//!
//! [`with_retries`] retries throttling and server-side failures with
//! exponential backoff. Anything else (not found, conflict, forbidden) is
//! returned immediately.

use crate::error::{Error, Result};
use backoff::ExponentialBackoffBuilder;
use k8s_openapi::api::core::v1::Secret;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, Error as KubeError};
use sindri_utils::logging::prelude::*;
use std::time::Duration;

/// Key of the kubeconfig inside a Cluster API kubeconfig secret
pub const KUBECONFIG_SECRET_KEY: &str = "value";

/// Field manager used for every server-side apply
pub const FIELD_MANAGER: &str = "sindri-controller";

/// Retry configuration for Kubernetes operations
pub struct RetryConfig {
    pub max_elapsed_time: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_elapsed_time: Duration::from_secs(30),
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Determines if a Kubernetes error is retryable
pub fn is_retryable_error(error: &KubeError) -> bool {
    match error {
        KubeError::Api(api_err) => {
            matches!(api_err.code, 429 | 500 | 503 | 504)
                || matches!(
                    api_err.reason.as_str(),
                    "ServiceUnavailable" | "InternalError" | "Timeout" | "TooManyRequests"
                )
        }
        _ => false,
    }
}

pub fn is_not_found(error: &KubeError) -> bool {
    matches!(error, KubeError::Api(api_err) if api_err.code == 404)
}

/// Executes a Kubernetes operation, retrying transient failures
pub async fn with_retries<F, Fut, T>(operation: F, config: RetryConfig) -> Result<T, KubeError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, KubeError>>,
{
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(config.initial_interval)
        .with_max_interval(config.max_interval)
        .with_multiplier(config.multiplier)
        .with_max_elapsed_time(Some(config.max_elapsed_time))
        .build();

    let operation_with_backoff = || async {
        match operation().await {
            Ok(value) => Ok(value),
            Err(error) if is_retryable_error(&error) => {
                warn!("Retryable error encountered: {}", error);
                Err(backoff::Error::Transient {
                    err: error,
                    retry_after: None,
                })
            }
            Err(error) => Err(backoff::Error::Permanent(error)),
        }
    };

    backoff::future::retry(backoff, operation_with_backoff).await
}

/// Creates a client for the management cluster.
pub async fn create_k8s_client(kubeconfig_path: Option<&str>) -> Result<Client> {
    let config = match kubeconfig_path {
        Some(path) => {
            let kubeconfig =
                Kubeconfig::read_from(path).map_err(|e| Error::Kubeconfig(e.to_string()))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::Kubeconfig(e.to_string()))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::Kubeconfig(e.to_string()))?,
    };

    let client = Client::try_from(config)?;
    let version = client.apiserver_version().await?;
    info!(
        "Connected to management cluster (Kubernetes {}.{})",
        version.major, version.minor
    );
    Ok(client)
}

/// Creates a client for a target cluster from its Cluster API kubeconfig secret.
pub async fn remote_client(client: &Client, namespace: &str, cluster: &str) -> Result<Client> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let name = format!("{}-kubeconfig", cluster);
    let secret = secrets
        .get_opt(&name)
        .await?
        .ok_or_else(|| Error::not_found("Secret", format!("{}/{}", namespace, name)))?;

    let raw = secret
        .data
        .and_then(|mut data| data.remove(KUBECONFIG_SECRET_KEY))
        .ok_or_else(|| Error::MissingField(format!("Secret {}/{}", namespace, name), "data.value"))?;
    let yaml = String::from_utf8(raw.0).map_err(|e| Error::Kubeconfig(e.to_string()))?;

    let kubeconfig = Kubeconfig::from_yaml(&yaml).map_err(|e| Error::Kubeconfig(e.to_string()))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::Kubeconfig(e.to_string()))?;
    Ok(Client::try_from(config)?)
}
