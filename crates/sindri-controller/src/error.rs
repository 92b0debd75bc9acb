/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Error types for the controller.
//!
//! "Not ready yet" is never an error: reconcilers express it as a requeue.
//! Everything here ends up in the controller's error policy, which logs it
//! and retries later.

use crate::plan::PlanError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Plan(#[from] PlanError),

    /// A referenced cluster, machine or inventory entry does not exist
    #[error("{kind} {name} could not be resolved: {reason}")]
    Resolution {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("{0} is missing {1}")]
    MissingField(String, &'static str),

    #[error("finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),

    #[error("kubeconfig error: {0}")]
    Kubeconfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn resolution(kind: &'static str, name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Resolution {
            kind,
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::resolution(kind, name, "not found")
    }

    /// Short label used for the reconcile failure metric
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::Kube(_) => "kube",
            Error::Plan(PlanError::MalformedOutput(_)) => "malformed_output",
            Error::Plan(_) => "plan_store",
            Error::Resolution { .. } => "resolution",
            Error::MissingField(..) => "missing_field",
            Error::Finalizer(_) => "finalizer",
            Error::Kubeconfig(_) => "kubeconfig",
            Error::Serialization(_) => "serialization",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
