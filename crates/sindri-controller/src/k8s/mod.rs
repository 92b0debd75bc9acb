//! Kubernetes client helpers
pub mod api;
