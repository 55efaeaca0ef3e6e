//! Controller-specific error types.
//!
//! This module defines error types specific to the Website Controller
//! that are not covered by upstream library errors.

use resource_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the Website Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Reading the Website or its workload failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Creating or updating a derived resource failed
    #[error("Failed to apply {kind} {name}: {source}")]
    Apply {
        kind: &'static str,
        name: String,
        #[source]
        source: StoreError,
    },

    /// Writing the Website status failed
    #[error("Failed to write status of Website {name}: {source}")]
    StatusWrite {
        name: String,
        #[source]
        source: StoreError,
    },

    /// Website cannot be reconciled as persisted
    #[error("Invalid Website: {0}")]
    InvalidSite(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Website CRD is missing from the cluster
    #[error("Website CRD not installed: {0}")]
    CrdNotInstalled(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Metrics/probe server failed
    #[error("Metrics server failed: {0}")]
    Server(String),
}
