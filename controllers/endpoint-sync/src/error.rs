//! Controller-specific error types.
//!
//! The taxonomy mirrors the process exit policy: fatal errors (bad
//! configuration, authorization denied, unrecoverable write failures)
//! terminate the process, while cycle-transient errors are absorbed by
//! the scheduler and retried on the next trigger.

use crate::discovery::DiscoveryError;
use kube::Error as KubeError;
use openstack_client::OpenStackError;
use thiserror::Error;

/// Errors that can occur in the endpoint-sync controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// OpenStack API error
    #[error("OpenStack error: {0}")]
    OpenStack(#[from] OpenStackError),

    /// Discovery backend unavailable (cycle-transient)
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Invalid configuration (fatal at startup)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Authorization denied on the managed target (fatal)
    #[error("Authorization denied: {0}")]
    Denied(String),

    /// Optimistic-concurrency retries exhausted within one cycle
    /// (cycle-transient; the next scheduled cycle retries from scratch)
    #[error("Apply conflict persisted after {attempts} attempts")]
    ConflictExhausted { attempts: u32 },

    /// Managed target deleted and could not be recreated (write-fatal)
    #[error("Managed target unrecoverable: {0}")]
    WriteFatal(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether this error must terminate the process.
    ///
    /// Everything else is absorbed by the scheduler, logged, and retried
    /// on the next trigger with the managed target left untouched.
    pub fn is_fatal(&self) -> bool {
        match self {
            ControllerError::InvalidConfig(_)
            | ControllerError::Denied(_)
            | ControllerError::WriteFatal(_) => true,
            ControllerError::OpenStack(OpenStackError::Authentication(_)) => true,
            ControllerError::Kube(_)
            | ControllerError::OpenStack(_)
            | ControllerError::Discovery(_)
            | ControllerError::ConflictExhausted { .. }
            | ControllerError::Watch(_) => false,
        }
    }
}
