//! Error vocabulary shared across the engine/backend boundary.

use super::types::JobType;
use thiserror::Error;

/// Errors surfaced by the job engine and the backend boundary.
#[derive(Debug, Error)]
pub enum SystemError {
    /// Unknown job, queue, or package.
    #[error("resource not found")]
    NotFound,

    /// Duplicate job, or the package is already installed.
    #[error("resource already exists")]
    ResourceExists,

    /// Illegal state transition or unsupported operation.
    #[error("operation not supported")]
    NotSupported,

    /// The queue already holds a job with the same type and package set.
    #[error("job {job_type} for packages {packages:?} already queued")]
    Conflict {
        job_type: JobType,
        packages: Vec<String>,
    },

    /// The package backend reported a failure.
    #[error("backend failure: {0}")]
    Backend(String),
}

impl SystemError {
    /// Short machine-readable code for transports that map errors to strings.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::ResourceExists => "already-exists",
            Self::NotSupported => "not-supported",
            Self::Conflict { .. } => "conflict",
            Self::Backend(_) => "backend-failure",
        }
    }
}
