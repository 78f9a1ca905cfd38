//! The backend contract consumed by the job engine.

use super::error::SystemError;
use super::types::{Architecture, Indicator, JobType};
use crate::jobs::JobId;
use std::path::PathBuf;

/// Interface to the underlying OS package tool.
///
/// The job manager holds a backend by reference for the life of the process
/// and drives it from the dispatch loop. Implementations must be safe to call
/// from multiple threads.
///
/// `start` must not block: it spawns or dispatches the actual work and
/// reports completion asynchronously through the attached indicator.
/// `abort` is synchronous but bounded.
pub trait System: Send + Sync {
    /// Architectures the package tool can install for.
    fn architectures(&self) -> Vec<Architecture>;

    /// Whether the package is currently installed.
    fn check_installed(&self, package_id: &str) -> bool;

    /// Begin executing a job.
    ///
    /// Returns an error only for failures detected immediately; everything
    /// later arrives through the indicator.
    fn start(
        &self,
        job_id: &JobId,
        job_type: JobType,
        packages: &[String],
    ) -> Result<(), SystemError>;

    /// Cancel a running job.
    fn abort(&self, job_id: &JobId) -> Result<(), SystemError>;

    /// Register the progress callback. Replaces any previous indicator.
    fn attach_indicator(&self, indicator: Indicator);

    /// Total download size of the given packages, in bytes.
    fn download_size(&self, packages: &[String]) -> u64;

    /// Path of the desktop entry installed by the package, if any.
    fn desktop_path(&self, package_id: &str) -> Option<PathBuf>;

    /// Packages with a newer version available.
    fn upgradable_packages(&self) -> Vec<String>;
}
