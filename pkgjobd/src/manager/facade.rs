//! The request surface consumed by the client transport.
//!
//! [`Manager`] translates client verbs into job-manager calls and adds the
//! few policies that belong at the boundary: installed-state checks, the
//! dist-upgrade preemption of pending updates, and config delegation. The
//! transport glue itself (object bus, RPC) lives outside this crate.

use super::{JobManager, NotifyFn, LOCK_QUEUE, SYSTEM_CHANGE_QUEUE};
use crate::config::{ConfigError, ConfigFile};
use crate::jobs::{JobId, JobView};
use crate::system::{Architecture, JobType, Status, System, SystemError};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// Client-facing facade over the job manager and the backend queries.
pub struct Manager {
    backend: Arc<dyn System>,
    jobs: Arc<JobManager>,
    config: Mutex<ConfigFile>,
    config_path: PathBuf,
    architectures: Vec<Architecture>,
}

impl Manager {
    /// Builds the facade and the job manager it fronts.
    ///
    /// `notify` fires (coalesced, at most once per dispatch tick) whenever
    /// observable job state changed; the transport republishes its snapshot
    /// from [`Manager::job_list`] in response.
    pub fn new(
        backend: Arc<dyn System>,
        config: ConfigFile,
        config_path: PathBuf,
        notify: NotifyFn,
    ) -> Self {
        let jobs = JobManager::new(Arc::clone(&backend), notify);
        let architectures = backend.architectures();
        Self {
            backend,
            jobs,
            config: Mutex::new(config),
            config_path,
            architectures,
        }
    }

    /// The job manager, for spawning the dispatch loop.
    pub fn job_manager(&self) -> &Arc<JobManager> {
        &self.jobs
    }

    /// Updates a single package.
    pub fn update_package(&self, package_id: &str) -> Result<JobView, SystemError> {
        self.jobs
            .create_job(package_id, JobType::Update, vec![package_id.to_string()])
    }

    /// Installs a package; rejects if it is already installed.
    pub fn install_package(&self, package_id: &str) -> Result<JobView, SystemError> {
        if self.package_exists(package_id) {
            return Err(SystemError::ResourceExists);
        }
        self.jobs
            .create_job(package_id, JobType::Install, vec![package_id.to_string()])
    }

    /// Downloads a package's archives; rejects if it is already installed.
    pub fn download_package(&self, package_id: &str) -> Result<JobView, SystemError> {
        if self.package_exists(package_id) {
            return Err(SystemError::ResourceExists);
        }
        self.jobs
            .create_job(package_id, JobType::Download, vec![package_id.to_string()])
    }

    /// Removes a package; rejects if it is not installed.
    pub fn remove_package(&self, package_id: &str) -> Result<JobView, SystemError> {
        if !self.package_exists(package_id) {
            return Err(SystemError::NotFound);
        }
        self.jobs
            .create_job(package_id, JobType::Remove, vec![package_id.to_string()])
    }

    /// Refreshes the package source indexes.
    pub fn update_source(&self) -> Result<JobView, SystemError> {
        self.jobs.create_job("update source", JobType::UpdateSource, vec![])
    }

    /// Upgrades the whole distribution.
    ///
    /// Refuses while a dist-upgrade job exists. Pending (non-running) update
    /// jobs are cleaned first - the upgrade supersedes them; a running update
    /// is left to finish.
    pub fn dist_upgrade(&self) -> Result<JobView, SystemError> {
        let mut superseded = Vec::new();
        for view in self.jobs.list() {
            if view.ty == JobType::DistUpgrade {
                return Err(SystemError::ResourceExists);
            }
            if view.ty == JobType::Update && view.status != Status::Running {
                superseded.push(view.id);
            }
        }
        for id in superseded {
            info!(job_id = %id, "cleaning update superseded by dist-upgrade");
            if let Err(err) = self.jobs.clean_job(&id) {
                warn!(job_id = %id, error = %err, "failed to clean superseded update");
            }
        }
        self.jobs.create_job("dist upgrade", JobType::DistUpgrade, vec![])
    }

    /// Restarts a job (client verb for retrying or resuming).
    pub fn start_job(&self, id: &JobId) -> Result<(), SystemError> {
        self.jobs.mark_start(id)
    }

    /// Pauses a job.
    pub fn pause_job(&self, id: &JobId) -> Result<(), SystemError> {
        self.jobs.pause_job(id)
    }

    /// Cancels a job and marks it for removal.
    pub fn clean_job(&self, id: &JobId) -> Result<(), SystemError> {
        self.jobs.clean_job(id)
    }

    /// Whether the package is installed.
    pub fn package_exists(&self, package_id: &str) -> bool {
        self.backend.check_installed(package_id)
    }

    /// Bytes to download for the given packages. A single already-installed
    /// package costs nothing.
    pub fn packages_download_size(&self, packages: &[String]) -> u64 {
        if let [only] = packages {
            if self.package_exists(only) {
                return 0;
            }
        }
        self.backend.download_size(packages)
    }

    /// Desktop entry path for an installed package, if any.
    pub fn package_desktop_path(&self, package_id: &str) -> Option<PathBuf> {
        self.backend.desktop_path(package_id)
    }

    /// Persists the app store region preference.
    pub fn set_region(&self, region: &str) -> Result<(), ConfigError> {
        let mut config = self.lock_config();
        config.appstore.region = Some(region.to_string());
        config.save_to(&self.config_path)
    }

    /// The configured app store region, if set.
    pub fn region(&self) -> Option<String> {
        self.lock_config().appstore.region.clone()
    }

    /// Ordered snapshot of all jobs.
    pub fn job_list(&self) -> Vec<JobView> {
        self.jobs.list()
    }

    /// Architectures the backend reported at startup.
    pub fn system_architectures(&self) -> &[Architecture] {
        &self.architectures
    }

    /// Packages with a newer version available.
    pub fn upgradable_apps(&self) -> Vec<String> {
        self.backend.upgradable_packages()
    }

    /// True while a system-mutating job is running.
    pub fn system_on_changing(&self) -> bool {
        self.jobs.list().iter().any(|view| {
            view.status == Status::Running
                && (view.queue == SYSTEM_CHANGE_QUEUE || view.queue == LOCK_QUEUE)
        })
    }

    fn lock_config(&self) -> MutexGuard<'_, ConfigFile> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
