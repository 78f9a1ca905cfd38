//! The job manager: queue ownership, job lifecycle verbs, and dispatch.
//!
//! [`JobManager`] owns the three named queues behind a single mutex - the
//! daemon-wide serialization point. Client entry points, the dispatch tick
//! and backend progress callbacks all mutate queue and job state under it.
//!
//! The dispatch tick lives in [`dispatch`]; the client-verb surface consumed
//! by the transport lives in [`facade`].

mod dispatch;
mod facade;

pub use dispatch::DEFAULT_DISPATCH_INTERVAL;
pub use facade::Manager;

use crate::jobs::{transition, valid_transition, Job, JobId, JobQueue, JobView};
use crate::system::{JobProgressInfo, JobType, Status, System, SystemError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::warn;

/// Queue for package downloads; runs up to three jobs at once.
pub const DOWNLOAD_QUEUE: &str = "download";
pub const DOWNLOAD_QUEUE_CAP: usize = 3;

/// Queue for operations that mutate the installed system; strictly serial.
pub const SYSTEM_CHANGE_QUEUE: &str = "system change";
pub const SYSTEM_CHANGE_QUEUE_CAP: usize = 1;

/// The exclusion queue. While any job here is running, no other queue may
/// start jobs.
pub const LOCK_QUEUE: &str = "lock";
pub const LOCK_QUEUE_CAP: usize = 1;

/// Queue order for a dispatch tick. The lock queue goes first so its
/// exclusion takes effect within the same tick that starts its job.
pub(crate) const DISPATCH_ORDER: [&str; 3] = [LOCK_QUEUE, DOWNLOAD_QUEUE, SYSTEM_CHANGE_QUEUE];

/// Change-notification callback, fired at most once per dispatch tick.
pub type NotifyFn = Box<dyn Fn() + Send + Sync>;

/// Owns the job queues and drives jobs through their lifecycle.
///
/// All mutation is serialized by one internal mutex. The backend is held for
/// the life of the process; its progress indicator is attached at
/// construction and re-enters through [`JobManager::handle_progress`].
pub struct JobManager {
    backend: Arc<dyn System>,
    notify: NotifyFn,
    state: Mutex<ManagerState>,
}

pub(crate) struct ManagerState {
    queues: HashMap<&'static str, JobQueue>,
    changed: bool,
}

impl JobManager {
    /// Creates the manager with its three queues and registers the progress
    /// indicator on the backend.
    ///
    /// The dispatch loop is not started here; spawn
    /// [`JobManager::run`] on the runtime.
    pub fn new(backend: Arc<dyn System>, notify: NotifyFn) -> Arc<Self> {
        let mut queues = HashMap::new();
        for (name, cap) in [
            (DOWNLOAD_QUEUE, DOWNLOAD_QUEUE_CAP),
            (SYSTEM_CHANGE_QUEUE, SYSTEM_CHANGE_QUEUE_CAP),
            (LOCK_QUEUE, LOCK_QUEUE_CAP),
        ] {
            queues.insert(name, JobQueue::new(name, cap));
        }

        let manager = Arc::new(Self {
            backend: Arc::clone(&backend),
            notify,
            state: Mutex::new(ManagerState {
                queues,
                changed: false,
            }),
        });

        let weak: Weak<JobManager> = Arc::downgrade(&manager);
        backend.attach_indicator(Box::new(move |info| {
            if let Some(manager) = weak.upgrade() {
                manager.handle_progress(info);
            }
        }));

        manager
    }

    /// Creates a job of the given type, or promotes an equivalent existing
    /// one.
    ///
    /// Duplicate detection covers every queued job and every chained
    /// successor; a match on a successor hands back its predecessor, since
    /// the successor is not workable before the predecessor finishes. The
    /// matched job is raised so repeated submissions promote it.
    ///
    /// Install is a two-stage chain: a download-typed primary whose `next`
    /// is the install stage, sharing one public id.
    pub fn create_job(
        &self,
        name: &str,
        ty: JobType,
        packages: Vec<String>,
    ) -> Result<JobView, SystemError> {
        let mut state = self.lock_state();

        if let Some(existing) = state.guest(ty, &packages) {
            state.raise(&existing)?;
            let view = state
                .find(&existing)
                .map(Job::snapshot)
                .ok_or(SystemError::NotFound)?;
            return Ok(view);
        }

        let job = match ty {
            JobType::Download => Job::new(name, packages, JobType::Download, DOWNLOAD_QUEUE),
            JobType::Install => {
                let mut primary =
                    Job::new(name, packages.clone(), JobType::Download, DOWNLOAD_QUEUE);
                let secondary =
                    Job::new(name, packages, JobType::Install, SYSTEM_CHANGE_QUEUE);
                // The chain is observed under one identity: the install
                // stage's id is the public id from the start.
                primary.id = secondary.id.clone();
                primary.next = Some(Box::new(secondary));
                primary
            }
            JobType::Remove => Job::new(name, packages, JobType::Remove, SYSTEM_CHANGE_QUEUE),
            JobType::Update => Job::new(name, packages, JobType::Update, SYSTEM_CHANGE_QUEUE),
            JobType::UpdateSource => Job::new(name, packages, JobType::UpdateSource, LOCK_QUEUE),
            JobType::DistUpgrade => Job::new(name, packages, JobType::DistUpgrade, LOCK_QUEUE),
        };

        let id = job.id.clone();
        state.add_job(job)?;
        state.mark_start(&id)?;
        state
            .find(&id)
            .map(Job::snapshot)
            .ok_or(SystemError::NotFound)
    }

    /// Transitions the job to `Ready` (if needed) and raises it so the next
    /// dispatch tick considers it first.
    pub fn mark_start(&self, id: &JobId) -> Result<(), SystemError> {
        self.lock_state().mark_start(id)
    }

    /// Pauses a job.
    ///
    /// A running job must be cancelable and the backend abort must succeed;
    /// jobs that have not started yet are paused without contacting the
    /// backend.
    pub fn pause_job(&self, id: &JobId) -> Result<(), SystemError> {
        let mut state = self.lock_state();
        self.pause_locked(&mut state, id)
    }

    /// Marks a job for removal.
    ///
    /// A running cancelable job is paused first (best-effort). The successor
    /// is abandoned, the job transitions to `End`, and the dispatcher
    /// destroys it on the next tick - cleanup is deferred, not synchronous.
    /// A running non-cancelable job is force-ended without a backend abort.
    pub fn clean_job(&self, id: &JobId) -> Result<(), SystemError> {
        let mut state = self.lock_state();

        let should_pause = state
            .find(id)
            .map(|job| job.status == Status::Running && job.cancelable)
            .ok_or(SystemError::NotFound)?;
        if should_pause {
            if let Err(err) = self.pause_locked(&mut state, id) {
                warn!(job_id = %id, error = %err, "pause before clean failed");
            }
        }

        let job = state.find_mut(id).ok_or(SystemError::NotFound)?;
        if valid_transition(job.status, Status::End) {
            job.next = None;
        }
        transition(job, Status::End)?;
        state.changed = true;
        Ok(())
    }

    /// Snapshot of all jobs across all queues, source updates first, then by
    /// creation order.
    pub fn list(&self) -> Vec<JobView> {
        let state = self.lock_state();
        let mut views: Vec<JobView> = state
            .queues
            .values()
            .flat_map(|queue| queue.jobs().iter().map(Job::snapshot))
            .collect();
        views.sort_by(|a, b| {
            match (
                a.ty == JobType::UpdateSource,
                b.ty == JobType::UpdateSource,
            ) {
                (true, false) => std::cmp::Ordering::Less,
                (false, true) => std::cmp::Ordering::Greater,
                _ => a.create_time.cmp(&b.create_time),
            }
        });
        views
    }

    /// Snapshot of a single job.
    pub fn find_job(&self, id: &JobId) -> Option<JobView> {
        self.lock_state().find(id).map(Job::snapshot)
    }

    /// Ingests a backend progress report.
    ///
    /// Reports for unknown jobs are logged and dropped; this happens
    /// routinely when the backend reports in after a job was cleaned.
    pub fn handle_progress(&self, info: JobProgressInfo) {
        let mut state = self.lock_state();
        let changed = match state.find_mut(&info.job_id) {
            Some(job) => job.update_info(info),
            None => {
                warn!(job_id = %info.job_id, "progress report for unknown job dropped");
                return;
            }
        };
        if changed {
            state.changed = true;
        }
    }

    fn pause_locked(&self, state: &mut ManagerState, id: &JobId) -> Result<(), SystemError> {
        let job = state.find_mut(id).ok_or(SystemError::NotFound)?;
        if !valid_transition(job.status, Status::Paused) {
            return Err(SystemError::NotSupported);
        }
        if job.status == Status::Running {
            if !job.cancelable {
                return Err(SystemError::NotSupported);
            }
            self.backend.abort(&job.id)?;
        }
        transition(job, Status::Paused)?;
        state.changed = true;
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ManagerState {
    fn find(&self, id: &JobId) -> Option<&Job> {
        self.queues.values().find_map(|queue| queue.find(id))
    }

    fn find_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        self.queues.values_mut().find_map(|queue| queue.find_mut(id))
    }

    /// Duplicate detection across all queues and chained successors.
    fn guest(&self, ty: JobType, packages: &[String]) -> Option<JobId> {
        let fingerprint = packages.concat();
        for queue in self.queues.values() {
            for job in queue.jobs() {
                if job.ty == ty && job.fingerprint() == fingerprint {
                    return Some(job.id.clone());
                }
                if let Some(next) = &job.next {
                    if next.ty == ty && next.fingerprint() == fingerprint {
                        // Not the successor's own id: it is not workable
                        // until the predecessor finishes.
                        return Some(job.id.clone());
                    }
                }
            }
        }
        None
    }

    fn add_job(&mut self, job: Job) -> Result<(), SystemError> {
        let queue = self
            .queues
            .get_mut(job.queue_name())
            .ok_or(SystemError::NotFound)?;
        queue.add(job)?;
        self.changed = true;
        Ok(())
    }

    fn remove_job(&mut self, queue_name: &str, id: &JobId) -> Result<Job, SystemError> {
        let queue = self.queues.get_mut(queue_name).ok_or(SystemError::NotFound)?;
        let job = queue.remove(id)?;
        self.changed = true;
        Ok(job)
    }

    fn mark_start(&mut self, id: &JobId) -> Result<(), SystemError> {
        let mut transitioned = false;
        let queue_name = {
            let job = self.find_mut(id).ok_or(SystemError::NotFound)?;
            if job.status != Status::Ready {
                transition(job, Status::Ready)?;
                transitioned = true;
            }
            job.queue_name()
        };
        if transitioned {
            self.changed = true;
        }
        let queue = self.queues.get_mut(queue_name).ok_or(SystemError::NotFound)?;
        queue.raise(id)
    }

    fn raise(&mut self, id: &JobId) -> Result<(), SystemError> {
        let queue_name = self
            .find(id)
            .map(|job| job.queue_name())
            .ok_or(SystemError::NotFound)?;
        let queue = self.queues.get_mut(queue_name).ok_or(SystemError::NotFound)?;
        queue.raise(id)
    }

    fn lock_queue_busy(&self) -> bool {
        self.queues
            .get(LOCK_QUEUE)
            .map(|queue| !queue.running_jobs().is_empty())
            .unwrap_or(false)
    }

    pub(crate) fn queue(&self, name: &str) -> Option<&JobQueue> {
        self.queues.get(name)
    }

    pub(crate) fn queue_mut(&mut self, name: &str) -> Option<&mut JobQueue> {
        self.queues.get_mut(name)
    }

    pub(crate) fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    pub(crate) fn set_changed(&mut self) {
        self.changed = true;
    }
}
