//! The job record and its identity.

use crate::system::{JobProgressInfo, JobType, Status};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Global counter for generating unique job IDs.
static JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Global counter used to order jobs by creation.
///
/// A monotonic counter rather than a wall-clock instant: ordering must be
/// total and stable even when two jobs are created within the same clock
/// granule.
static CREATE_TIME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Automatic restarts a job gets after failing, before it stays Failed.
pub const DEFAULT_RETRY: u8 = 3;

/// Unique identifier for a job, stable for the job's lifetime.
///
/// For install chains the successor's id is reused as the public id, so
/// clients observe a single identity across the download→install handoff.
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct JobId(String);

impl JobId {
    /// Creates a job ID with the given string value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a unique auto-generated job ID (`job-{counter}`).
    pub fn auto() -> Self {
        let counter = JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("job-{}", counter))
    }

    /// Returns the string value of this job ID.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single client-visible unit of package work.
///
/// A job lives in exactly one queue until the dispatcher destroys it after
/// it reaches `End`. The `next` field chains a successor that is admitted
/// automatically when this job ends after terminal success; until then the
/// successor is owned here and is not workable.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub ty: JobType,
    pub packages: Vec<String>,
    pub status: Status,
    pub progress: f64,
    pub description: String,
    pub cancelable: bool,
    /// Transfer speed in bytes per second, as last reported by the backend.
    pub speed: u64,
    pub create_time: u64,
    /// Remaining automatic restarts from `Failed`.
    pub(crate) retry: u8,
    /// Queue this job belongs to.
    pub(crate) queue_name: &'static str,
    /// Successor started after this job ends with terminal success.
    pub(crate) next: Option<Box<Job>>,
}

impl Job {
    /// Creates a job in `Ready` status, bound to the named queue.
    pub fn new(
        name: impl Into<String>,
        packages: Vec<String>,
        ty: JobType,
        queue_name: &'static str,
    ) -> Self {
        Self {
            id: JobId::auto(),
            name: name.into(),
            ty,
            packages,
            status: Status::Ready,
            progress: 0.0,
            description: String::new(),
            cancelable: false,
            speed: 0,
            create_time: CREATE_TIME_COUNTER.fetch_add(1, Ordering::Relaxed),
            retry: DEFAULT_RETRY,
            queue_name,
            next: None,
        }
    }

    /// The package-list fingerprint used for duplicate detection.
    pub fn fingerprint(&self) -> String {
        self.packages.concat()
    }

    /// Returns the queue this job belongs to.
    pub fn queue_name(&self) -> &'static str {
        self.queue_name
    }

    /// Applies a backend progress report.
    ///
    /// Returns true if any observable field changed. A status carried by the
    /// report goes through the state machine; illegal transitions are logged
    /// and dropped, never applied.
    pub(crate) fn update_info(&mut self, info: JobProgressInfo) -> bool {
        let mut changed = false;

        let progress = info.progress.clamp(0.0, 1.0);
        if (self.progress - progress).abs() > f64::EPSILON {
            self.progress = progress;
            changed = true;
        }
        if self.description != info.description {
            self.description = info.description;
            changed = true;
        }
        if self.cancelable != info.cancelable {
            self.cancelable = info.cancelable;
            changed = true;
        }
        if self.speed != info.speed {
            self.speed = info.speed;
            changed = true;
        }

        if let Some(status) = info.status {
            if status != self.status {
                match super::state::transition(self, status) {
                    Ok(()) => changed = true,
                    Err(err) => {
                        warn!(
                            job_id = %self.id,
                            from = %self.status,
                            to = %status,
                            error = %err,
                            "dropping illegal status transition from backend"
                        );
                    }
                }
            }
        }

        changed
    }

    /// Takes an immutable snapshot for observers.
    pub fn snapshot(&self) -> JobView {
        JobView {
            id: self.id.clone(),
            name: self.name.clone(),
            ty: self.ty,
            packages: self.packages.clone(),
            status: self.status,
            progress: self.progress,
            description: self.description.clone(),
            cancelable: self.cancelable,
            speed: self.speed,
            create_time: self.create_time,
            queue: self.queue_name,
        }
    }
}

/// Read-only snapshot of a job, safe to hand across threads.
#[derive(Clone, Debug)]
pub struct JobView {
    pub id: JobId,
    pub name: String,
    pub ty: JobType,
    pub packages: Vec<String>,
    pub status: Status,
    pub progress: f64,
    pub description: String,
    pub cancelable: bool,
    pub speed: u64,
    pub create_time: u64,
    pub queue: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress_info(job: &Job, progress: f64) -> JobProgressInfo {
        JobProgressInfo {
            job_id: job.id.clone(),
            status: None,
            progress,
            description: "downloading".to_string(),
            cancelable: true,
            speed: 2048,
        }
    }

    #[test]
    fn test_job_id_auto_unique() {
        let a = JobId::auto();
        let b = JobId::auto();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("job-"));
    }

    #[test]
    fn test_job_id_display() {
        let id = JobId::new("install-42");
        assert_eq!(format!("{}", id), "install-42");
    }

    #[test]
    fn test_new_job_defaults() {
        let job = Job::new("vim", vec!["vim".to_string()], JobType::Download, "download");
        assert_eq!(job.status, Status::Ready);
        assert_eq!(job.progress, 0.0);
        assert_eq!(job.retry, DEFAULT_RETRY);
        assert!(job.next.is_none());
        assert_eq!(job.queue_name(), "download");
    }

    #[test]
    fn test_create_time_monotonic() {
        let a = Job::new("a", vec![], JobType::Download, "download");
        let b = Job::new("b", vec![], JobType::Download, "download");
        assert!(a.create_time < b.create_time);
    }

    #[test]
    fn test_fingerprint_concatenates_in_order() {
        let job = Job::new(
            "multi",
            vec!["a".to_string(), "b".to_string()],
            JobType::Download,
            "download",
        );
        assert_eq!(job.fingerprint(), "ab");
    }

    #[test]
    fn test_update_info_reports_changes() {
        let mut job = Job::new("vim", vec!["vim".to_string()], JobType::Download, "download");
        let info = progress_info(&job, 0.5);

        assert!(job.update_info(info.clone()));
        assert_eq!(job.progress, 0.5);
        assert_eq!(job.speed, 2048);
        assert!(job.cancelable);

        // Same values again: nothing changed.
        assert!(!job.update_info(info));
    }

    #[test]
    fn test_update_info_clamps_progress() {
        let mut job = Job::new("vim", vec![], JobType::Download, "download");
        let mut info = progress_info(&job, 1.7);
        info.description.clear();
        info.cancelable = false;
        info.speed = 0;
        assert!(job.update_info(info));
        assert_eq!(job.progress, 1.0);
    }

    #[test]
    fn test_update_info_applies_legal_status() {
        let mut job = Job::new("vim", vec![], JobType::Download, "download");
        job.status = Status::Running;

        let info = JobProgressInfo::status_only(job.id.clone(), Status::Succeed);
        assert!(job.update_info(info));
        assert_eq!(job.status, Status::Succeed);
    }

    #[test]
    fn test_update_info_drops_illegal_status() {
        let mut job = Job::new("vim", vec![], JobType::Download, "download");

        // Ready -> Succeed is not a legal transition.
        let info = JobProgressInfo::status_only(job.id.clone(), Status::Succeed);
        assert!(!job.update_info(info));
        assert_eq!(job.status, Status::Ready);
    }

    #[test]
    fn test_snapshot_copies_fields() {
        let job = Job::new("vim", vec!["vim".to_string()], JobType::Remove, "system change");
        let view = job.snapshot();
        assert_eq!(view.id, job.id);
        assert_eq!(view.ty, JobType::Remove);
        assert_eq!(view.queue, "system change");
        assert_eq!(view.create_time, job.create_time);
    }
}
