//! Shared vocabulary between the job engine and the package backend.

use crate::jobs::JobId;
use std::fmt;

/// Kind of work a job performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobType {
    /// Refresh the package source indexes.
    UpdateSource,
    /// Update a single installed package.
    Update,
    /// Install a package (download stage plus system-change stage).
    Install,
    /// Download package archives without installing them.
    Download,
    /// Remove an installed package.
    Remove,
    /// Upgrade the whole distribution.
    DistUpgrade,
}

impl JobType {
    /// Stable wire/log name of the job type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpdateSource => "update_source",
            Self::Update => "update",
            Self::Install => "install",
            Self::Download => "download",
            Self::Remove => "remove",
            Self::DistUpgrade => "dist_upgrade",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a job.
///
/// Transitions between states are validated by [`crate::jobs::valid_transition`];
/// `End` is terminal and marks the job for reaping on the next dispatch tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    /// Admitted to a queue, eligible to start.
    #[default]
    Ready,

    /// The backend is executing the job.
    Running,

    /// The last attempt failed; may be retried while the retry budget lasts.
    Failed,

    /// Suspended by the client; restartable.
    Paused,

    /// Completed successfully; chaining to a successor is still possible.
    Succeed,

    /// Terminal. The dispatcher removes the job on its next tick.
    End,
}

impl Status {
    /// Returns true if this is the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }

    /// Returns true while the backend is executing the job.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Paused => "paused",
            Self::Succeed => "succeed",
            Self::End => "end",
        };
        write!(f, "{}", name)
    }
}

/// CPU architecture reported by the package tool.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Architecture(String);

impl Architecture {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A progress report delivered by the backend through the indicator.
#[derive(Clone, Debug)]
pub struct JobProgressInfo {
    /// The job this report belongs to.
    pub job_id: JobId,
    /// New lifecycle status, when the backend reports one.
    pub status: Option<Status>,
    /// Completion fraction in `[0, 1]`.
    pub progress: f64,
    /// Human-readable description of the current step.
    pub description: String,
    /// Whether the backend accepts a mid-execution abort right now.
    pub cancelable: bool,
    /// Transfer speed in bytes per second.
    pub speed: u64,
}

impl JobProgressInfo {
    /// A report carrying only a status change.
    pub fn status_only(job_id: JobId, status: Status) -> Self {
        Self {
            job_id,
            status: Some(status),
            progress: 0.0,
            description: String::new(),
            cancelable: false,
            speed: 0,
        }
    }
}

/// Progress callback registered by the job manager on the backend.
///
/// Backends may invoke the indicator from any thread.
pub type Indicator = Box<dyn Fn(JobProgressInfo) + Send + Sync>;
