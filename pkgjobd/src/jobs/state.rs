//! The job status state machine.
//!
//! [`transition`] is the only legal mutator of `Job::status`. Everything
//! else - queue scheduling, progress ingestion, client verbs - routes status
//! changes through it so the transition table is enforced in one place.

use super::job::Job;
use crate::system::{Status, SystemError};

/// Returns whether `from -> to` is a legal status transition.
///
/// The table:
///
/// ```text
/// Ready   -> Running | Paused | End
/// Running -> Succeed | Failed | Paused | End
/// Failed  -> Ready | End
/// Paused  -> Ready | End
/// Succeed -> End
/// End     -> (terminal)
/// ```
pub fn valid_transition(from: Status, to: Status) -> bool {
    use Status::*;
    matches!(
        (from, to),
        (Ready, Running | Paused | End)
            | (Running, Succeed | Failed | Paused | End)
            | (Failed, Ready | End)
            | (Paused, Ready | End)
            | (Succeed, End)
    )
}

/// Moves `job` to `target`, applying on-entry effects.
///
/// Illegal transitions leave the job untouched and return
/// [`SystemError::NotSupported`]. On-entry effects:
///
/// - entering `Ready` resets progress and speed for the fresh attempt;
/// - entering `End` from any status other than `Succeed` abandons the
///   chained successor - chaining is only meaningful after terminal success.
pub fn transition(job: &mut Job, target: Status) -> Result<(), SystemError> {
    if !valid_transition(job.status, target) {
        return Err(SystemError::NotSupported);
    }

    match target {
        Status::Ready => {
            job.progress = 0.0;
            job.speed = 0;
        }
        Status::End => {
            if job.status != Status::Succeed {
                job.next = None;
            }
        }
        _ => {}
    }

    job.status = target;
    Ok(())
}
