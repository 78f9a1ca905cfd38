//! The scheduling heartbeat.
//!
//! One dispatch tick, all under the manager mutex:
//!
//! 1. **Reap** - remove every `End` job; a reaped job carrying a successor
//!    hands it over for admission and start (the only promotion site, which
//!    is how an install moves from its download stage to its install stage).
//! 2. **Schedule** - start eligible jobs per queue, honoring caps and the
//!    lock-queue exclusion.
//! 3. **Notify** - fire the coalesced change callback at most once.

use super::{JobManager, ManagerState, DISPATCH_ORDER, LOCK_QUEUE};
use crate::jobs::{transition, JobId};
use crate::system::Status;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default heartbeat period. A policy knob, not a correctness parameter.
pub const DEFAULT_DISPATCH_INTERVAL: Duration = Duration::from_millis(500);

impl JobManager {
    /// One pass of the scheduling heartbeat.
    ///
    /// Exposed so callers (and tests) can drive ticks deterministically;
    /// [`JobManager::run`] calls this periodically.
    pub fn dispatch(&self) {
        let should_notify = {
            let mut state = self.lock_state();
            self.reap_ended_jobs(&mut state);
            self.schedule_pending_jobs(&mut state);
            state.take_changed()
        };

        // The callback runs outside the mutex so observers may re-read the
        // job list without deadlocking.
        if should_notify {
            (self.notify)();
        }
    }

    /// Runs the dispatch heartbeat until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = interval.as_millis() as u64, "job dispatcher started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("job dispatcher stopped");
                    break;
                }

                _ = ticker.tick() => {
                    self.dispatch();
                }
            }
        }
    }

    fn reap_ended_jobs(&self, state: &mut ManagerState) {
        let ended: Vec<(&'static str, JobId)> = DISPATCH_ORDER
            .iter()
            .filter_map(|name| state.queue(name))
            .flat_map(|queue| {
                queue
                    .jobs()
                    .iter()
                    .filter(|job| job.status == Status::End)
                    .map(|job| (job.queue_name(), job.id.clone()))
            })
            .collect();

        for (queue_name, id) in ended {
            let job = match state.remove_job(queue_name, &id) {
                Ok(job) => job,
                Err(err) => {
                    warn!(job_id = %id, error = %err, "failed to reap job");
                    continue;
                }
            };
            debug!(job_id = %id, job_type = %job.ty, "reaped finished job");

            if let Some(next) = job.next {
                let next = *next;
                let next_id = next.id.clone();
                info!(job_id = %next_id, job_type = %next.ty, "promoting successor job");
                if let Err(err) = state.add_job(next) {
                    warn!(job_id = %next_id, error = %err, "failed to admit successor job");
                    continue;
                }
                if let Err(err) = state.mark_start(&next_id) {
                    warn!(job_id = %next_id, error = %err, "failed to start successor job");
                }
            }
        }
    }

    fn schedule_pending_jobs(&self, state: &mut ManagerState) {
        for queue_name in DISPATCH_ORDER {
            // The lock queue excludes every other queue while it has work
            // running. It is scheduled first, so its own jobs take the slot
            // within the same tick.
            if queue_name != LOCK_QUEUE && state.lock_queue_busy() {
                continue;
            }

            let pending = match state.queue_mut(queue_name) {
                Some(queue) => queue.pending_ids(),
                None => continue,
            };

            for id in pending {
                let retrying = state
                    .find(&id)
                    .map(|job| job.status == Status::Failed)
                    .unwrap_or(false);
                if retrying {
                    info!(job_id = %id, "retrying failed job");
                    if let Err(err) = state.mark_start(&id) {
                        warn!(job_id = %id, error = %err, "failed to restart job");
                        continue;
                    }
                }
                self.start_backend_job(state, &id);
            }
        }
    }

    /// Hands a job to the backend: `Running` on accepted start, `Failed` on
    /// immediate refusal. Later failures arrive through the indicator.
    fn start_backend_job(&self, state: &mut ManagerState, id: &JobId) {
        let Some((ty, packages)) = state
            .find(id)
            .map(|job| (job.ty, job.packages.clone()))
        else {
            return;
        };

        {
            let Some(job) = state.find_mut(id) else { return };
            if let Err(err) = transition(job, Status::Running) {
                warn!(job_id = %id, error = %err, "job not startable");
                return;
            }
        }
        state.set_changed();
        debug!(job_id = %id, job_type = %ty, "starting job on backend");

        if let Err(err) = self.backend.start(id, ty, &packages) {
            error!(job_id = %id, error = %err, "backend failed to start job");
            if let Some(job) = state.find_mut(id) {
                if let Err(err) = transition(job, Status::Failed) {
                    warn!(job_id = %id, error = %err, "could not mark job failed");
                }
            }
        }
    }
}
