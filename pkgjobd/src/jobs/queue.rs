//! Ordered job queues with a concurrency cap.

use super::job::{Job, JobId};
use crate::system::{JobType, Status, SystemError};
use std::cmp::Ordering;
use tracing::debug;

/// Queue ordering: source updates first, then by creation order.
pub(crate) fn job_order(a: &Job, b: &Job) -> Ordering {
    match (
        a.ty == JobType::UpdateSource,
        b.ty == JobType::UpdateSource,
    ) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.create_time.cmp(&b.create_time),
    }
}

/// An ordered collection of jobs with a concurrency cap.
///
/// The cap bounds how many jobs may be `Running` at once; queued non-running
/// jobs are unbounded. The list is kept sorted (source updates first, then by
/// creation order), with [`JobQueue::raise`] overriding the natural position.
pub struct JobQueue {
    name: &'static str,
    cap: usize,
    jobs: Vec<Job>,
}

impl JobQueue {
    pub fn new(name: &'static str, cap: usize) -> Self {
        Self {
            name,
            cap,
            jobs: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// All jobs, in queue order.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Admits a job.
    ///
    /// Rejects with [`SystemError::Conflict`] if the queue already holds a
    /// job with the same type and package fingerprint. The cap is not checked
    /// here - it bounds concurrency, not queue size.
    pub fn add(&mut self, job: Job) -> Result<(), SystemError> {
        let fingerprint = job.fingerprint();
        if self
            .jobs
            .iter()
            .any(|existing| existing.ty == job.ty && existing.fingerprint() == fingerprint)
        {
            return Err(SystemError::Conflict {
                job_type: job.ty,
                packages: job.packages.clone(),
            });
        }

        self.jobs.push(job);
        self.jobs.sort_by(job_order);
        Ok(())
    }

    /// Removes and returns the job, so the caller can promote its successor.
    pub fn remove(&mut self, id: &JobId) -> Result<Job, SystemError> {
        let index = self
            .jobs
            .iter()
            .position(|job| &job.id == id)
            .ok_or(SystemError::NotFound)?;
        Ok(self.jobs.remove(index))
    }

    /// Swaps the job into position 0 so the next scheduling pass sees it
    /// first. Queue membership and running state are untouched.
    pub fn raise(&mut self, id: &JobId) -> Result<(), SystemError> {
        let index = self
            .jobs
            .iter()
            .position(|job| &job.id == id)
            .ok_or(SystemError::NotFound)?;
        self.jobs.swap(0, index);
        Ok(())
    }

    pub fn find(&self, id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| &job.id == id)
    }

    pub fn find_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|job| &job.id == id)
    }

    /// Jobs currently being executed by the backend.
    pub fn running_jobs(&self) -> Vec<&Job> {
        self.jobs
            .iter()
            .filter(|job| job.status == Status::Running)
            .collect()
    }

    /// Selects the jobs eligible to begin running now, honoring the cap.
    ///
    /// Candidates are every `Ready` job plus every `Failed` job that still
    /// has retry budget, gathered in queue order so a raised job is
    /// considered first. Candidacy consumes one unit of retry budget - the
    /// budget bounds attempts, not successes - so the decrement happens here
    /// even for candidates that do not make the cut this tick.
    ///
    /// The selection is returned in the global ordering (source updates
    /// first, then by creation).
    pub fn pending_ids(&mut self) -> Vec<JobId> {
        let running = self
            .jobs
            .iter()
            .filter(|job| job.status == Status::Running)
            .count();
        let space = self.cap.saturating_sub(running);

        let mut candidates: Vec<(bool, u64, JobId)> = Vec::new();
        for job in &mut self.jobs {
            match job.status {
                Status::Ready => {}
                Status::Failed if job.retry > 0 => job.retry -= 1,
                _ => continue,
            }
            candidates.push((
                job.ty != JobType::UpdateSource,
                job.create_time,
                job.id.clone(),
            ));
        }

        let n = space.min(candidates.len());
        if n < candidates.len() {
            let waiting: Vec<&JobId> = candidates[n..].iter().map(|(_, _, id)| id).collect();
            debug!(queue = self.name, waiting = ?waiting, "jobs waiting for a free slot");
        }

        candidates.truncate(n);
        candidates.sort_by_key(|entry| (entry.0, entry.1));
        candidates.into_iter().map(|(_, _, id)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn download_job(name: &str, packages: &[&str]) -> Job {
        Job::new(
            name,
            packages.iter().map(|p| p.to_string()).collect(),
            JobType::Download,
            "download",
        )
    }

    #[test]
    fn test_add_and_find() {
        let mut queue = JobQueue::new("download", 3);
        let job = download_job("vim", &["vim"]);
        let id = job.id.clone();

        queue.add(job).unwrap();
        assert_eq!(queue.len(), 1);
        assert!(queue.find(&id).is_some());
        assert!(queue.find(&JobId::new("missing")).is_none());
    }

    #[test]
    fn test_add_rejects_duplicate_type_and_packages() {
        let mut queue = JobQueue::new("download", 3);
        queue.add(download_job("vim", &["vim"])).unwrap();

        let err = queue.add(download_job("vim again", &["vim"]));
        assert!(matches!(err, Err(SystemError::Conflict { .. })));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_add_allows_same_packages_different_type() {
        let mut queue = JobQueue::new("system change", 1);
        queue
            .add(Job::new(
                "vim",
                vec!["vim".to_string()],
                JobType::Update,
                "system change",
            ))
            .unwrap();
        queue
            .add(Job::new(
                "vim",
                vec!["vim".to_string()],
                JobType::Remove,
                "system change",
            ))
            .unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_no_size_cap_at_admission() {
        let mut queue = JobQueue::new("download", 1);
        for i in 0..10 {
            queue
                .add(download_job(&format!("job{}", i), &[&format!("p{}", i)]))
                .unwrap();
        }
        assert_eq!(queue.len(), 10);
    }

    #[test]
    fn test_remove_returns_job() {
        let mut queue = JobQueue::new("download", 3);
        let job = download_job("vim", &["vim"]);
        let id = job.id.clone();
        queue.add(job).unwrap();

        let removed = queue.remove(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(queue.is_empty());
        assert!(matches!(queue.remove(&id), Err(SystemError::NotFound)));
    }

    #[test]
    fn test_ordering_update_source_first() {
        let mut queue = JobQueue::new("lock", 1);
        queue
            .add(Job::new("upgrade", vec![], JobType::DistUpgrade, "lock"))
            .unwrap();
        queue
            .add(Job::new("refresh", vec![], JobType::UpdateSource, "lock"))
            .unwrap();

        assert_eq!(queue.jobs()[0].ty, JobType::UpdateSource);
        assert_eq!(queue.jobs()[1].ty, JobType::DistUpgrade);
    }

    #[test]
    fn test_ordering_by_create_time() {
        let mut queue = JobQueue::new("download", 3);
        let first = download_job("first", &["a"]);
        let second = download_job("second", &["b"]);
        let first_id = first.id.clone();

        // Insert out of order; sort restores creation order.
        queue.add(second).unwrap();
        queue.add(first).unwrap();
        assert_eq!(queue.jobs()[0].id, first_id);
    }

    #[test]
    fn test_raise_moves_to_head() {
        let mut queue = JobQueue::new("download", 3);
        queue.add(download_job("a", &["a"])).unwrap();
        queue.add(download_job("b", &["b"])).unwrap();
        let c = download_job("c", &["c"]);
        let c_id = c.id.clone();
        queue.add(c).unwrap();

        queue.raise(&c_id).unwrap();
        assert_eq!(queue.jobs()[0].id, c_id);
        assert_eq!(queue.len(), 3);

        assert!(matches!(
            queue.raise(&JobId::new("missing")),
            Err(SystemError::NotFound)
        ));
    }

    #[test]
    fn test_pending_honors_cap() {
        let mut queue = JobQueue::new("download", 2);
        for i in 0..4 {
            queue
                .add(download_job(&format!("job{}", i), &[&format!("p{}", i)]))
                .unwrap();
        }

        let pending = queue.pending_ids();
        assert_eq!(pending.len(), 2);
        // Earliest created come first.
        assert_eq!(&pending[0], &queue.jobs()[0].id);
    }

    #[test]
    fn test_pending_counts_running_against_cap() {
        let mut queue = JobQueue::new("download", 2);
        let mut running = download_job("running", &["r"]);
        running.status = Status::Running;
        queue.add(running).unwrap();
        queue.add(download_job("ready", &["a"])).unwrap();
        queue.add(download_job("ready2", &["b"])).unwrap();

        assert_eq!(queue.pending_ids().len(), 1);
    }

    #[test]
    fn test_pending_skips_paused_and_terminal() {
        let mut queue = JobQueue::new("download", 3);
        for (name, status) in [
            ("paused", Status::Paused),
            ("succeed", Status::Succeed),
            ("end", Status::End),
        ] {
            let mut job = download_job(name, &[name]);
            job.status = status;
            queue.add(job).unwrap();
        }

        assert!(queue.pending_ids().is_empty());
    }

    #[test]
    fn test_pending_consumes_retry_budget() {
        let mut queue = JobQueue::new("download", 3);
        let mut failed = download_job("flaky", &["flaky"]);
        failed.status = Status::Failed;
        failed.retry = 2;
        let id = failed.id.clone();
        queue.add(failed).unwrap();

        // Two candidate selections consume the budget...
        assert_eq!(queue.pending_ids(), vec![id.clone()]);
        assert_eq!(queue.pending_ids(), vec![id.clone()]);

        // ...after which the job is no longer selected.
        assert!(queue.pending_ids().is_empty());
        assert_eq!(queue.find(&id).map(|job| job.retry), Some(0));
    }

    #[test]
    fn test_pending_decrements_retry_even_beyond_cap() {
        let mut queue = JobQueue::new("download", 1);
        queue.add(download_job("ready", &["a"])).unwrap();
        let mut failed = download_job("flaky", &["flaky"]);
        failed.status = Status::Failed;
        failed.retry = 1;
        let failed_id = failed.id.clone();
        queue.add(failed).unwrap();

        // Only one slot: the earlier Ready job wins, but candidacy still
        // consumed the failed job's budget.
        let pending = queue.pending_ids();
        assert_eq!(pending.len(), 1);
        assert_ne!(pending[0], failed_id);
        assert_eq!(queue.find(&failed_id).map(|job| job.retry), Some(0));
    }
}
