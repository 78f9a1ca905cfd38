//! A dry-run backend that simulates package operations.
//!
//! Useful for exercising the daemon without touching the host system: each
//! started job emits a stream of progress reports on a timer, then a
//! `Succeed`/`End` pair, mutating a purely in-memory installed set. Aborts
//! cancel the emitting task.

use super::error::SystemError;
use super::traits::System;
use super::types::{Architecture, Indicator, JobProgressInfo, JobType, Status};
use crate::jobs::JobId;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Progress reports emitted per simulated job.
const PROGRESS_STEPS: u32 = 10;

/// Pretend transfer speed reported while a job runs.
const SIM_SPEED: u64 = 256 * 1024;

/// In-memory simulation of an OS package tool.
///
/// Requires a tokio runtime: `start` spawns the emitting task.
pub struct SimBackend {
    step: Duration,
    installed: Arc<Mutex<HashSet<String>>>,
    upgradable: Arc<Mutex<Vec<String>>>,
    indicator: Arc<Mutex<Option<Indicator>>>,
    running: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
}

impl SimBackend {
    /// A backend whose jobs take roughly ten `step`s to complete.
    pub fn new(step: Duration) -> Arc<Self> {
        Arc::new(Self {
            step,
            installed: Arc::new(Mutex::new(HashSet::new())),
            upgradable: Arc::new(Mutex::new(Vec::new())),
            indicator: Arc::new(Mutex::new(None)),
            running: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Seeds the installed set.
    pub fn with_installed(self: Arc<Self>, packages: &[&str]) -> Arc<Self> {
        {
            let mut installed = lock(&self.installed);
            for package in packages {
                installed.insert(package.to_string());
            }
        }
        self
    }

    /// Seeds the upgradable list.
    pub fn with_upgradable(self: Arc<Self>, packages: &[&str]) -> Arc<Self> {
        {
            let mut upgradable = lock(&self.upgradable);
            for package in packages {
                upgradable.push(package.to_string());
            }
        }
        self
    }
}

impl System for SimBackend {
    fn architectures(&self) -> Vec<Architecture> {
        vec![Architecture::new("amd64")]
    }

    fn check_installed(&self, package_id: &str) -> bool {
        lock(&self.installed).contains(package_id)
    }

    fn start(
        &self,
        job_id: &JobId,
        job_type: JobType,
        packages: &[String],
    ) -> Result<(), SystemError> {
        let token = CancellationToken::new();
        lock(&self.running).insert(job_id.clone(), token.clone());

        debug!(job_id = %job_id, job_type = %job_type, "simulating job");

        let job_id = job_id.clone();
        let packages = packages.to_vec();
        let step = self.step;
        let indicator = Arc::clone(&self.indicator);
        let running = Arc::clone(&self.running);
        let installed = Arc::clone(&self.installed);
        let upgradable = Arc::clone(&self.upgradable);

        tokio::spawn(async move {
            for tick in 1..=PROGRESS_STEPS {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(job_id = %job_id, "simulated job aborted");
                        return;
                    }
                    _ = tokio::time::sleep(step) => {}
                }

                emit(
                    &indicator,
                    JobProgressInfo {
                        job_id: job_id.clone(),
                        status: None,
                        progress: f64::from(tick) / f64::from(PROGRESS_STEPS),
                        description: format!("processing {}", packages.join(", ")),
                        cancelable: true,
                        speed: SIM_SPEED,
                    },
                );
            }

            // The effect lands when the simulated work completes.
            {
                let mut installed = lock(&installed);
                match job_type {
                    JobType::Install => {
                        for package in &packages {
                            installed.insert(package.clone());
                        }
                    }
                    JobType::Remove => {
                        for package in &packages {
                            installed.remove(package);
                        }
                    }
                    JobType::DistUpgrade => lock(&upgradable).clear(),
                    _ => {}
                }
            }

            lock(&running).remove(&job_id);
            emit(
                &indicator,
                JobProgressInfo::status_only(job_id.clone(), Status::Succeed),
            );
            emit(
                &indicator,
                JobProgressInfo::status_only(job_id, Status::End),
            );
        });

        Ok(())
    }

    fn abort(&self, job_id: &JobId) -> Result<(), SystemError> {
        match lock(&self.running).remove(job_id) {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => Err(SystemError::NotFound),
        }
    }

    fn attach_indicator(&self, indicator: Indicator) {
        *lock(&self.indicator) = Some(indicator);
    }

    fn download_size(&self, packages: &[String]) -> u64 {
        packages.len() as u64 * 1024 * 1024
    }

    fn desktop_path(&self, package_id: &str) -> Option<PathBuf> {
        self.check_installed(package_id)
            .then(|| PathBuf::from(format!("/usr/share/applications/{}.desktop", package_id)))
    }

    fn upgradable_packages(&self) -> Vec<String> {
        lock(&self.upgradable).clone()
    }
}

fn emit(indicator: &Arc<Mutex<Option<Indicator>>>, info: JobProgressInfo) {
    let indicator = lock(indicator);
    if let Some(indicator) = indicator.as_ref() {
        indicator(info);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn collecting_indicator() -> (Indicator, mpsc::Receiver<JobProgressInfo>) {
        let (tx, rx) = mpsc::channel();
        let indicator: Indicator = Box::new(move |info| {
            let _ = tx.send(info);
        });
        (indicator, rx)
    }

    /// Drains the channel until `count` reports arrived or a generous
    /// deadline passed.
    async fn drain_reports(
        rx: &mpsc::Receiver<JobProgressInfo>,
        count: usize,
    ) -> Vec<JobProgressInfo> {
        let mut reports = Vec::new();
        for _ in 0..500 {
            reports.extend(rx.try_iter());
            if reports.len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        reports
    }

    #[tokio::test]
    async fn test_start_emits_progress_then_success() {
        let backend = SimBackend::new(Duration::from_millis(1));
        let (indicator, rx) = collecting_indicator();
        backend.attach_indicator(indicator);

        let id = JobId::new("sim-1");
        backend
            .start(&id, JobType::Install, &["vim".to_string()])
            .unwrap();

        let expected = PROGRESS_STEPS as usize + 2;
        let reports = drain_reports(&rx, expected).await;
        assert_eq!(reports.len(), expected);
        assert_eq!(reports[reports.len() - 2].status, Some(Status::Succeed));
        assert_eq!(reports[reports.len() - 1].status, Some(Status::End));
        assert!(backend.check_installed("vim"));
    }

    #[tokio::test]
    async fn test_abort_stops_reports() {
        let backend = SimBackend::new(Duration::from_millis(20));
        let (indicator, rx) = collecting_indicator();
        backend.attach_indicator(indicator);

        let id = JobId::new("sim-2");
        backend
            .start(&id, JobType::Download, &["vim".to_string()])
            .unwrap();
        backend.abort(&id).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let reports: Vec<JobProgressInfo> = rx.try_iter().collect();
        // No terminal pair after an abort.
        assert!(reports.iter().all(|info| info.status.is_none()));
    }

    #[tokio::test]
    async fn test_abort_unknown_job() {
        let backend = SimBackend::new(Duration::from_millis(1));
        assert!(matches!(
            backend.abort(&JobId::new("ghost")),
            Err(SystemError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_remove_effect() {
        let backend = SimBackend::new(Duration::from_millis(1)).with_installed(&["vim"]);
        let (indicator, rx) = collecting_indicator();
        backend.attach_indicator(indicator);

        backend
            .start(&JobId::new("sim-3"), JobType::Remove, &["vim".to_string()])
            .unwrap();
        let reports = drain_reports(&rx, PROGRESS_STEPS as usize + 2).await;
        assert_eq!(reports.last().and_then(|info| info.status), Some(Status::End));
        assert!(!backend.check_installed("vim"));
    }

    #[test]
    fn test_queries() {
        let backend = SimBackend::new(Duration::from_millis(1))
            .with_installed(&["vim"])
            .with_upgradable(&["firefox"]);

        assert_eq!(backend.architectures().len(), 1);
        assert_eq!(
            backend.download_size(&["a".to_string(), "b".to_string()]),
            2 * 1024 * 1024
        );
        assert!(backend.desktop_path("vim").is_some());
        assert!(backend.desktop_path("emacs").is_none());
        assert_eq!(backend.upgradable_packages(), vec!["firefox".to_string()]);
    }
}
