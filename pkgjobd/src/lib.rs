//! pkgjobd - a package-management job daemon.
//!
//! Clients submit jobs (install, remove, download, update, dist-upgrade,
//! source refresh) and observe their progress while the daemon schedules
//! them over an OS package tool that cannot run mutating operations in
//! parallel. Downloads proceed concurrently; system changes are serialized;
//! a distinguished lock queue excludes everything else while it runs.
//!
//! # High-Level API
//!
//! The [`manager::Manager`] facade is the surface a transport binds to:
//!
//! ```ignore
//! use pkgjobd::config::ConfigFile;
//! use pkgjobd::manager::{Manager, DEFAULT_DISPATCH_INTERVAL};
//! use pkgjobd::system::SimBackend;
//!
//! let backend = SimBackend::new(std::time::Duration::from_millis(200));
//! let manager = Manager::new(backend, ConfigFile::default(), config_path, notify);
//!
//! // Drive the scheduler in the background.
//! let jobs = std::sync::Arc::clone(manager.job_manager());
//! tokio::spawn(jobs.run(shutdown, DEFAULT_DISPATCH_INTERVAL));
//!
//! let job = manager.install_package("vim")?;
//! ```

pub mod config;
pub mod jobs;
pub mod logging;
pub mod manager;
pub mod system;

/// Crate version, surfaced by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
