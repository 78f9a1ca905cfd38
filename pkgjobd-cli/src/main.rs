//! pkgjobd CLI - runs the daemon and manages configuration.
//!
//! The daemon here runs against the simulated dry-run backend; binding a
//! real package tool happens in the packaging of the host distribution.

use clap::{Parser, Subcommand};
use pkgjobd::config::{config_file_path, ConfigFile};
use pkgjobd::logging;
use pkgjobd::manager::Manager;
use pkgjobd::system::SimBackend;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "pkgjobd")]
#[command(version = pkgjobd::VERSION)]
#[command(about = "Package management job daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the job daemon with the simulated dry-run backend.
    Daemon {
        /// Dispatch interval in milliseconds (overrides the config file).
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Submit a few demonstration jobs at startup.
        #[arg(long)]
        demo: bool,
    },
    /// Show or set the app store region.
    Region {
        /// New region value; prints the current region when omitted.
        value: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon { interval_ms, demo } => run_daemon(interval_ms, demo).await,
        Commands::Region { value } => region_command(value),
    }
}

async fn run_daemon(interval_ms: Option<u64>, demo: bool) -> ExitCode {
    let guard = match logging::init_logging(&logging::default_log_dir(), logging::default_log_file())
    {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("failed to initialize logging: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let config = match ConfigFile::load() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let interval = interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.dispatch_interval());

    let backend = SimBackend::new(Duration::from_millis(200)).with_upgradable(&["firefox"]);
    let manager = Arc::new(Manager::new(
        backend,
        config,
        config_file_path(),
        Box::new(|| info!("job list changed")),
    ));

    let shutdown = CancellationToken::new();
    let dispatcher = tokio::spawn(
        Arc::clone(manager.job_manager()).run(shutdown.clone(), interval),
    );

    info!(
        version = pkgjobd::VERSION,
        interval_ms = interval.as_millis() as u64,
        "pkgjobd started"
    );

    if demo {
        submit_demo_jobs(&manager);
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to wait for shutdown signal");
    }
    info!("shutting down");
    shutdown.cancel();
    let _ = dispatcher.await;
    drop(guard);

    ExitCode::SUCCESS
}

fn submit_demo_jobs(manager: &Manager) {
    for result in [
        manager.install_package("vim"),
        manager.download_package("emacs"),
        manager.update_source(),
    ] {
        match result {
            Ok(view) => info!(job_id = %view.id, job_type = %view.ty, "demo job submitted"),
            Err(err) => error!(error = %err, "demo job rejected"),
        }
    }
}

fn region_command(value: Option<String>) -> ExitCode {
    let path = config_file_path();
    let mut config = match ConfigFile::load_from(&path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match value {
        None => {
            match &config.appstore.region {
                Some(region) => println!("{}", region),
                None => println!("(default)"),
            }
            ExitCode::SUCCESS
        }
        Some(region) => {
            config.appstore.region = Some(region);
            if let Err(err) = config.save_to(&path) {
                eprintln!("failed to save configuration: {}", err);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
    }
}
