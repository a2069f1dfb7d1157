//! Freshsync Daemon - Background rule scheduling service
//!
//! This binary runs as a system service and hosts:
//! - The event-driven rule scheduler (one loop per process)
//! - The worker notification broadcast channel
//! - The service facade and dispatcher, ready for a transport layer to
//!   mount on top
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon opens the SQLite store, spawns the scheduler loop, and parks
//! on the signal handlers. Everything is wired through the ports defined in
//! `freshsync-core`; the transport layer (out of scope here) would hold the
//! [`RuleService`], [`CatalogService`], and [`JobDispatcher`] handles this
//! binary constructs.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use freshsync_core::config::Config;
use freshsync_core::ports::SystemClock;
use freshsync_dispatch::JobDispatcher;
use freshsync_scheduler::{BroadcastJobNotifier, RuleScheduler};
use freshsync_service::{CatalogService, RuleService};
use freshsync_store::{DatabasePool, SqliteStateRepository};

// ============================================================================
// DaemonService
// ============================================================================

/// Main daemon service wiring the scheduler, store, and facades together
struct DaemonService {
    /// Application configuration loaded from YAML
    config: Config,
    /// Token for signalling graceful shutdown to all async tasks
    shutdown: CancellationToken,
}

impl DaemonService {
    fn new(shutdown: CancellationToken) -> Self {
        let config_path = Config::default_path();
        let config = Config::load_or_default(&config_path);
        info!(config_path = %config_path.display(), "Loaded configuration");

        Self { config, shutdown }
    }

    /// Opens the store, spawns the scheduler, and waits for shutdown
    async fn run(&self) -> Result<()> {
        // Open database
        let db_pool = DatabasePool::new(&self.config.database.path)
            .await
            .context("Failed to open database")?;
        let repo = Arc::new(SqliteStateRepository::new(db_pool.pool().clone()));

        // Worker notification fan-out; transport connections subscribe here
        let notifier = Arc::new(BroadcastJobNotifier::default());
        let clock = Arc::new(SystemClock);

        // The scheduler loop and its producer handle
        let (scheduler, handle) = RuleScheduler::new(
            repo.clone(),
            notifier.clone(),
            clock.clone(),
            self.config.scheduler.clone(),
        );
        let sink = Arc::new(handle);

        // Facades for the transport layer
        let _rules = RuleService::new(repo.clone(), sink.clone());
        let _catalog = CatalogService::new(repo.clone(), sink.clone());
        let _dispatcher = JobDispatcher::new(
            repo.clone(),
            notifier.clone(),
            sink.clone(),
            clock,
            &self.config.dispatch,
        );

        let scheduler_task = tokio::spawn(scheduler.run(self.shutdown.clone()));

        info!("Freshsync daemon running");
        self.shutdown.cancelled().await;

        info!("Shutdown requested, stopping scheduler");
        scheduler_task
            .await
            .context("Scheduler task panicked during shutdown")?;

        Ok(())
    }
}

// ============================================================================
// Signal handling
// ============================================================================

/// Installs SIGTERM/SIGINT handlers that trip the shutdown token
fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }
        shutdown.cancel();
    });
}

// ============================================================================
// Entry point
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting freshsyncd"
    );

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    let daemon = DaemonService::new(shutdown.clone());
    if let Err(err) = daemon.run().await {
        error!(error = %format!("{err:#}"), "Daemon terminated with error");
        std::process::exit(1);
    }

    info!("freshsyncd stopped");
}
