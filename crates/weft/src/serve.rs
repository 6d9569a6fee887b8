// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `weft serve` command implementation.
//!
//! Opens the SQLite store, builds the reassembly engine, and runs the
//! periodic sweep plus a one-shot startup reconciliation until a shutdown
//! signal arrives. Segment sources embed the engine as a library; the
//! daemon's job is to keep re-evaluating and cleaning the shared database.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use weft_config::model::WeftConfig;
use weft_core::{SegmentStore, WeftError};
use weft_engine::{ReassemblyEngine, SweepRunner};
use weft_storage::SqliteStore;

use crate::shutdown;

/// Runs the `weft serve` command.
pub async fn run_serve(config: WeftConfig) -> Result<(), WeftError> {
    init_tracing(&config.service.log_level);

    info!(name = config.service.name.as_str(), "starting weft serve");

    // Initialize storage.
    let store = Arc::new(SqliteStore::new(config.storage.clone()));
    store.initialize().await?;
    let store: Arc<dyn SegmentStore> = store;
    info!(path = config.storage.database_path.as_str(), "store initialized");

    let engine = Arc::new(ReassemblyEngine::new(store.clone()));

    // Install signal handler.
    let cancel = shutdown::install_signal_handler();

    if config.sweep.enabled {
        let runner = Arc::new(SweepRunner::new(
            engine.clone(),
            config.reassembly.clone(),
            config.sweep.clone(),
        ));

        // One-shot reconciliation: groups whose final segment arrived just
        // as a previous process died are merged without waiting for the
        // recheck window.
        {
            let runner = runner.clone();
            let cancel = cancel.clone();
            let delay = Duration::from_secs(config.sweep.reconcile_delay_secs);
            tokio::spawn(async move {
                runner.reconcile_after(delay, cancel).await;
            });
        }

        // Periodic sweep task.
        {
            let runner = runner.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                runner.run(cancel).await;
            });
        }

        info!(
            interval_secs = config.sweep.interval_secs,
            recheck_after_secs = config.reassembly.recheck_after_secs,
            purge_after_secs = config.reassembly.purge_after_secs,
            "sweep task started"
        );
    } else {
        info!("sweep disabled by configuration");
    }

    // Block until shutdown is requested.
    cancel.cancelled().await;

    store.close().await?;
    info!("weft serve shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber with the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("weft={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
