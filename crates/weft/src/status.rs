// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `weft status` command implementation.
//!
//! Opens the configured database and reports pending-group and message
//! counts. If `--json` is passed, outputs structured JSON for scripting.

use serde::Serialize;

use weft_config::model::WeftConfig;
use weft_core::types::HealthStatus;
use weft_core::{SegmentStore, WeftError};
use weft_storage::SqliteStore;

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub database_path: String,
    pub healthy: bool,
    pub pending_groups: u64,
    pub messages: u64,
}

/// Run the `weft status` command.
pub async fn run_status(config: &WeftConfig, json: bool) -> Result<(), WeftError> {
    let store = SqliteStore::new(config.storage.clone());
    store.initialize().await?;

    let healthy = matches!(store.health_check().await?, HealthStatus::Healthy);
    let pending_groups = store.pending_group_count().await?;
    let messages = store.message_count().await?;
    store.close().await?;

    let report = StatusReport {
        database_path: config.storage.database_path.clone(),
        healthy,
        pending_groups,
        messages,
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        println!("database:       {}", report.database_path);
        println!("healthy:        {}", report.healthy);
        println!("pending groups: {}", report.pending_groups);
        println!("messages:       {}", report.messages);
    }

    Ok(())
}
