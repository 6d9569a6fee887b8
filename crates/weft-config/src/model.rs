// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Weft reassembly service.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Weft configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WeftConfig {
    /// Service identity and logging settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Reassembly window settings.
    #[serde(default)]
    pub reassembly: ReassemblyConfig,

    /// Background sweep settings.
    #[serde(default)]
    pub sweep: SweepConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name of the service instance.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "weft".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Whether to enable WAL journal mode.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    "weft.db".to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Reassembly window configuration.
///
/// `recheck_after_secs` is how old a group's oldest segment must be before
/// the sweep retries its merge; `purge_after_secs` is how old it must be
/// before a still-incomplete group is deleted. The purge window must be
/// strictly longer than the recheck window.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReassemblyConfig {
    /// Age before an unmerged group becomes a sweep candidate (default 10 min).
    #[serde(default = "default_recheck_after_secs")]
    pub recheck_after_secs: u64,

    /// Age before a still-incomplete group is purged (default 30 min).
    #[serde(default = "default_purge_after_secs")]
    pub purge_after_secs: u64,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            recheck_after_secs: default_recheck_after_secs(),
            purge_after_secs: default_purge_after_secs(),
        }
    }
}

fn default_recheck_after_secs() -> u64 {
    600
}

fn default_purge_after_secs() -> u64 {
    1800
}

/// Background sweep configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    /// Whether the periodic sweep task runs at all.
    #[serde(default = "default_sweep_enabled")]
    pub enabled: bool,

    /// Interval between sweep passes in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,

    /// Pause after a failed sweep pass before the next attempt.
    #[serde(default = "default_failure_backoff_secs")]
    pub failure_backoff_secs: u64,

    /// Delay before the one-shot post-import reconciliation pass.
    #[serde(default = "default_reconcile_delay_secs")]
    pub reconcile_delay_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweep_enabled(),
            interval_secs: default_sweep_interval_secs(),
            failure_backoff_secs: default_failure_backoff_secs(),
            reconcile_delay_secs: default_reconcile_delay_secs(),
        }
    }
}

fn default_sweep_enabled() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_failure_backoff_secs() -> u64 {
    5
}

fn default_reconcile_delay_secs() -> u64 {
    15
}
