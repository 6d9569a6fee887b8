// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as window ordering and non-empty paths.

use crate::diagnostic::ConfigError;
use crate::model::WeftConfig;

const KNOWN_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &WeftConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.service.name.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "service.name must not be empty".to_string(),
        });
    }

    if !KNOWN_LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "service.log_level `{}` is not one of: {}",
                config.service.log_level,
                KNOWN_LOG_LEVELS.join(", ")
            ),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    // A purge window at or below the recheck window would delete groups
    // the sweep has not yet retried.
    if config.reassembly.purge_after_secs <= config.reassembly.recheck_after_secs {
        errors.push(ConfigError::Validation {
            message: format!(
                "reassembly.purge_after_secs ({}) must be greater than reassembly.recheck_after_secs ({})",
                config.reassembly.purge_after_secs, config.reassembly.recheck_after_secs
            ),
        });
    }

    if config.reassembly.recheck_after_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "reassembly.recheck_after_secs must be at least 1".to_string(),
        });
    }

    if config.sweep.enabled && config.sweep.interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "sweep.interval_secs must be at least 1 when the sweep is enabled"
                .to_string(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
