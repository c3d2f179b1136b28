// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-empty paths and sane backoff bounds.

use crate::ConfigError;
use crate::model::PalaverConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &PalaverConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.session.reconnect_base_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "session.reconnect_base_ms must be positive".to_string(),
        });
    }

    if config.session.reconnect_cap_ms < config.session.reconnect_base_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "session.reconnect_cap_ms ({}) must be at least reconnect_base_ms ({})",
                config.session.reconnect_cap_ms, config.session.reconnect_base_ms
            ),
        });
    }

    if config.session.pairing_wait_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "session.pairing_wait_ms must be positive".to_string(),
        });
    }

    if config.session.start_lock_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "session.start_lock_ms must be positive".to_string(),
        });
    }

    if config.engine.event_queue_capacity == 0 {
        errors.push(ConfigError::Validation {
            message: "engine.event_queue_capacity must be positive".to_string(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&PalaverConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_is_rejected() {
        let mut config = PalaverConfig::default();
        config.storage.database_path = "  ".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("database_path"));
    }

    #[test]
    fn cap_below_base_is_rejected() {
        let mut config = PalaverConfig::default();
        config.session.reconnect_base_ms = 10_000;
        config.session.reconnect_cap_ms = 5_000;
        let errors = validate_config(&config).unwrap_err();
        assert!(
            errors
                .iter()
                .any(|e| e.to_string().contains("reconnect_cap_ms"))
        );
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = PalaverConfig::default();
        config.storage.database_path = String::new();
        config.session.reconnect_base_ms = 0;
        config.engine.event_queue_capacity = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.len() >= 3);
    }
}
