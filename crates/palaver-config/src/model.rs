// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Palaver messaging engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Palaver configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PalaverConfig {
    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Session supervisor settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Inbound engine settings.
    #[serde(default)]
    pub engine: EngineConfig,
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
    "palaver.db".to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Session supervisor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Maximum consecutive reconnection attempts before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Base reconnection delay in milliseconds (doubles per attempt).
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    /// Cap on the reconnection delay in milliseconds.
    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,

    /// How long a pairing-code wait blocks before timing out, in milliseconds.
    #[serde(default = "default_pairing_wait_ms")]
    pub pairing_wait_ms: u64,

    /// How long a `connecting` attempt holds the per-connection start lock
    /// before a new `start` may re-initiate, in milliseconds.
    #[serde(default = "default_start_lock_ms")]
    pub start_lock_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_cap_ms: default_reconnect_cap_ms(),
            pairing_wait_ms: default_pairing_wait_ms(),
            start_lock_ms: default_start_lock_ms(),
        }
    }
}

fn default_max_reconnect_attempts() -> u32 {
    3
}

fn default_reconnect_base_ms() -> u64 {
    5_000
}

fn default_reconnect_cap_ms() -> u64 {
    30_000
}

fn default_pairing_wait_ms() -> u64 {
    60_000
}

fn default_start_lock_ms() -> u64 {
    60_000
}

/// Inbound engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Capacity of each per-connection event queue.
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

fn default_event_queue_capacity() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_backoff() {
        let config = PalaverConfig::default();
        assert_eq!(config.session.max_reconnect_attempts, 3);
        assert_eq!(config.session.reconnect_base_ms, 5_000);
        assert_eq!(config.session.reconnect_cap_ms, 30_000);
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = PalaverConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: PalaverConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.storage.database_path, config.storage.database_path);
        assert_eq!(
            parsed.engine.event_queue_capacity,
            config.engine.event_queue_capacity
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<PalaverConfig, _> = toml::from_str(
            r#"
            [session]
            max_reconnect_attempts = 5
            max_reconect_attempts = 5
            "#,
        );
        assert!(result.is_err());
    }
}
