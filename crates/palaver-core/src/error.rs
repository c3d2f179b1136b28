// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Palaver messaging engine.

use thiserror::Error;

/// The primary error type used across all Palaver collaborator traits and
/// core operations.
#[derive(Debug, Error)]
pub enum PalaverError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Transport errors (session start failure, wire-level send failure).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A send was attempted while the connection's session is not open.
    ///
    /// Never retried by the send path itself; reconnection is the session
    /// supervisor's exclusive responsibility.
    #[error("connection {connection_id} is not connected")]
    NotConnected { connection_id: String },

    /// A referenced entity does not exist in storage.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A unique constraint rejected a write (e.g. concurrent contact creation).
    ///
    /// Callers resolve this by re-querying for the winning row.
    #[error("{entity} already exists: {detail}")]
    Conflict { entity: &'static str, detail: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PalaverError {
    /// Whether this error is a unique-constraint conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, PalaverError::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_render() {
        let e = PalaverError::NotConnected {
            connection_id: "conn-1".into(),
        };
        assert_eq!(e.to_string(), "connection conn-1 is not connected");

        let e = PalaverError::NotFound {
            entity: "message",
            id: "m-1".into(),
        };
        assert_eq!(e.to_string(), "message not found: m-1");
    }

    #[test]
    fn conflict_detection() {
        let conflict = PalaverError::Conflict {
            entity: "contact",
            detail: "address 5511999@c.net".into(),
        };
        assert!(conflict.is_conflict());
        assert!(!PalaverError::Internal("x".into()).is_conflict());
    }
}
