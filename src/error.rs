//! # Error Types
//!
//! This module defines the error type shared by the transport, the image
//! pipeline and the job orchestrator.
//!
//! Every variant maps to a short machine-readable kind via
//! [`ThermalError::kind`], so a calling layer can report
//! `(kind, message)` pairs without matching on the enum.

use thiserror::Error;

/// Main error type for thermalink operations
#[derive(Debug, Error)]
pub enum ThermalError {
    /// The printer could not be reached, refused us, or the link dropped.
    ///
    /// Covers unreachable hosts, unpaired Bluetooth devices, missing
    /// permissions, connect timeouts, writes after `close()` and write
    /// failures reported by the background sender.
    #[error("Connection error ({target}): {cause}")]
    Connection { target: String, cause: String },

    /// Input bytes are not a recognized image container
    #[error("Decode error: {0}")]
    Decode(String),

    /// Bit-packing invariant violated (dimensions out of protocol range)
    #[error("Encode error: {0}")]
    Encode(String),

    /// Invalid settings value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ThermalError {
    /// Build a connection error for `target` from any displayable cause.
    pub fn connection(target: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Connection {
            target: target.into(),
            cause: cause.to_string(),
        }
    }

    /// Short, stable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Decode(_) => "decode",
            Self::Encode(_) => "encode",
            Self::InvalidConfig(_) => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, ThermalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_message_names_target() {
        let err = ThermalError::connection("10.0.0.5:9100", "connection refused");
        assert_eq!(
            err.to_string(),
            "Connection error (10.0.0.5:9100): connection refused"
        );
        assert_eq!(err.kind(), "connection");
    }

    #[test]
    fn test_io_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ThermalError = io.into();
        assert_eq!(err.kind(), "io");
    }
}
