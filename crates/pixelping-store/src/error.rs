//! Error types for pixelping-store

use thiserror::Error;

/// Errors that can occur while persisting log entries
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error during a partition write
    #[error("I/O error: {0}")]
    Io(String),

    /// Error serializing a partition
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only fs");
        let err: StoreError = io_err.into();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(err.to_string().contains("read-only fs"));
    }

    #[test]
    fn test_serialization_error_display() {
        let err = StoreError::Serialization("unexpected token".to_string());
        assert!(err.to_string().contains("Serialization error"));
    }
}
