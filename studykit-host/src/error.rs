//! Error types for host capability calls

use thiserror::Error;

/// Errors a host capability can report back to a study
#[derive(Error, Debug)]
pub enum HostError {
    /// The capability could not be reached (closed surface, missing element, torn-down window)
    #[error("Host unavailable: {0}")]
    Unavailable(String),

    /// Durable preference storage failed to read or write
    #[error("Storage error: {0}")]
    Storage(String),

    /// Telemetry delivery failed
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// Create an unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a telemetry error
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }

    /// Whether this error came from durable storage (including file IO)
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io(_))
    }
}

/// Result type alias for host capability calls
pub type Result<T> = std::result::Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HostError::Unavailable("window 3 closed".to_string());
        assert_eq!(err.to_string(), "Host unavailable: window 3 closed");

        let err = HostError::Storage("prefs.js locked".to_string());
        assert_eq!(err.to_string(), "Storage error: prefs.js locked");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let host_err: HostError = io_err.into();

        assert!(matches!(host_err, HostError::Io(_)));
        assert!(host_err.is_storage());
        assert!(host_err.to_string().contains("file not found"));
    }

    #[test]
    fn test_helper_constructors() {
        assert!(matches!(
            HostError::unavailable("x"),
            HostError::Unavailable(_)
        ));
        assert!(HostError::storage("x").is_storage());
        assert!(!HostError::telemetry("x").is_storage());
    }
}
