//! Error types for share-button-study

use studykit_host::HostError;
use thiserror::Error;

/// Error type for study operations
#[derive(Debug, Error)]
pub enum StudyError {
    /// Invalid study configuration (weights, unknown treatment names)
    #[error("Config error: {0}")]
    Config(String),

    /// An expected ping sequence was not found in the log
    #[error("Not found: {0}")]
    NotFound(String),

    /// The host could not service a call (closed surface, missing element)
    #[error("Host unavailable: {0}")]
    HostUnavailable(String),

    /// Persisted state or the ping log could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StudyError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Whether the host was merely unreachable. These are recovered locally.
    pub fn is_host_unavailable(&self) -> bool {
        matches!(self, Self::HostUnavailable(_))
    }
}

impl From<HostError> for StudyError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Storage(msg) => Self::Storage(msg),
            HostError::Io(e) => Self::Storage(e.to_string()),
            other => Self::HostUnavailable(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StudyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for study operations
pub type Result<T> = std::result::Result<T, StudyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StudyError::config("variation not valid");
        assert_eq!(err.to_string(), "Config error: variation not valid");
    }

    #[test]
    fn test_host_storage_maps_to_storage() {
        let err: StudyError = HostError::storage("prefs locked").into();
        assert!(matches!(err, StudyError::Storage(ref m) if m == "prefs locked"));

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StudyError = HostError::from(io).into();
        assert!(matches!(err, StudyError::Storage(_)));
    }

    #[test]
    fn test_other_host_errors_map_to_unavailable() {
        let err: StudyError = HostError::unavailable("surface-3 is closed").into();
        assert!(err.is_host_unavailable());

        let err: StudyError = HostError::telemetry("offline").into();
        assert!(err.is_host_unavailable());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: StudyError = io_err.into();
        assert!(matches!(err, StudyError::Io(_)));
    }
}
