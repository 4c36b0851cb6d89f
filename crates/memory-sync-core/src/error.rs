use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

/// A single record could not be built from its raw fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid `{field}`: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// One conversation could not be scanned; only its records are lost.
    #[error("conversation processing failed: {0}")]
    Processing(String),

    /// A single remote call failed.
    #[error("remote request failed: {0}")]
    Transport(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Nothing downstream can run.
    #[error("{0}")]
    Fatal(String),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors that abort a whole run rather than a single item.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Fatal(_) | Self::Config(_) | Self::Io { .. } | Self::Json(_)
        )
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{SyncError, ValidationError};

    #[test]
    fn validation_error_names_the_field() {
        let error = ValidationError::new("created_at", "expected a number");
        assert_eq!(error.to_string(), "invalid `created_at`: expected a number");
    }

    #[test]
    fn only_run_level_errors_are_fatal() {
        assert!(SyncError::Fatal("bad export".to_string()).is_fatal());
        assert!(SyncError::Config("missing url".to_string()).is_fatal());
        assert!(!SyncError::Transport("503".to_string()).is_fatal());
        assert!(!SyncError::Processing("mapping".to_string()).is_fatal());
        assert!(!SyncError::from(ValidationError::new("content", "empty")).is_fatal());
    }
}
