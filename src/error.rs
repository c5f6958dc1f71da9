//! Error types for replaykit

use thiserror::Error;

/// Result type for replaykit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for replaykit
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed recorded input (empty candidate list, blank descriptor,
    /// wrong container shape)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No locator candidate matched any live element
    #[error("Element not found: {0}")]
    NotFound(String),

    /// Transport-level failure while executing a request
    #[error("Network error: {context}")]
    Network {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failure raised by a locator or storage backend
    #[error("Backend error: {0}")]
    Backend(String),
}

impl Error {
    /// Create an invalid-input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a network error with context only
    pub fn network(context: impl Into<String>) -> Self {
        Self::Network {
            context: context.into(),
            source: None,
        }
    }

    /// Create a network error wrapping its transport cause
    pub fn network_caused_by(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Check if this failure points at a defective recording rather than a
    /// runtime flake. Defects are not worth retrying.
    pub fn is_recording_defect(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }
}

// Recorded specs are JSON documents; a document that does not parse is a
// defective recording, not a runtime failure.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidInput(err.to_string())
    }
}
