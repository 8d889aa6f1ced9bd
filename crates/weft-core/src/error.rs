//! Error types and result aliases for the Weft gateways.
//!
//! Every cloud-facing operation in this crate reports through [`Error`].
//! Variants carry enough context to tell a transient service fault from a
//! configuration problem, because the retry harness and the control plane
//! treat those very differently.

use std::fmt;

/// The result type used throughout weft-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in gateway and configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The application configuration is invalid or incomplete.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of what is wrong with the configuration.
        message: String,
    },

    /// A queue operation failed.
    #[error("queue error: {message}")]
    Queue {
        /// Description of the queue failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An object store operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A function invocation could not be issued.
    #[error("invocation error: {message}")]
    Invocation {
        /// Description of the invocation failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The requested object was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new queue error with the given message.
    #[must_use]
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new queue error with a source cause.
    #[must_use]
    pub fn queue_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Queue {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new invocation error with the given message.
    #[must_use]
    pub fn invocation(message: impl Into<String>) -> Self {
        Self::Invocation {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new invocation error with a source cause.
    #[must_use]
    pub fn invocation_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Invocation {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new serialization error.
    #[must_use]
    pub fn serialization(message: impl fmt::Display) -> Self {
        Self::Serialization {
            message: message.to_string(),
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error is a definitive not-found.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn configuration_error_display() {
        let err = Error::configuration("minInterval out of range");
        assert!(err.to_string().contains("configuration error"));
        assert!(err.to_string().contains("minInterval"));
    }

    #[test]
    fn queue_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::TimedOut, "request timed out");
        let err = Error::queue_with_source("send failed", source);
        assert!(err.to_string().contains("queue error"));
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn not_found_is_definitive() {
        let err = Error::NotFound("deploys/app/1/confirm.txt".into());
        assert!(err.is_not_found());
        assert!(!Error::storage("listing failed").is_not_found());
    }
}
