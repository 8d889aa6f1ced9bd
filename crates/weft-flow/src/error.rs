//! Error types for the control plane.

/// The result type used throughout weft-flow.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in control-plane operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The resource map could not be loaded.
    ///
    /// Fatal: nothing else in an invocation is safe to attempt without
    /// the map, and a failing coordinator chain terminates here.
    #[error("resource map unavailable: {message}")]
    ResourceMapUnavailable {
        /// Description of the load failure.
        message: String,
    },

    /// A message-consuming worker was invoked with no input available.
    #[error("no input message available after long poll")]
    NoInputMessage,

    /// A routed result named a component that cannot receive it.
    #[error("invalid routing destination: {target}")]
    InvalidDestination {
        /// The routing target that could not be resolved.
        target: String,
    },

    /// A routed dispatch failed.
    #[error("routing dispatch failed: {message}")]
    RoutingFailed {
        /// Description of the dispatch failure.
        message: String,
    },

    /// The coordinator could not chain its successor invocation.
    #[error("chain invocation failed: {message}")]
    ChainFailed {
        /// Description of the chain failure.
        message: String,
    },

    /// No confirmation artifact appeared before the polling deadline.
    #[error("deployment not confirmed after {waited_secs} s")]
    ConfirmationTimeout {
        /// How long the controller polled before giving up.
        waited_secs: u64,
    },

    /// An error from a weft-core gateway.
    #[error("core error: {0}")]
    Core(#[from] weft_core::Error),
}

impl Error {
    /// Creates a new resource-map-unavailable error.
    #[must_use]
    pub fn resource_map_unavailable(message: impl std::fmt::Display) -> Self {
        Self::ResourceMapUnavailable {
            message: message.to_string(),
        }
    }

    /// Creates a new routing-failed error.
    #[must_use]
    pub fn routing_failed(message: impl std::fmt::Display) -> Self {
        Self::RoutingFailed {
            message: message.to_string(),
        }
    }

    /// Creates a new chain-failed error.
    #[must_use]
    pub fn chain_failed(message: impl std::fmt::Display) -> Self {
        Self::ChainFailed {
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_destination_display() {
        let err = Error::InvalidDestination {
            target: "ghost".into(),
        };
        assert!(err.to_string().contains("invalid routing destination"));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn core_errors_convert() {
        let err: Error = weft_core::Error::queue("send failed").into();
        assert!(err.to_string().contains("queue error"));
    }

    #[test]
    fn no_input_message_display() {
        assert!(Error::NoInputMessage.to_string().contains("no input message"));
    }
}
