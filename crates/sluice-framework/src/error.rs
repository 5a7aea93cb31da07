//! Error types for the Sluice framework.

use http::Method;
use thiserror::Error;

/// Error returned by handlers. Anything implementing `std::error::Error` can
/// be propagated with `?`.
pub type HandlerError = tower::BoxError;

/// Programming errors raised while a request is being processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Required parameters were declared after they had been checked.
    #[error("required parameters cannot be declared after they have been inspected")]
    ParametersInspected,
}

/// Errors raised while building the route and handler registries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A second route was registered for the same method and path.
    #[error("duplicate route: {method} {path}")]
    DuplicateRoute {
        /// The route method.
        method: Method,
        /// The conflicting path template.
        path: String,
    },

    /// A path template could not be parsed.
    #[error("invalid path template '{path}': {reason}")]
    InvalidPath {
        /// The offending template.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A chained handler names a target that was never registered.
    #[error("chain target '{0}' is not a registered handler")]
    UnknownHandler(&'static str),
}

impl RegistryError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason,
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
