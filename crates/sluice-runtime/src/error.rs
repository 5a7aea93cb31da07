//! Runtime error types.

use std::io;

use sluice_framework::{HandlerError, RegistryError};
use sluice_transport::TransportError;
use thiserror::Error;

use crate::boot::BootError;
use crate::config::ConfigError;

/// Errors that abort booting or running an application.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Boot(#[from] BootError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A route's handler factory failed.
    #[error("Failed to create handler for {route}: {source}")]
    HandlerInit {
        route: String,
        #[source]
        source: HandlerError,
    },

    /// A second instance of the same handler type was registered.
    #[error("Handler [{0}] is already registered")]
    DuplicateHandler(&'static str),

    /// Registration was attempted after the application started booting.
    #[error("Cannot register {0} after the application has started")]
    Sealed(&'static str),

    /// Listening for shutdown signals failed.
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[source] io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
