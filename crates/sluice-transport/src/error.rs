//! Transport error types.

use std::io;

use thiserror::Error;

/// Errors raised by the HTTP transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The pipeline dropped the response without sending a head.
    #[error("response was dropped before its head was sent")]
    HeadDropped,

    /// Other I/O failures.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
