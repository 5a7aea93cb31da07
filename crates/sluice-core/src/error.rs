//! Error types for the Sluice core.

use thiserror::Error;

/// Errors raised while filling or serializing adapters.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Reading a buffered body source failed.
    #[error("buffered body I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An adapter could not be serialized into its structured form.
    #[error("JSON serialization error [{type_name}]: {source}")]
    Serialization {
        /// Type name of the adapter that failed to serialize.
        type_name: &'static str,
        /// Underlying serializer error.
        #[source]
        source: serde_json::Error,
    },
}

impl CoreError {
    /// Creates a serialization error for the given adapter type.
    pub fn serialization(type_name: &'static str, source: serde_json::Error) -> Self {
        Self::Serialization { type_name, source }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
