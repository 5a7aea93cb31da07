//! Error payloads and body serialization helpers.

use std::any::Any;
use std::error::Error;
use std::io::{self, Read, Write};

use sluice_core::{ErrorAdapter, JsonBody, JsonOptions};
use tracing::warn;

use crate::error::HandlerError;

/// Size of each chunk copied from a buffered body to the sink.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Builds error payloads and serializes structured bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseWriter {
    json: JsonOptions,
}

impl ResponseWriter {
    pub fn new(json: JsonOptions) -> Self {
        Self { json }
    }

    /// An error payload carrying `message`.
    pub fn error_adapter(message: impl Into<String>) -> ErrorAdapter {
        ErrorAdapter::new(message)
    }

    /// The payload for a handler that returned an error.
    pub fn handler_error(error: &HandlerError) -> ErrorAdapter {
        Self::error_adapter(format!(
            "Caught runtime exception: HandlerError - {error}"
        ))
    }

    /// The payload for a handler that panicked.
    pub fn panic_error(payload: &(dyn Any + Send)) -> ErrorAdapter {
        Self::error_adapter(format!(
            "Caught runtime exception: Panic - {}",
            panic_message(payload)
        ))
    }

    /// Serializes `body` as JSON.
    ///
    /// Serialization failures are logged and produce a fixed error object
    /// naming the type that failed.
    pub fn to_json(&self, body: &dyn JsonBody, type_name: &str) -> Vec<u8> {
        match body.to_json(self.json) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(r#type = type_name, error = %e, "Failed to serialize response body");
                format!(r#"{{"error":"JSON serialization error [{type_name}]"}}"#).into_bytes()
            }
        }
    }

    /// Copies `reader` into `out` in [`CHUNK_SIZE`] chunks, flushing after
    /// each one. Returns the number of bytes copied.
    pub fn copy_chunked<R, W>(reader: &mut R, out: &mut W) -> io::Result<u64>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let mut buf = [0u8; CHUNK_SIZE];
        let mut total = 0u64;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => return Ok(total),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            out.write_all(&buf[..n])?;
            out.flush()?;
            total += n as u64;
        }
    }
}

/// One entry per error in the `source()` chain, outermost first.
pub fn error_chain(error: &(dyn Error + 'static)) -> Vec<String> {
    let mut chain = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push(format!("caused by: {cause}"));
        source = cause.source();
    }
    chain
}

/// Extracts the message of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
