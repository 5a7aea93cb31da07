//! Adapter contract for pooled response payloads.
//!
//! An [`Adapter`] is the mutable object a handler fills in to describe its
//! response. Adapters are allocated from an [`AdapterPool`](crate::AdapterPool)
//! at the start of a request and cleared before they are returned to it, so
//! [`Adapter::clear`] must restore a state observably identical to a freshly
//! constructed value.
//!
//! # Categories
//!
//! Rendering dispatches on the [`Content`] an adapter exposes, which is an
//! exhaustive enum rather than a chain of runtime type checks:
//!
//! - [`Content::Structured`]: serialized to JSON (the default category)
//! - [`Content::Text`]: a string body sent as-is
//! - [`Content::Buffered`]: a byte stream copied to the output sink in chunks
//!
//! # Example
//!
//! ```rust
//! use serde::Serialize;
//! use sluice_core::impl_structured_adapter;
//!
//! #[derive(Debug, Default, Serialize)]
//! struct UserResponse {
//!     id: u64,
//!     name: String,
//! }
//!
//! impl_structured_adapter!(UserResponse);
//! ```

use std::any::Any;
use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::error::CoreResult;

// ============================================================================
// Adapter Trait
// ============================================================================

/// A poolable response payload.
pub trait Adapter: Any + Send {
    /// Resets the adapter to the state of a freshly constructed value.
    fn clear(&mut self);

    /// Exposes the adapter's body, tagged with its rendering category.
    fn content(&mut self) -> Content<'_>;

    /// Returns the type name used in diagnostics.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the error view of this adapter, if it carries one.
    ///
    /// Only error-shaped adapters may stand in for a response whose request
    /// was invalidated.
    fn as_error(&self) -> Option<&ErrorAdapter> {
        None
    }
}

impl fmt::Debug for dyn Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("type", &self.type_name())
            .finish_non_exhaustive()
    }
}

/// The rendering category of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Serialized to JSON.
    Structured,
    /// Plain text body.
    Text,
    /// Streamed byte body; requires a blocking handler.
    Buffered,
}

/// Borrowed view of an adapter body.
pub enum Content<'a> {
    /// Serializable fields.
    Structured(&'a dyn JsonBody),
    /// A string body set directly by the handler.
    Text(&'a str),
    /// A byte stream to copy to the transport.
    Buffered(&'a mut BufferedBody),
}

impl Content<'_> {
    /// Returns the category of this content.
    pub fn category(&self) -> Category {
        match self {
            Self::Structured(_) => Category::Structured,
            Self::Text(_) => Category::Text,
            Self::Buffered(_) => Category::Buffered,
        }
    }
}

// ============================================================================
// Structured serialization
// ============================================================================

/// Options for structured serialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonOptions {
    /// Pretty-print the output.
    pub indent: bool,
    /// Keep object fields whose value is `null`.
    pub include_nulls: bool,
}

/// Object-safe JSON serialization, implemented for every `Serialize` type.
pub trait JsonBody {
    /// Serializes `self` into JSON bytes.
    fn to_json(&self, options: JsonOptions) -> serde_json::Result<Vec<u8>>;
}

impl<T: Serialize + ?Sized> JsonBody for T {
    fn to_json(&self, options: JsonOptions) -> serde_json::Result<Vec<u8>> {
        if options.include_nulls {
            return if options.indent {
                serde_json::to_vec_pretty(self)
            } else {
                serde_json::to_vec(self)
            };
        }

        let mut value = serde_json::to_value(self)?;
        strip_nulls(&mut value);
        if options.indent {
            serde_json::to_vec_pretty(&value)
        } else {
            serde_json::to_vec(&value)
        }
    }
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// Implements [`Adapter`] for `Serialize + Default` types rendered as JSON.
///
/// `clear` resets the value to `Default::default()`.
#[macro_export]
macro_rules! impl_structured_adapter {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::adapter::Adapter for $ty {
                fn clear(&mut self) {
                    *self = <$ty as ::core::default::Default>::default();
                }

                fn content(&mut self) -> $crate::adapter::Content<'_> {
                    $crate::adapter::Content::Structured(&*self)
                }
            }
        )+
    };
}

// ============================================================================
// Built-in adapters
// ============================================================================

/// Error payload rendered for invalidated requests.
///
/// Serializes as `{"message": "...", "stackTrace": [...]}`; the stack trace
/// is omitted unless it was attached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorAdapter {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack_trace: Option<Vec<String>>,
}

impl ErrorAdapter {
    /// Creates an error adapter with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack_trace: None,
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Replaces the error message.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    /// Returns the attached stack trace, if any.
    pub fn stack_trace(&self) -> Option<&[String]> {
        self.stack_trace.as_deref()
    }

    /// Attaches a stack trace.
    pub fn set_stack_trace(&mut self, trace: Vec<String>) {
        self.stack_trace = Some(trace);
    }

    /// Builder variant of [`set_stack_trace`](Self::set_stack_trace).
    pub fn with_stack_trace(mut self, trace: Vec<String>) -> Self {
        self.stack_trace = Some(trace);
        self
    }
}

impl Adapter for ErrorAdapter {
    fn clear(&mut self) {
        self.message.clear();
        self.stack_trace = None;
    }

    fn content(&mut self) -> Content<'_> {
        Content::Structured(&*self)
    }

    fn as_error(&self) -> Option<&ErrorAdapter> {
        Some(self)
    }
}

/// Plain-text response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextAdapter {
    body: String,
}

impl TextAdapter {
    /// Creates a text adapter with an initial body.
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    /// Returns the current body.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Replaces the body.
    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    /// Appends to the body.
    pub fn push_str(&mut self, s: &str) {
        self.body.push_str(s);
    }
}

impl Adapter for TextAdapter {
    fn clear(&mut self) {
        self.body.clear();
    }

    fn content(&mut self) -> Content<'_> {
        Content::Text(&self.body)
    }
}

/// Adapter with no body at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmptyAdapter;

impl Adapter for EmptyAdapter {
    fn clear(&mut self) {}

    fn content(&mut self) -> Content<'_> {
        Content::Text("")
    }
}

/// A byte source plus its length, consumed when the response is streamed.
#[derive(Default)]
pub struct BufferedBody {
    reader: Option<Box<dyn Read + Send>>,
    length: Option<u64>,
}

impl BufferedBody {
    /// Takes the reader out of the body, leaving it empty.
    pub fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.reader.take()
    }

    /// Returns the declared length, if known.
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Returns `true` if a reader is attached.
    pub fn is_set(&self) -> bool {
        self.reader.is_some()
    }
}

impl fmt::Debug for BufferedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedBody")
            .field("is_set", &self.is_set())
            .field("length", &self.length)
            .finish()
    }
}

/// Streamed response body, copied to the transport in fixed-size chunks.
///
/// Routes using this adapter must be marked blocking.
#[derive(Debug, Default)]
pub struct BufferedAdapter {
    body: BufferedBody,
}

impl BufferedAdapter {
    /// Streams the given bytes.
    pub fn set_bytes(&mut self, bytes: impl Into<Vec<u8>>) {
        let bytes = bytes.into();
        self.body.length = Some(bytes.len() as u64);
        self.body.reader = Some(Box::new(Cursor::new(bytes)));
    }

    /// Streams the contents of a file.
    pub fn set_file(&mut self, path: impl AsRef<Path>) -> CoreResult<()> {
        let file = File::open(path)?;
        self.body.length = Some(file.metadata()?.len());
        self.body.reader = Some(Box::new(file));
        Ok(())
    }

    /// Streams from an arbitrary reader.
    pub fn set_reader(&mut self, reader: impl Read + Send + 'static, length: Option<u64>) {
        self.body.reader = Some(Box::new(reader));
        self.body.length = length;
    }

    /// Returns the attached body.
    pub fn body(&self) -> &BufferedBody {
        &self.body
    }
}

impl Adapter for BufferedAdapter {
    fn clear(&mut self) {
        self.body = BufferedBody::default();
    }

    fn content(&mut self) -> Content<'_> {
        Content::Buffered(&mut self.body)
    }
}
