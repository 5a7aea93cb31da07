//! Output side of the transport boundary.
//!
//! The pipeline writes a [`ResponseHead`] followed by body bytes into a
//! [`ResponseSink`], then hands the sink a [`Completion`] that the transport
//! must invoke exactly once, after the response has been flushed to the peer
//! or has failed to be.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Declared body length, when known up front.
    pub content_length: Option<u64>,
}

impl ResponseHead {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            content_length: None,
        }
    }
}

/// Callback run once the transport knows whether the response was sent.
///
/// Runs exactly once: a completion dropped without being invoked reports a
/// `ConnectionAborted` error.
pub struct Completion(Option<Box<dyn FnOnce(io::Result<()>) + Send>>);

impl Completion {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(io::Result<()>) + Send + 'static,
    {
        Self(Some(Box::new(f)))
    }

    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn complete(mut self, result: io::Result<()>) {
        if let Some(f) = self.0.take() {
            f(result);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f(Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "response dropped before delivery",
            )));
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("pending", &self.0.is_some())
            .finish()
    }
}

/// A chunked output channel to the client.
pub trait ResponseSink: Write + Send {
    /// Sends the status line and headers. Must precede any body bytes.
    fn send_head(&mut self, head: ResponseHead) -> io::Result<()>;

    /// Returns `true` once the head has been sent.
    fn head_sent(&self) -> bool;

    /// Ends the response. `completion` runs once delivery succeeded or
    /// failed.
    fn finish(self: Box<Self>, completion: Completion);
}

/// Everything a [`MemorySink`] observed.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecord {
    pub head: Option<ResponseHead>,
    pub chunks: Vec<Vec<u8>>,
    pub flushes: usize,
    pub finished: bool,
}

/// An in-memory sink that records what it is sent.
///
/// The paired [`MemoryHandle`] stays readable after the sink has been
/// consumed by the pipeline.
#[derive(Debug)]
pub struct MemorySink {
    record: Arc<Mutex<MemoryRecord>>,
    failure: Option<io::ErrorKind>,
}

impl MemorySink {
    pub fn new() -> (Self, MemoryHandle) {
        let record = Arc::new(Mutex::new(MemoryRecord::default()));
        let sink = Self {
            record: Arc::clone(&record),
            failure: None,
        };
        (sink, MemoryHandle(record))
    }

    /// A sink whose delivery fails with `kind` when finished.
    pub fn failing(kind: io::ErrorKind) -> (Self, MemoryHandle) {
        let (mut sink, handle) = Self::new();
        sink.failure = Some(kind);
        (sink, handle)
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.record.lock().chunks.push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.record.lock().flushes += 1;
        Ok(())
    }
}

impl ResponseSink for MemorySink {
    fn send_head(&mut self, head: ResponseHead) -> io::Result<()> {
        self.record.lock().head = Some(head);
        Ok(())
    }

    fn head_sent(&self) -> bool {
        self.record.lock().head.is_some()
    }

    fn finish(self: Box<Self>, completion: Completion) {
        self.record.lock().finished = true;
        let result = match self.failure {
            Some(kind) => Err(io::Error::new(kind, "memory sink delivery failed")),
            None => Ok(()),
        };
        completion.complete(result);
    }
}

/// Read access to what a [`MemorySink`] recorded.
#[derive(Debug, Clone)]
pub struct MemoryHandle(Arc<Mutex<MemoryRecord>>);

impl MemoryHandle {
    pub fn record(&self) -> MemoryRecord {
        self.0.lock().clone()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.0.lock().head.as_ref().map(|head| head.status)
    }

    pub fn header(&self, name: &str) -> Option<String> {
        let record = self.0.lock();
        let value = record.head.as_ref()?.headers.get(name)?;
        value.to_str().ok().map(str::to_string)
    }

    pub fn body(&self) -> Vec<u8> {
        self.0.lock().chunks.concat()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body()).into_owned()
    }

    pub fn chunk_count(&self) -> usize {
        self.0.lock().chunks.len()
    }

    pub fn flushes(&self) -> usize {
        self.0.lock().flushes
    }

    pub fn finished(&self) -> bool {
        self.0.lock().finished
    }
}
