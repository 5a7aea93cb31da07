//! Channel-backed response sink.
//!
//! The pipeline runs synchronously, either inline on the async runtime or on
//! a blocking worker. [`ChannelSink`] bridges it to the async server: the
//! head travels over a oneshot channel, body chunks and the completion over
//! a bounded mpsc channel consumed as a [`ChannelBody`] stream.
//!
//! A non-blocking sink never waits for the reader. Once the bounded channel
//! fills up, later frames go through an unbounded spill queue that a runtime
//! task forwards in order, so backpressure is deferred rather than surfaced
//! as an error.

use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use sluice_framework::{Completion, ResponseHead, ResponseSink};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::error::{TransportError, TransportResult};

/// Number of frames buffered between the pipeline and the connection.
pub const FRAME_BUFFER: usize = 32;

/// How the sink hands frames to the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// Waits for channel capacity. Only valid off the async runtime.
    Blocking,
    /// Never waits. Spills into a forwarded queue when the channel is full.
    /// Only valid on the async runtime.
    NonBlocking,
}

enum Frame {
    Data(Bytes),
    End(Completion),
}

/// The pipeline side of a response channel.
pub struct ChannelSink {
    head: Option<oneshot::Sender<ResponseHead>>,
    frames: mpsc::Sender<Frame>,
    spill: Option<mpsc::UnboundedSender<Frame>>,
    mode: SendMode,
}

impl ChannelSink {
    /// Creates a sink and the response it feeds.
    pub fn channel(mode: SendMode) -> (Self, ChannelResponse) {
        let (head_tx, head_rx) = oneshot::channel();
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_BUFFER);
        let sink = Self {
            head: Some(head_tx),
            frames: frame_tx,
            spill: None,
            mode,
        };
        let response = ChannelResponse {
            head: head_rx,
            body: ChannelBody { frames: frame_rx },
        };
        (sink, response)
    }

    pub fn mode(&self) -> SendMode {
        self.mode
    }

    /// Returns `true` once frames are routed through the spill queue.
    pub fn is_spilling(&self) -> bool {
        self.spill.is_some()
    }

    fn send(&mut self, frame: Frame) -> Result<(), Frame> {
        if let Some(spill) = &self.spill {
            return spill.send(frame).map_err(|e| e.0);
        }

        match self.mode {
            SendMode::Blocking => self.frames.blocking_send(frame).map_err(|e| e.0),
            SendMode::NonBlocking => match self.frames.try_send(frame) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Closed(frame)) => Err(frame),
                Err(mpsc::error::TrySendError::Full(frame)) => match self.start_spill() {
                    Some(spill) => spill.send(frame).map_err(|e| e.0),
                    None => Err(frame),
                },
            },
        }
    }

    fn start_spill(&mut self) -> Option<&mpsc::UnboundedSender<Frame>> {
        let runtime = Handle::try_current().ok()?;
        let (spill_tx, mut spill_rx) = mpsc::unbounded_channel();
        let frames = self.frames.clone();

        trace!("Response channel full, spilling frames");
        runtime.spawn(async move {
            while let Some(frame) = spill_rx.recv().await {
                // Unsent frames are dropped, which aborts a pending completion.
                if frames.send(frame).await.is_err() {
                    break;
                }
            }
        });

        self.spill = Some(spill_tx);
        self.spill.as_ref()
    }

    fn send_error(&self) -> io::Error {
        if self.frames.is_closed() {
            io::Error::new(io::ErrorKind::BrokenPipe, "client went away")
        } else {
            io::Error::new(io::ErrorKind::WouldBlock, "response channel is full")
        }
    }
}

impl Write for ChannelSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.head.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "body written before the response head",
            ));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        self.send(Frame::Data(Bytes::copy_from_slice(buf)))
            .map_err(|_| self.send_error())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResponseSink for ChannelSink {
    fn send_head(&mut self, head: ResponseHead) -> io::Result<()> {
        let sender = self.head.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "response head already sent")
        })?;
        sender
            .send(head)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
    }

    fn head_sent(&self) -> bool {
        self.head.is_none()
    }

    fn finish(mut self: Box<Self>, completion: Completion) {
        if let Err(frame) = self.send(Frame::End(completion)) {
            let error = self.send_error();
            if let Frame::End(completion) = frame {
                completion.complete(Err(error));
            }
        }
    }
}

/// The server side of a response channel.
pub struct ChannelResponse {
    head: oneshot::Receiver<ResponseHead>,
    body: ChannelBody,
}

impl ChannelResponse {
    /// Waits for the head and returns it with the body stream.
    pub async fn into_parts(self) -> TransportResult<(ResponseHead, ChannelBody)> {
        let head = self.head.await.map_err(|_| TransportError::HeadDropped)?;
        Ok((head, self.body))
    }
}

/// Body chunks of a response.
///
/// Ends once the pipeline finished the sink, at which point the completion
/// is run with success. Dropping the stream early reports the response as
/// aborted.
pub struct ChannelBody {
    frames: mpsc::Receiver<Frame>,
}

impl ChannelBody {
    /// Collects the remaining body into one buffer.
    pub async fn to_bytes(mut self) -> Bytes {
        let mut out = Vec::new();
        while let Some(frame) = self.frames.recv().await {
            match frame {
                Frame::Data(bytes) => out.extend_from_slice(&bytes),
                Frame::End(completion) => {
                    completion.complete(Ok(()));
                    break;
                }
            }
        }
        Bytes::from(out)
    }
}

impl Stream for ChannelBody {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.frames.poll_recv(cx) {
            Poll::Ready(Some(Frame::Data(bytes))) => Poll::Ready(Some(Ok(bytes))),
            Poll::Ready(Some(Frame::End(completion))) => {
                trace!("Response body complete");
                completion.complete(Ok(()));
                Poll::Ready(None)
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
