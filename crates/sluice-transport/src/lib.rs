//! # Sluice Transport
//!
//! HTTP plumbing between a socket and the Sluice pipeline.
//!
//! ## Features
//!
//! - `http-server`: axum-based HTTP server ([`serve`])
//!
//! Without `http-server` the crate still provides the [`Dispatcher`], which
//! can be driven by any server able to produce a [`RawRequest`] and consume a
//! [`ChannelResponse`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  axum server        │  (feature: http-server)
//! ├─────────────────────┤
//! │  Dispatcher         │  route lookup, blocking redispatch, body parsing
//! ├─────────────────────┤
//! │  sluice-framework   │  pipeline, handlers, interceptors
//! └─────────────────────┘
//! ```
//!
//! ## Execution contexts
//!
//! Requests whose route is not blocking and that carry no body run inline
//! on the async runtime. Everything else is moved once, before the handler
//! runs, to Tokio's blocking pool, where the sink waits for channel capacity
//! instead of failing.

pub mod body;
pub mod defaults;
pub mod dispatch;
pub mod error;
#[cfg(feature = "http-server")]
pub mod server;
pub mod sink;

pub use body::{BodyParser, is_json};
pub use defaults::respond_unmatched;
pub use dispatch::{Dispatcher, RawRequest};
pub use error::{TransportError, TransportResult};
#[cfg(feature = "http-server")]
pub use server::{ServerHandle, serve};
pub use sink::{ChannelBody, ChannelResponse, ChannelSink, FRAME_BUFFER, SendMode};
