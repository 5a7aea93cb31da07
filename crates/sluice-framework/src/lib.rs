//! # Sluice Framework
//!
//! The request pipeline of the Sluice REST framework.
//!
//! This crate turns a matched request into a response:
//! - [`RouteRegistry`]: explicit route and handler registration
//! - [`RequestContext`]: the request and response facets of one exchange
//! - [`InterceptorChain`]: priority-ordered request, response and ending
//!   interceptors
//! - [`Handler`] and [`ChainLink`]: single and two-stage handlers
//! - [`Pipeline`]: runs the handler, classifies the outcome, renders the
//!   adapter and writes it into a transport-provided [`ResponseSink`]
//!
//! Transports live in `sluice-transport`; this crate only sees the
//! [`IncomingRequest`] and [`ResponseSink`] boundary types.

pub mod chained;
pub mod context;
pub mod error;
pub mod handler;
pub mod interceptor;
pub mod pipeline;
pub mod processor;
pub mod render;
pub mod request;
pub mod response;
pub mod route;
pub mod settings;
pub mod sink;
pub mod writer;

pub use chained::{ChainLink, Chained};
pub use context::RequestContext;
pub use error::{HandlerError, RegistryError, RegistryResult, RequestError};
pub use handler::{Disposition, Handler, HandlerFn, HandlerResult, Outcome, handler_fn};
pub use interceptor::{Interceptor, InterceptorChain, Phase};
pub use pipeline::Pipeline;
pub use processor::{AdapterStatus, HandlerProcessor, RequestStatus, ResponseState};
pub use render::{RenderedBody, Renderer};
pub use request::{HttpRequest, IncomingRequest, RequestBody, RequestState};
pub use response::{Cookie, HttpResponse, SendOutcome};
pub use route::{BoxedRoute, PathTemplate, Route, RouteMatch, RouteMeta, RouteRegistry, RouteService};
pub use settings::{DeploymentMode, PipelineSettings};
pub use sink::{Completion, MemoryHandle, MemoryRecord, MemorySink, ResponseHead, ResponseSink};
pub use writer::{CHUNK_SIZE, ResponseWriter};
