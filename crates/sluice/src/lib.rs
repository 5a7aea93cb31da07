//! # Sluice
//!
//! A REST request pipeline that pools response adapters, checks declared
//! parameters and runs interceptors around every handler.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐     ┌────────────┐     ┌──────────────────────────────────────┐
//! │  Server   │────▶│ Dispatcher │────▶│ Pipeline                             │
//! │  (axum)   │     │  (routes)  │     │  request interceptors                │
//! └───────────┘     └────────────┘     │  parameter checks ─▶ handler         │
//!       ▲                              │  response interceptors ─▶ render     │
//!       │          ResponseSink        │  ending interceptors                 │
//!       └──────────────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! - **Runtime**: loads configuration, runs bootables, builds routes, serves
//! - **Dispatcher**: matches a route and picks the execution context
//! - **Pipeline**: one request from interceptors through rendering
//! - **Adapters**: pooled per route, filled by handlers, rendered to the wire
//! - **Handlers**: synchronous functions over a request context and an adapter
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sluice::prelude::*;
//!
//! struct Hello;
//!
//! impl Handler for Hello {
//!     type Adapter = TextAdapter;
//!
//!     fn handle(&self, ctx: &mut RequestContext, adapter: &mut TextAdapter) -> HandlerResult {
//!         let name = ctx.request().params().get("name").unwrap_or("world");
//!         adapter.set_body(format!("Hello, {name}"));
//!         Ok(Outcome::ok())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut runtime = SluiceRuntime::new()?;
//!     runtime.route(RouteMeta::get("/hello/{name}"), Hello)?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `http-server`: serve over HTTP with axum (default)
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use sluice_core as core;
pub use sluice_framework as framework;
pub use sluice_runtime as runtime;
pub use sluice_transport as transport;

pub use sluice_core::impl_structured_adapter;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use sluice::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use sluice_runtime::{Application, BootFn, Bootable, SluiceConfig, SluiceRuntime};

    // Handlers and routes
    pub use sluice_framework::{
        ChainLink, DeploymentMode, Handler, HandlerError, HandlerResult, Outcome, RequestContext,
        RouteMeta, handler_fn,
    };

    // Interceptors
    pub use sluice_framework::{Interceptor, Phase};

    // Adapters and parameters
    pub use sluice_core::{
        Adapter, BufferedAdapter, EmptyAdapter, ErrorAdapter, InjectableParams,
        ParameterSource, TextAdapter,
    };

    pub use sluice_core::impl_structured_adapter;

    pub use http::StatusCode;
}
