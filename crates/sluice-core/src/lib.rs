//! # Sluice Core
//!
//! Core contracts shared by every layer of the Sluice request pipeline.
//!
//! This crate provides:
//! - The [`Adapter`] contract for pooled response payloads, together with
//!   the exhaustively-checked [`Content`] categories (structured, text, buffered)
//! - Built-in adapters: [`ErrorAdapter`], [`TextAdapter`], [`BufferedAdapter`]
//!   and [`EmptyAdapter`]
//! - [`AdapterPool`], a bounded reuse pool for per-route adapters
//! - The parameter resolver: [`ParameterSet`], [`CollectedParameters`],
//!   [`ParameterResolver`] and the typed [`Parameters`] view
//!
//! Nothing in this crate knows about HTTP transports; it only models the
//! values a request pipeline moves around.

pub mod adapter;
pub mod error;
pub mod params;
pub mod pool;

pub use adapter::{
    Adapter, BufferedAdapter, BufferedBody, Category, Content, EmptyAdapter, ErrorAdapter,
    JsonBody, JsonOptions, TextAdapter,
};
pub use error::{CoreError, CoreResult};
pub use params::{
    CollectedParameters, FromParam, InjectableParams, ParamMap, ParameterResolver, ParameterSet,
    ParameterSource, Parameters,
};
pub use pool::{AdapterPool, DEFAULT_POOL_CAPACITY, PoolStats, PooledAdapter};
