//! Sluice Runtime - boot orchestration for the Sluice REST framework.
//!
//! This crate provides:
//! - Application assembly and the serve loop (`SluiceRuntime`)
//! - Pre-scan and post-scan bootables (`BootManager`)
//! - Layered configuration (`ConfigLoader`, `SluiceConfig`)
//! - Logging configuration (`LoggingBuilder`)
//!
//! ```ignore
//! use sluice_runtime::SluiceRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut runtime = SluiceRuntime::new()?;
//!     runtime.route(RouteMeta::get("/hello/{name}"), Hello)?;
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `http-server`: `SluiceRuntime::run` and `run_until`
//! - `toml-config` / `yaml-config`: configuration file formats
//! - `json-log`: JSON log output

pub mod application;
pub mod boot;
pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use application::{Application, NoopApplication};
pub use boot::{BootError, BootFn, BootManager, BootResult, Bootable};
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, LogFormat, LogLevel, LogOutput, LoggingConfig,
    SluiceConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::{AppState, RuntimeBuilder, SluiceRuntime};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
