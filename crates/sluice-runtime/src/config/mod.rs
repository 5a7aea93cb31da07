//! Configuration for the Sluice runtime.
//!
//! Files, environment variables and programmatic overrides are layered with
//! figment into a [`SluiceConfig`], which is validated before boot and then
//! projected onto the framework's `PipelineSettings`.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use schema::{
    BootConfig, DevConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, ParamsConfig,
    ResponseConfig, ServerConfig, SluiceConfig, SpanEventConfig,
};
pub use validation::validate_config;
