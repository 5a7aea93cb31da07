//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use http::{Method, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use sluice_core::{JsonOptions, ParameterSource};
use sluice_framework::{DeploymentMode, PipelineSettings};

use super::error::{ConfigError, ConfigResult};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SluiceConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub response: ResponseConfig,

    /// Development-only behaviours.
    #[serde(default)]
    pub dev: DevConfig,

    /// Default parameter sources per method.
    #[serde(default)]
    pub params: ParamsConfig,

    #[serde(default)]
    pub boot: BootConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SluiceConfig {
    /// Projects the configuration onto the settings consulted per request.
    pub fn pipeline_settings(&self) -> ConfigResult<PipelineSettings> {
        let status = self.response.missing_params_status;
        let missing_params_status =
            StatusCode::from_u16(status).map_err(|_| ConfigError::InvalidStatus {
                field: "response.missing_params_status",
                code: status,
            })?;

        let mut settings = PipelineSettings::default()
            .with_method_source(Method::POST, self.params.post)
            .with_method_source(Method::PUT, self.params.put)
            .with_method_source(Method::PATCH, self.params.patch);
        settings.mode = self.server.mode;
        settings.charset.clone_from(&self.response.charset);
        settings
            .default_content_type
            .clone_from(&self.response.default_content_type);
        settings.missing_params_status = missing_params_status;
        settings.embed_stack_trace = self.dev.embed_stack_trace;
        settings.print_stack_trace = self.dev.print_stack_trace;
        settings.json = JsonOptions {
            indent: self.response.json_indent,
            include_nulls: self.response.json_include_nulls,
        };
        settings
            .forwarded_ip_header
            .clone_from(&self.server.forwarded_ip_header);
        Ok(settings)
    }
}

// ─── Server ───────────────────────────────────────────────────────────────────

/// Listener and deployment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Unknown names fall back to `development`.
    #[serde(default, deserialize_with = "lenient_mode")]
    pub mode: DeploymentMode,

    /// Header carrying the client address when behind a proxy.
    #[serde(default)]
    pub forwarded_ip_header: Option<String>,
}

impl ServerConfig {
    /// Returns `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            mode: DeploymentMode::default(),
            forwarded_ip_header: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn lenient_mode<'de, D>(deserializer: D) -> Result<DeploymentMode, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    Ok(DeploymentMode::parse_lenient(&name))
}

// ─── Response ─────────────────────────────────────────────────────────────────

/// Response encoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    #[serde(default = "default_charset")]
    pub charset: String,

    #[serde(default = "default_content_type")]
    pub default_content_type: String,

    /// Status sent when required parameters are missing.
    #[serde(default = "default_missing_params_status")]
    pub missing_params_status: u16,

    #[serde(default)]
    pub json_indent: bool,

    #[serde(default)]
    pub json_include_nulls: bool,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            charset: default_charset(),
            default_content_type: default_content_type(),
            missing_params_status: default_missing_params_status(),
            json_indent: false,
            json_include_nulls: false,
        }
    }
}

fn default_charset() -> String {
    "utf-8".to_string()
}

fn default_content_type() -> String {
    "application/json".to_string()
}

fn default_missing_params_status() -> u16 {
    400
}

// ─── Dev ──────────────────────────────────────────────────────────────────────

/// Stack trace exposure. Only honoured in `development` mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevConfig {
    #[serde(default = "default_true")]
    pub embed_stack_trace: bool,

    #[serde(default)]
    pub print_stack_trace: bool,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            embed_stack_trace: true,
            print_stack_trace: false,
        }
    }
}

fn default_true() -> bool {
    true
}

// ─── Params ───────────────────────────────────────────────────────────────────

/// Default parameter source for methods that carry a body.
///
/// Every other method reads from all sources.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParamsConfig {
    #[serde(default = "default_body_source")]
    pub post: ParameterSource,

    #[serde(default = "default_body_source")]
    pub put: ParameterSource,

    #[serde(default = "default_body_source")]
    pub patch: ParameterSource,
}

impl Default for ParamsConfig {
    fn default() -> Self {
        Self {
            post: ParameterSource::Body,
            put: ParameterSource::Body,
            patch: ParameterSource::Body,
        }
    }
}

fn default_body_source() -> ParameterSource {
    ParameterSource::Body
}

// ─── Boot ─────────────────────────────────────────────────────────────────────

/// Post-scan bootable execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootConfig {
    #[serde(default = "default_post_scan_workers")]
    pub post_scan_workers: usize,

    #[serde(default = "default_post_scan_timeout_secs")]
    pub post_scan_timeout_secs: u64,
}

impl BootConfig {
    pub fn post_scan_timeout(&self) -> Duration {
        Duration::from_secs(self.post_scan_timeout_secs)
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            post_scan_workers: default_post_scan_workers(),
            post_scan_timeout_secs: default_post_scan_timeout_secs(),
        }
    }
}

fn default_post_scan_workers() -> usize {
    4
}

fn default_post_scan_timeout_secs() -> u64 {
    30
}

// ─── Logging ──────────────────────────────────────────────────────────────────

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const NAMES: [&'static str; 5] = ["trace", "debug", "info", "warn", "error"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `full` otherwise.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Required when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include file names and line numbers.
    #[serde(default)]
    pub file_location: bool,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-module levels, e.g. `sluice_transport = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            thread_ids: false,
            file_location: false,
            span_events: SpanEventConfig::default(),
            filters: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_settings_projection() {
        let mut config = SluiceConfig::default();
        config.server.mode = DeploymentMode::Production;
        config.response.missing_params_status = 422;
        config.response.charset = "iso-8859-1".to_string();
        config.params.put = ParameterSource::Query;

        let settings = config.pipeline_settings().unwrap();
        assert_eq!(settings.mode, DeploymentMode::Production);
        assert_eq!(settings.missing_params_status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(settings.charset, "iso-8859-1");
        assert_eq!(settings.default_source(&Method::PUT), ParameterSource::Query);
        assert_eq!(settings.default_source(&Method::POST), ParameterSource::Body);
        assert_eq!(settings.default_source(&Method::GET), ParameterSource::Any);
        // Dev flags are stored but not honoured outside development.
        assert!(settings.embed_stack_trace);
        assert!(!settings.embeds_stack_trace());
    }

    #[test]
    fn test_invalid_status_is_rejected() {
        let mut config = SluiceConfig::default();
        config.response.missing_params_status = 1000;
        assert!(matches!(
            config.pipeline_settings(),
            Err(ConfigError::InvalidStatus { code: 1000, .. })
        ));
    }

    #[test]
    fn test_server_defaults() {
        let server = ServerConfig::default();
        assert_eq!(server.bind_addr(), "127.0.0.1:8080");
        assert_eq!(server.mode, DeploymentMode::Development);
    }
}
