//! Request-time settings derived from the application configuration.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use sluice_core::{JsonOptions, ParameterSource};

/// The environment an application is deployed in.
///
/// Development-only behaviours, such as exposing stack traces, are enabled
/// in [`DeploymentMode::Development`] alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    Test,
    #[default]
    Development,
    Debug,
    Qa,
    Alpha,
    Beta,
    Staging,
    Production,
}

impl DeploymentMode {
    pub const ALL: [DeploymentMode; 8] = [
        Self::Test,
        Self::Development,
        Self::Debug,
        Self::Qa,
        Self::Alpha,
        Self::Beta,
        Self::Staging,
        Self::Production,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Development => "development",
            Self::Debug => "debug",
            Self::Qa => "qa",
            Self::Alpha => "alpha",
            Self::Beta => "beta",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    pub fn is_development(&self) -> bool {
        *self == Self::Development
    }

    /// Parses a mode name, falling back to `Development` for unknown names.
    pub fn parse_lenient(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == lower)
            .ok_or_else(|| format!("unknown deployment mode: {s}"))
    }
}

/// Immutable settings consulted while processing requests.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub mode: DeploymentMode,
    /// Charset appended to every textual `Content-Type`.
    pub charset: String,
    /// Content type for routes that do not declare one.
    pub default_content_type: String,
    /// Status used when required parameters are missing.
    pub missing_params_status: StatusCode,
    /// Attach stack traces to error bodies. Only honoured in development.
    pub embed_stack_trace: bool,
    /// Log stack traces of handler errors. Only honoured in development.
    pub print_stack_trace: bool,
    pub json: JsonOptions,
    /// Header holding the client address when running behind a proxy.
    pub forwarded_ip_header: Option<String>,
    method_sources: HashMap<Method, ParameterSource>,
}

impl PipelineSettings {
    /// Sets the default parameter source for a method.
    pub fn with_method_source(mut self, method: Method, source: ParameterSource) -> Self {
        self.method_sources.insert(method, source);
        self
    }

    /// Returns the parameter source for routes that do not declare one.
    pub fn default_source(&self, method: &Method) -> ParameterSource {
        self.method_sources
            .get(method)
            .copied()
            .unwrap_or(ParameterSource::Any)
    }

    /// Returns `true` if stack traces should be embedded in responses.
    pub fn embeds_stack_trace(&self) -> bool {
        self.mode.is_development() && self.embed_stack_trace
    }

    /// Returns `true` if stack traces should be logged.
    pub fn prints_stack_trace(&self) -> bool {
        self.mode.is_development() && self.print_stack_trace
    }

    /// Returns the full `Content-Type` header value for `content_type`.
    pub fn content_type_header(&self, content_type: &str) -> String {
        if self.charset.is_empty() || content_type.contains("charset=") {
            content_type.to_string()
        } else {
            format!("{content_type}; charset={}", self.charset)
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let method_sources = [Method::POST, Method::PUT, Method::PATCH]
            .into_iter()
            .map(|method| (method, ParameterSource::Body))
            .collect();

        Self {
            mode: DeploymentMode::Development,
            charset: "utf-8".to_string(),
            default_content_type: "application/json".to_string(),
            missing_params_status: StatusCode::BAD_REQUEST,
            embed_stack_trace: true,
            print_stack_trace: false,
            json: JsonOptions::default(),
            forwarded_ip_header: None,
            method_sources,
        }
    }
}
