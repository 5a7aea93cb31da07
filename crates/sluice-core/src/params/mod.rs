//! Multi-source request parameters.
//!
//! A request carries parameters from several places: path captures, the
//! query string, a form-encoded body, and values injected programmatically by
//! a chained handler. This module normalizes each source into a
//! [`ParameterSet`], merges them into [`CollectedParameters`], and exposes the
//! merged view through [`Parameters`].
//!
//! # Precedence
//!
//! - An [`ParameterSource::Any`] lookup returns the injected values for a key
//!   when there are any; otherwise it concatenates path, query and body values
//!   in that order.
//! - A scoped lookup (`Path`, `Query`, `Body`) is still shadowed by injected
//!   values for the same key.

mod coerce;
mod collected;
mod injectable;
mod map;
mod resolver;
mod set;
mod view;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use coerce::FromParam;
pub use collected::CollectedParameters;
pub use injectable::InjectableParams;
pub use map::ParamMap;
pub use resolver::ParameterResolver;
pub use set::ParameterSet;
pub use view::Parameters;

/// Where a parameter value came from.
///
/// The declaration order is the concatenation order used by `Any` lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterSource {
    /// Captures from the matched route template.
    Path,
    /// The query string.
    Query,
    /// A form-encoded request body.
    Body,
    /// Values injected by a chained handler.
    Injected,
    /// Logical aggregate of every source.
    Any,
}

impl ParameterSource {
    /// Returns the lowercase name of the source.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Body => "body",
            Self::Injected => "injected",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for ParameterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "path" => Ok(Self::Path),
            "query" => Ok(Self::Query),
            "body" => Ok(Self::Body),
            "injected" => Ok(Self::Injected),
            "any" => Ok(Self::Any),
            other => Err(format!("unknown parameter source: {other}")),
        }
    }
}
