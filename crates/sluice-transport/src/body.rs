//! Request body classification.
//!
//! JSON bodies are kept as a raw string and never form-parsed; every other
//! body is decoded as `application/x-www-form-urlencoded` pairs. Parse
//! failures are logged and degrade to an empty body.

use http::HeaderMap;
use http::header::CONTENT_TYPE;
use sluice_framework::RequestBody;
use tracing::warn;

/// Turns body bytes into a [`RequestBody`] according to the content type.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyParser;

impl BodyParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, headers: &HeaderMap, body: &[u8]) -> RequestBody {
        if body.is_empty() {
            return RequestBody::None;
        }

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if is_json(content_type) {
            match std::str::from_utf8(body) {
                Ok(text) => RequestBody::Raw(text.to_string()),
                Err(e) => {
                    warn!(error = %e, content_type, "Discarding request body that is not valid UTF-8");
                    RequestBody::None
                }
            }
        } else {
            RequestBody::Form(url::form_urlencoded::parse(body).into_owned().collect())
        }
    }
}

/// Returns `true` for `application/json` and `+json` media types.
pub fn is_json(content_type: &str) -> bool {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media_type == "application/json" || media_type.ends_with("+json")
}
