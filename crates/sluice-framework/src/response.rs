//! The response facet of an exchange.

use std::fmt;
use std::io;
use std::time::Duration;

use http::header::SET_COOKIE;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use sluice_core::Adapter;

/// A `Set-Cookie` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    path: Option<String>,
    domain: Option<String>,
    max_age: Option<Duration>,
    http_only: bool,
    secure: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            max_age: None,
            http_only: false,
            secure: false,
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={}", max_age.as_secs())?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        Ok(())
    }
}

/// Result of handing the response to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Failed(String),
}

/// The response side of an exchange.
///
/// Replacement adapters form a stack; rendering always uses the adapter on
/// top.
pub struct HttpResponse {
    status: Option<StatusCode>,
    content_type: String,
    headers: HeaderMap,
    replacements: Vec<Box<dyn Adapter>>,
    outcome: Option<SendOutcome>,
}

impl HttpResponse {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            status: None,
            content_type: content_type.into(),
            headers: HeaderMap::new(),
            replacements: Vec::new(),
            outcome: None,
        }
    }

    /// Returns the status, if one has been set.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = content_type.into();
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Sets a header, replacing previous values.
    ///
    /// Invalid names or values are ignored and reported as `false`.
    pub fn put_header(&mut self, name: &str, value: &str) -> bool {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
                true
            }
            _ => false,
        }
    }

    /// Appends a `Set-Cookie` header.
    pub fn add_cookie(&mut self, cookie: &Cookie) -> bool {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                self.headers.append(SET_COOKIE, value);
                true
            }
            Err(_) => false,
        }
    }

    /// Pushes an adapter that replaces the current one for rendering.
    pub fn replace_adapter(&mut self, adapter: impl Adapter) {
        self.replacements.push(Box::new(adapter));
    }

    pub fn push_replacement(&mut self, adapter: Box<dyn Adapter>) {
        self.replacements.push(adapter);
    }

    /// Returns the adapter on top of the replacement stack.
    pub fn replacement(&self) -> Option<&dyn Adapter> {
        self.replacements.last().map(|a| &**a)
    }

    pub fn replacement_mut(&mut self) -> Option<&mut (dyn Adapter + 'static)> {
        self.replacements.last_mut().map(|a| &mut **a)
    }

    pub fn has_replacement(&self) -> bool {
        !self.replacements.is_empty()
    }

    /// Returns `Some(true)` once the response was sent, `Some(false)` if
    /// sending failed, `None` before completion.
    pub fn was_successful(&self) -> Option<bool> {
        self.outcome
            .as_ref()
            .map(|outcome| *outcome == SendOutcome::Sent)
    }

    pub fn send_error(&self) -> Option<&str> {
        match &self.outcome {
            Some(SendOutcome::Failed(error)) => Some(error),
            _ => None,
        }
    }

    pub(crate) fn record_send(&mut self, result: &io::Result<()>) {
        self.outcome = Some(match result {
            Ok(()) => SendOutcome::Sent,
            Err(e) => SendOutcome::Failed(e.to_string()),
        });
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("replacements", &self.replacements.len())
            .field("outcome", &self.outcome)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::{ErrorAdapter, TextAdapter};

    #[test]
    fn test_replacement_stack_uses_top() {
        let mut response = HttpResponse::new("application/json");
        assert!(response.replacement().is_none());

        response.replace_adapter(TextAdapter::new("first"));
        response.replace_adapter(ErrorAdapter::new("second"));
        let top = response.replacement().unwrap();
        assert_eq!(top.as_error().unwrap().message(), "second");
    }

    #[test]
    fn test_cookie_header() {
        let mut response = HttpResponse::new("text/plain");
        let cookie = Cookie::new("sid", "42")
            .path("/")
            .max_age(Duration::from_secs(60))
            .http_only(true);
        assert!(response.add_cookie(&cookie));
        assert_eq!(
            response.headers().get(SET_COOKIE).unwrap(),
            "sid=42; Path=/; Max-Age=60; HttpOnly"
        );
    }

    #[test]
    fn test_send_outcome() {
        let mut response = HttpResponse::new("text/plain");
        assert_eq!(response.was_successful(), None);
        response.record_send(&Err(io::Error::other("reset")));
        assert_eq!(response.was_successful(), Some(false));
        assert_eq!(response.send_error(), Some("reset"));
    }

    #[test]
    fn test_put_header_rejects_invalid() {
        let mut response = HttpResponse::new("text/plain");
        assert!(response.put_header("x-trace", "abc"));
        assert!(!response.put_header("bad header", "abc"));
        assert_eq!(response.headers().len(), 1);
    }
}
