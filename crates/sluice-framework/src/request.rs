//! The request facet of an exchange.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use http::header::{COOKIE, USER_AGENT};
use http::{HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;
use sluice_core::{InjectableParams, ParameterResolver, ParameterSet, ParameterSource, Parameters};

use crate::error::RequestError;
use crate::settings::PipelineSettings;

/// A request body after the transport has read and classified it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestBody {
    /// No body was sent.
    #[default]
    None,
    /// A structured (JSON) body, kept as a raw string and never form-parsed.
    Raw(String),
    /// A form-encoded body, decoded into pairs.
    Form(Vec<(String, String)>),
}

impl RequestBody {
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Everything the transport knows about a matched request.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub peer_addr: Option<SocketAddr>,
    /// Captures from the matched path template.
    pub path_params: Vec<(String, String)>,
    pub body: RequestBody,
}

impl IncomingRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            peer_addr: None,
            path_params: Vec::new(),
            body: RequestBody::None,
        }
    }

    /// Returns the decoded query string pairs.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.uri
            .query()
            .map(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Validity bookkeeping for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestState {
    valid: bool,
    error: Option<String>,
    missing: BTreeSet<String>,
    inspected: bool,
}

impl Default for RequestState {
    fn default() -> Self {
        Self {
            valid: true,
            error: None,
            missing: BTreeSet::new(),
            inspected: false,
        }
    }
}

/// The request side of an exchange: metadata, parameters and validity.
pub struct HttpRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    cookies: BTreeMap<String, String>,
    remote_addr: Option<IpAddr>,
    body: String,
    params: ParameterResolver,
    required: BTreeSet<String>,
    state: RequestState,
    created_at: Instant,
}

impl HttpRequest {
    /// Builds the request facet, collecting the form body only when the
    /// route reads parameters from `Any` or `Body`.
    pub fn new(
        incoming: IncomingRequest,
        source: ParameterSource,
        required: impl IntoIterator<Item = String>,
        settings: &PipelineSettings,
    ) -> Self {
        let query = ParameterSet::from_pairs(ParameterSource::Query, incoming.query_pairs());
        let path = ParameterSet::from_pairs(ParameterSource::Path, incoming.path_params);
        let collects_body = matches!(source, ParameterSource::Any | ParameterSource::Body);

        let (body, form) = match incoming.body {
            RequestBody::None => (String::new(), None),
            RequestBody::Raw(raw) => (raw, None),
            RequestBody::Form(pairs) if collects_body => (
                String::new(),
                Some(ParameterSet::from_pairs(ParameterSource::Body, pairs)),
            ),
            RequestBody::Form(_) => (String::new(), None),
        };

        let remote_addr = settings
            .forwarded_ip_header
            .as_deref()
            .and_then(|name| forwarded_addr(&incoming.headers, name))
            .or_else(|| incoming.peer_addr.map(|addr| addr.ip()));

        Self {
            cookies: parse_cookies(&incoming.headers),
            method: incoming.method,
            uri: incoming.uri,
            headers: incoming.headers,
            remote_addr,
            body,
            params: ParameterResolver::new(path, query, form),
            required: required.into_iter().collect(),
            state: RequestState::default(),
            created_at: Instant::now(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the URI path.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the first value of a header, if it is valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get(USER_AGENT).and_then(|v| v.to_str().ok())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    /// Returns the client address, honouring the forwarded header when one
    /// is configured and parseable.
    pub fn remote_addr(&self) -> Option<IpAddr> {
        self.remote_addr
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Returns the raw body. Empty unless the request carried a structured
    /// body.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Deserializes the raw body as JSON, or returns `None`.
    pub fn json<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_str(&self.body).ok()
    }

    // ─── Parameters ───────────────────────────────────────────────────────────

    /// Parameters from every source.
    pub fn params(&self) -> Parameters<'_> {
        self.params.view(ParameterSource::Any)
    }

    pub fn path_params(&self) -> Parameters<'_> {
        self.params.view(ParameterSource::Path)
    }

    pub fn query_params(&self) -> Parameters<'_> {
        self.params.view(ParameterSource::Query)
    }

    pub fn body_params(&self) -> Parameters<'_> {
        self.params.view(ParameterSource::Body)
    }

    pub fn params_from(&self, source: ParameterSource) -> Parameters<'_> {
        self.params.view(source)
    }

    pub fn raw_values(&self, source: ParameterSource) -> BTreeMap<String, Vec<String>> {
        self.params.raw_values(source)
    }

    /// Merges injected values into the parameters of this request.
    pub fn inject(&mut self, params: InjectableParams) {
        self.params.inject(params);
    }

    // ─── Validity ─────────────────────────────────────────────────────────────

    pub fn is_valid(&self) -> bool {
        self.state.valid
    }

    /// Returns the error message assigned to this request.
    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    /// Marks the request invalid. The handler will not run if this happens
    /// before it is invoked.
    pub fn invalidate(&mut self) {
        self.state.valid = false;
    }

    /// Marks the request invalid with an error message.
    pub fn invalidate_with(&mut self, message: impl fmt::Display) {
        self.invalidate();
        self.assign_error(message);
    }

    /// Sets the error message without changing validity.
    pub fn assign_error(&mut self, message: impl fmt::Display) {
        self.state.error = Some(message.to_string());
    }

    /// Declares more required parameters.
    ///
    /// Fails once the required parameters have been checked.
    pub fn require_parameters<I, S>(&mut self, keys: I) -> Result<(), RequestError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.state.inspected {
            return Err(RequestError::ParametersInspected);
        }
        self.required.extend(keys.into_iter().map(Into::into));
        Ok(())
    }

    /// Checks the required parameters against every source, recording the
    /// missing ones. Marks the parameters as inspected unless none are required.
    pub fn has_all_required_parameters(&mut self) -> bool {
        if self.required.is_empty() {
            return true;
        }

        let params = self.params.view(ParameterSource::Any);
        let missing: BTreeSet<String> = self
            .required
            .iter()
            .filter(|key| !params.has(key))
            .cloned()
            .collect();

        self.state.missing = missing;
        self.state.inspected = true;
        self.state.missing.is_empty()
    }

    /// Returns the keys found missing by the last inspection.
    pub fn missing_parameters(&self) -> &BTreeSet<String> {
        &self.state.missing
    }

    pub fn parameters_inspected(&self) -> bool {
        self.state.inspected
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn forwarded_addr(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    let value = headers.get(name)?.to_str().ok()?;
    value.split(',').next()?.trim().parse().ok()
}

fn parse_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.to_string(), value.trim_matches('"').to_string()))
        })
        .collect()
}
