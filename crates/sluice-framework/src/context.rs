//! Per-request exchange context.
//!
//! A [`RequestContext`] is created for every matched request and handed to
//! interceptors and handlers. It binds together:
//!
//! - the [`HttpRequest`] facet (metadata, parameters, validity)
//! - the [`HttpResponse`] facet (status, headers, replacement adapters)
//! - a free-form data bag keyed by type, for passing values between
//!   interceptors and handlers
//! - the transport's [`ResponseSink`], for handlers that send the response
//!   themselves and then eject

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::request::HttpRequest;
use crate::response::HttpResponse;
use crate::route::RouteMeta;
use crate::sink::ResponseSink;

/// The context handed to interceptors and handlers for one exchange.
pub struct RequestContext {
    request: HttpRequest,
    response: HttpResponse,
    route: Arc<RouteMeta>,
    data: HashMap<TypeId, Box<dyn Any + Send>>,
    sink: Option<Box<dyn ResponseSink>>,
    /// Cleared at the start of every interceptor phase.
    intercepts_ended: bool,
}

impl RequestContext {
    pub fn new(
        request: HttpRequest,
        response: HttpResponse,
        route: Arc<RouteMeta>,
        sink: Box<dyn ResponseSink>,
    ) -> Self {
        Self {
            request,
            response,
            route,
            data: HashMap::new(),
            sink: Some(sink),
            intercepts_ended: false,
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut HttpRequest {
        &mut self.request
    }

    pub fn response(&self) -> &HttpResponse {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut HttpResponse {
        &mut self.response
    }

    /// Borrows both facets mutably at once.
    pub fn facets_mut(&mut self) -> (&mut HttpRequest, &mut HttpResponse) {
        (&mut self.request, &mut self.response)
    }

    /// Returns the metadata of the matched route.
    pub fn route(&self) -> &RouteMeta {
        &self.route
    }

    // ─── Data bag ─────────────────────────────────────────────────────────────

    /// Stores a value for the rest of the exchange. One value per type;
    /// later calls overwrite.
    pub fn set_data<T: Send + 'static>(&mut self, value: T) {
        self.data.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn data<T: 'static>(&self) -> Option<&T> {
        self.data
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn data_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.data
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut::<T>())
    }

    pub fn has_data<T: 'static>(&self) -> bool {
        self.data.contains_key(&TypeId::of::<T>())
    }

    pub fn take_data<T: 'static>(&mut self) -> Option<T> {
        self.data
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    // ─── Interception ─────────────────────────────────────────────────────────

    /// Stops the remaining interceptors of the current phase.
    ///
    /// Later phases still run, and the handler still runs unless the request
    /// was invalidated.
    pub fn end_intercepts(&mut self) {
        self.intercepts_ended = true;
    }

    pub fn intercepts_ended(&self) -> bool {
        self.intercepts_ended
    }

    pub(crate) fn begin_phase(&mut self) {
        self.intercepts_ended = false;
    }

    // ─── Output ───────────────────────────────────────────────────────────────

    /// Returns the transport sink, for handlers that write the response
    /// themselves. `None` once the pipeline has taken it back.
    pub fn sink_mut(&mut self) -> Option<&mut (dyn ResponseSink + 'static)> {
        self.sink.as_deref_mut()
    }

    pub(crate) fn take_sink(&mut self) -> Option<Box<dyn ResponseSink>> {
        self.sink.take()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request", &self.request)
            .field("response", &self.response)
            .field("route", &self.route.path())
            .field("data", &self.data.len())
            .field("intercepts_ended", &self.intercepts_ended)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::request::IncomingRequest;
    use crate::settings::PipelineSettings;
    use crate::sink::{MemoryHandle, MemorySink};
    use http::Method;
    use sluice_core::ParameterSource;

    pub(crate) fn context_for(uri: &str) -> (RequestContext, MemoryHandle) {
        let incoming = IncomingRequest::new(Method::GET, uri.parse().unwrap());
        let request = HttpRequest::new(
            incoming,
            ParameterSource::Any,
            Vec::new(),
            &PipelineSettings::default(),
        );
        let (sink, handle) = MemorySink::new();
        let route = Arc::new(RouteMeta::new(Method::GET, "/"));
        let ctx = RequestContext::new(
            request,
            HttpResponse::new("application/json"),
            route,
            Box::new(sink),
        );
        (ctx, handle)
    }

    #[derive(Debug, PartialEq)]
    struct UserId(u64);

    #[test]
    fn test_data_bag() {
        let (mut ctx, _) = context_for("/");
        assert!(!ctx.has_data::<UserId>());

        ctx.set_data(UserId(1));
        ctx.set_data(UserId(2));
        assert_eq!(ctx.data::<UserId>(), Some(&UserId(2)));

        ctx.data_mut::<UserId>().unwrap().0 = 3;
        assert_eq!(ctx.take_data::<UserId>(), Some(UserId(3)));
        assert!(ctx.data::<UserId>().is_none());
    }

    #[test]
    fn test_end_intercepts_resets_per_phase() {
        let (mut ctx, _) = context_for("/");
        ctx.end_intercepts();
        assert!(ctx.intercepts_ended());
        ctx.begin_phase();
        assert!(!ctx.intercepts_ended());
    }

    #[test]
    fn test_sink_is_taken_once() {
        let (mut ctx, _) = context_for("/");
        assert!(ctx.sink_mut().is_some());
        assert!(ctx.take_sink().is_some());
        assert!(ctx.sink_mut().is_none());
    }
}
