//! The per-request pipeline.
//!
//! For every matched request the pipeline:
//!
//! 1. allocates the route adapter from its pool
//! 2. builds the [`RequestContext`] and runs the request interceptors
//! 3. runs the handler through the [`HandlerProcessor`]
//! 4. runs the response interceptors and renders the body
//! 5. writes the head and body into the transport's [`ResponseSink`]
//! 6. once the transport reports delivery, runs the send hooks and the
//!    ending interceptors, then returns the adapter to its pool
//!
//! Steps 1-5 run on the calling thread. Step 6 runs wherever the transport
//! invokes the [`Completion`].

use std::any::type_name;
use std::io::{self, Write};
use std::sync::Arc;

use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use sluice_core::AdapterPool;
use tracing::{debug, debug_span, error, warn};

use crate::context::RequestContext;
use crate::handler::Handler;
use crate::interceptor::{InterceptorChain, Phase};
use crate::processor::{HandlerProcessor, ResponseState};
use crate::render::{RenderedBody, Renderer};
use crate::request::{HttpRequest, IncomingRequest};
use crate::response::HttpResponse;
use crate::route::{RouteMeta, RouteService};
use crate::settings::PipelineSettings;
use crate::sink::{Completion, ResponseHead, ResponseSink};
use crate::writer::ResponseWriter;

const INVALID_ADAPTER: &str = "Invalid Adapter";

/// Shared, immutable request pipeline.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    settings: Arc<PipelineSettings>,
    interceptors: Arc<InterceptorChain>,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings, interceptors: InterceptorChain) -> Self {
        Self {
            settings: Arc::new(settings),
            interceptors: Arc::new(interceptors),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    /// Runs `incoming` through a type-erased route.
    pub fn dispatch(&self, route: &dyn RouteService, incoming: IncomingRequest, sink: Box<dyn ResponseSink>) {
        route.serve(self, incoming, sink);
    }

    /// Runs one exchange for `handler`.
    pub fn execute<H: Handler>(
        &self,
        handler: Arc<H>,
        pool: &Arc<AdapterPool<H::Adapter>>,
        meta: &Arc<RouteMeta>,
        incoming: IncomingRequest,
        sink: Box<dyn ResponseSink>,
    ) {
        let span = debug_span!("request", method = %incoming.method, path = %incoming.uri.path());
        let _enter = span.enter();

        let content_type = meta
            .content_type()
            .unwrap_or(&self.settings.default_content_type)
            .to_string();

        let Some(mut pooled) = pool.allocate() else {
            error!(handler = type_name::<H>(), "Route adapter could not be constructed");
            self.send_invalid_adapter(sink, &content_type);
            return;
        };

        let source = meta.effective_source(&self.settings);
        let request = HttpRequest::new(
            incoming,
            source,
            meta.required().iter().cloned(),
            &self.settings,
        );
        let mut ctx = RequestContext::new(
            request,
            HttpResponse::new(content_type),
            Arc::clone(meta),
            sink,
        );

        handler.on_request_created(&mut ctx);
        self.interceptors.run(Phase::Request, &mut ctx);

        let (state, body) = match pooled.get_mut() {
            Some(adapter) => self.respond(&*handler, &mut ctx, adapter),
            None => {
                error!(handler = type_name::<H>(), "Route adapter was released early");
                let state = ResponseState::invalid(StatusCode::INTERNAL_SERVER_ERROR);
                (state, RenderedBody::Bytes(INVALID_ADAPTER.as_bytes().to_vec()))
            }
        };

        let Some(mut sink) = ctx.take_sink() else {
            warn!("Response sink is no longer available");
            return;
        };

        let interceptors = Arc::clone(&self.interceptors);
        let written = self.write_response(&ctx, &state, body, sink.as_mut());
        let completion = Completion::new(move |result: io::Result<()>| {
            let mut ctx = ctx;
            ctx.response_mut().record_send(&result);
            match &result {
                Ok(()) => handler.on_response_sent(&mut ctx),
                Err(e) => {
                    warn!(error = %e, "Failed to send response");
                    handler.on_response_error(&mut ctx, e);
                }
            }
            interceptors.run(Phase::Ending, &mut ctx);
            pooled.release();
        });

        match written {
            Ok(()) => sink.finish(completion),
            Err(e) => completion.complete(Err(e)),
        }
    }

    fn respond<H: Handler>(
        &self,
        handler: &H,
        ctx: &mut RequestContext,
        adapter: &mut H::Adapter,
    ) -> (ResponseState, RenderedBody) {
        let processor = HandlerProcessor::new(&self.settings);
        let state = processor.process(handler, ctx, adapter);
        ctx.response_mut().set_status(state.status);
        debug!(status = %state.status, ?state.request_status, ?state.adapter_status, "Handler processed");

        self.interceptors.run(Phase::Response, ctx);
        handler.on_response_ready(ctx);

        let checked = processor.recheck::<H>(ctx, state);
        if checked != state {
            ctx.response_mut().set_status(checked.status);
        }
        let state = checked;

        let body = Renderer::new(&self.settings).render(&state, ctx, adapter);
        (state, body)
    }

    fn write_response(
        &self,
        ctx: &RequestContext,
        state: &ResponseState,
        body: RenderedBody,
        sink: &mut dyn ResponseSink,
    ) -> io::Result<()> {
        let response = ctx.response();
        let status = response.status().unwrap_or(state.status);

        let mut head = ResponseHead::new(status);
        head.headers = response.headers().clone();

        match body {
            RenderedBody::None => {
                if !sink.head_sent() {
                    head.content_length = Some(0);
                    sink.send_head(head)?;
                }
                Ok(())
            }
            RenderedBody::Bytes(bytes) => {
                self.insert_content_type(&mut head, response.content_type());
                head.content_length = Some(bytes.len() as u64);
                sink.send_head(head)?;
                sink.write_all(&bytes)?;
                sink.flush()
            }
            RenderedBody::Stream { mut reader, length } => {
                self.insert_content_type(&mut head, response.content_type());
                head.content_length = length;
                sink.send_head(head)?;
                ResponseWriter::copy_chunked(&mut reader, sink).map(|_| ())
            }
        }
    }

    fn insert_content_type(&self, head: &mut ResponseHead, content_type: &str) {
        match HeaderValue::from_str(&self.settings.content_type_header(content_type)) {
            Ok(value) => {
                head.headers.insert(CONTENT_TYPE, value);
            }
            Err(_) => warn!(content_type, "Ignoring invalid content type"),
        }
    }

    fn send_invalid_adapter(&self, mut sink: Box<dyn ResponseSink>, content_type: &str) {
        let mut head = ResponseHead::new(StatusCode::INTERNAL_SERVER_ERROR);
        self.insert_content_type(&mut head, content_type);
        head.content_length = Some(INVALID_ADAPTER.len() as u64);

        let written = sink
            .send_head(head)
            .and_then(|()| sink.write_all(INVALID_ADAPTER.as_bytes()))
            .and_then(|()| sink.flush());
        match written {
            Ok(()) => sink.finish(Completion::noop()),
            Err(e) => warn!(error = %e, "Failed to send response"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chained::{ChainLink, Chained};
    use crate::error::HandlerError;
    use crate::handler::{HandlerResult, Outcome, handler_fn};
    use crate::route::{Route, RouteRegistry};
    use crate::sink::{MemoryHandle, MemorySink};
    use http::Method;
    use parking_lot::Mutex;
    use serde::Serialize;
    use sluice_core::{BufferedAdapter, ErrorAdapter, InjectableParams, TextAdapter, impl_structured_adapter};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default, Serialize)]
    struct Greeting {
        message: String,
    }

    impl_structured_adapter!(Greeting);

    struct Greet;

    impl Handler for Greet {
        type Adapter = Greeting;

        fn handle(&self, ctx: &mut RequestContext, adapter: &mut Greeting) -> HandlerResult {
            let name = ctx.request().params().get("name").unwrap_or("world");
            adapter.message = format!("hello, {name}");
            Ok(Outcome::ok())
        }
    }

    fn serve<H: Handler>(pipeline: &Pipeline, route: &Route<H>, uri: &str) -> MemoryHandle {
        serve_request(pipeline, route, IncomingRequest::new(route.meta().method().clone(), uri.parse().unwrap()))
    }

    fn serve_request<H: Handler>(
        pipeline: &Pipeline,
        route: &Route<H>,
        incoming: IncomingRequest,
    ) -> MemoryHandle {
        let (sink, handle) = MemorySink::new();
        pipeline.dispatch(route, incoming, Box::new(sink));
        handle
    }

    #[test]
    fn test_valid_structured_response() {
        let pipeline = Pipeline::default();
        let route = Route::new(RouteMeta::get("/greet"), Arc::new(Greet));

        let handle = serve(&pipeline, &route, "/greet?name=sluice");
        assert_eq!(handle.status(), Some(StatusCode::OK));
        assert_eq!(
            handle.header("content-type").as_deref(),
            Some("application/json; charset=utf-8")
        );
        assert_eq!(handle.body_text(), r#"{"message":"hello, sluice"}"#);
        assert_eq!(
            handle.record().head.unwrap().content_length,
            Some(handle.body().len() as u64)
        );
        assert!(handle.finished());
        assert_eq!(route.pool().available(), 1);
    }

    #[test]
    fn test_missing_parameters_use_route_category() {
        let pipeline = Pipeline::default();
        let route = Route::new(RouteMeta::get("/greet").require(["name"]), Arc::new(Greet));

        let handle = serve(&pipeline, &route, "/greet");
        assert_eq!(handle.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(
            handle.body_text(),
            r#"{"message":"Missing required parameters: [name]"}"#
        );
    }

    #[test]
    fn test_handler_error_renders_text_with_trace() {
        let pipeline = Pipeline::default();
        let handler = handler_fn(|_: &mut RequestContext, _: &mut TextAdapter| -> HandlerResult {
            Err("store offline".into())
        });
        let route = Route::new(RouteMeta::get("/fail").produces("text/plain"), Arc::new(handler));

        let handle = serve(&pipeline, &route, "/fail");
        assert_eq!(handle.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(
            handle.header("content-type").as_deref(),
            Some("text/plain; charset=utf-8")
        );
        assert_eq!(
            handle.body_text(),
            "Caught runtime exception: HandlerError - store offline\n\nStack Trace:\nstore offline"
        );
    }

    #[test]
    fn test_interceptors_and_hooks_run_in_order() {
        #[derive(Default)]
        struct Log(Mutex<Vec<String>>);

        struct Hooked(Arc<Log>);

        impl Handler for Hooked {
            type Adapter = TextAdapter;

            fn handle(&self, _ctx: &mut RequestContext, adapter: &mut TextAdapter) -> HandlerResult {
                self.0.0.lock().push("handle".into());
                adapter.set_body("body");
                Ok(Outcome::ok())
            }

            fn on_request_created(&self, _ctx: &mut RequestContext) {
                self.0.0.lock().push("created".into());
            }

            fn on_response_ready(&self, _ctx: &mut RequestContext) {
                self.0.0.lock().push("ready".into());
            }

            fn on_response_sent(&self, ctx: &mut RequestContext) {
                let sent = ctx.response().was_successful();
                self.0.0.lock().push(format!("sent {sent:?}"));
            }
        }

        let log = Arc::new(Log::default());
        let mut chain = InterceptorChain::new();
        for (phase, label) in [
            (Phase::Request, "request"),
            (Phase::Response, "response"),
            (Phase::Ending, "ending"),
        ] {
            let log = Arc::clone(&log);
            chain.register(phase, 0, move |_: &mut RequestContext| {
                log.0.lock().push(label.to_string());
            });
        }

        let pipeline = Pipeline::new(PipelineSettings::default(), chain);
        let route = Route::new(RouteMeta::get("/hooks"), Arc::new(Hooked(Arc::clone(&log))));
        let handle = serve(&pipeline, &route, "/hooks");

        assert_eq!(handle.body_text(), "body");
        assert_eq!(
            *log.0.lock(),
            vec!["created", "request", "handle", "response", "ready", "sent Some(true)", "ending"]
        );
    }

    #[test]
    fn test_request_interceptor_can_reject() {
        let mut chain = InterceptorChain::new();
        chain.register(Phase::Request, 0, |ctx: &mut RequestContext| {
            ctx.response_mut().set_status(StatusCode::UNAUTHORIZED);
            ctx.request_mut().invalidate_with("login required");
        });

        let pipeline = Pipeline::new(PipelineSettings::default(), chain);
        let route = Route::new(RouteMeta::get("/greet"), Arc::new(Greet));

        let handle = serve(&pipeline, &route, "/greet");
        assert_eq!(handle.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(handle.body_text(), r#"{"message":"login required"}"#);
    }

    #[test]
    fn test_response_interceptor_replaces_adapter() {
        let mut chain = InterceptorChain::new();
        chain.register(Phase::Response, 0, |ctx: &mut RequestContext| {
            ctx.response_mut().replace_adapter(TextAdapter::new("intercepted"));
        });

        let pipeline = Pipeline::new(PipelineSettings::default(), chain);
        let route = Route::new(RouteMeta::get("/greet"), Arc::new(Greet));

        let handle = serve(&pipeline, &route, "/greet");
        assert_eq!(handle.body_text(), "intercepted");
    }

    #[test]
    fn test_ejected_handler_writes_its_own_response() {
        let handler = handler_fn(|ctx: &mut RequestContext, _: &mut TextAdapter| -> HandlerResult {
            if let Some(sink) = ctx.sink_mut() {
                sink.send_head(ResponseHead::new(StatusCode::ACCEPTED))?;
                sink.write_all(b"raw")?;
            }
            Ok(Outcome::eject(StatusCode::ACCEPTED))
        });
        let route = Route::new(RouteMeta::get("/raw"), Arc::new(handler));

        let handle = serve(&Pipeline::default(), &route, "/raw");
        assert_eq!(handle.status(), Some(StatusCode::ACCEPTED));
        assert_eq!(handle.body_text(), "raw");
        assert!(handle.finished());
    }

    #[test]
    fn test_ejected_without_head_sends_empty_response() {
        let handler = handler_fn(|_: &mut RequestContext, _: &mut TextAdapter| -> HandlerResult {
            Ok(Outcome::eject(StatusCode::NO_CONTENT))
        });
        let route = Route::new(RouteMeta::get("/none"), Arc::new(handler));

        let handle = serve(&Pipeline::default(), &route, "/none");
        assert_eq!(handle.status(), Some(StatusCode::NO_CONTENT));
        assert!(handle.body().is_empty());
    }

    #[test]
    fn test_buffered_response_is_chunked() {
        let handler = handler_fn(|_: &mut RequestContext, adapter: &mut BufferedAdapter| -> HandlerResult {
            adapter.set_bytes(vec![b'x'; 20_000]);
            Ok(Outcome::ok())
        });
        let route = Route::new(
            RouteMeta::get("/download").blocking().produces("application/octet-stream"),
            Arc::new(handler),
        );

        let handle = serve(&Pipeline::default(), &route, "/download");
        assert_eq!(handle.status(), Some(StatusCode::OK));
        assert_eq!(handle.body().len(), 20_000);
        assert_eq!(handle.chunk_count(), 3);
        assert_eq!(handle.record().head.unwrap().content_length, Some(20_000));
    }

    #[test]
    fn test_buffered_response_requires_blocking_route() {
        let handler = handler_fn(|_: &mut RequestContext, adapter: &mut BufferedAdapter| -> HandlerResult {
            adapter.set_bytes(b"data".to_vec());
            Ok(Outcome::ok())
        });
        let route = Route::new(RouteMeta::get("/download"), Arc::new(handler));

        let handle = serve(&Pipeline::default(), &route, "/download");
        assert_eq!(handle.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(handle.body_text().starts_with("Attempting to send BufferedResponse"));
    }

    #[test]
    fn test_buffered_replacement_from_interceptor_requires_blocking_route() {
        let mut chain = InterceptorChain::new();
        chain.register(Phase::Response, 0, |ctx: &mut RequestContext| {
            let mut buffered = BufferedAdapter::default();
            buffered.set_bytes(b"late".to_vec());
            ctx.response_mut().replace_adapter(buffered);
        });
        let pipeline = Pipeline::new(PipelineSettings::default(), chain);
        let handler = handler_fn(|_: &mut RequestContext, adapter: &mut TextAdapter| -> HandlerResult {
            adapter.set_body("text");
            Ok(Outcome::ok())
        });
        let route = Route::new(RouteMeta::get("/late"), Arc::new(handler));

        let handle = serve(&pipeline, &route, "/late");
        assert_eq!(handle.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(handle.body_text().starts_with("Attempting to send BufferedResponse"));
        assert!(handle.finished());
    }

    #[test]
    fn test_failed_adapter_construction() {
        let route = Route::with_factory(RouteMeta::get("/greet"), Arc::new(Greet), || None);

        let handle = serve(&Pipeline::default(), &route, "/greet");
        assert_eq!(handle.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(handle.body_text(), "Invalid Adapter");
    }

    #[test]
    fn test_send_failure_runs_error_hook() {
        struct Failing(Arc<AtomicUsize>);

        impl Handler for Failing {
            type Adapter = TextAdapter;

            fn handle(&self, _ctx: &mut RequestContext, adapter: &mut TextAdapter) -> HandlerResult {
                adapter.set_body("lost");
                Ok(Outcome::ok())
            }

            fn on_response_error(&self, ctx: &mut RequestContext, _error: &io::Error) {
                assert!(ctx.response().send_error().is_some());
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let errors = Arc::new(AtomicUsize::new(0));
        let route = Route::new(RouteMeta::get("/lost"), Arc::new(Failing(Arc::clone(&errors))));
        let (sink, _handle) = MemorySink::failing(io::ErrorKind::BrokenPipe);
        let incoming = IncomingRequest::new(Method::GET, "/lost".parse().unwrap());
        Pipeline::default().dispatch(&route, incoming, Box::new(sink));

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(route.pool().available(), 1);
    }

    #[test]
    fn test_chained_route_through_pipeline() {
        struct RequireKey;

        impl ChainLink for RequireKey {
            type Target = Greet;

            fn handle(
                &self,
                ctx: &mut RequestContext,
                next: &mut InjectableParams,
            ) -> Result<StatusCode, HandlerError> {
                if ctx.request().has_header("x-api-key") {
                    next.put("name", "key holder");
                    Ok(StatusCode::OK)
                } else {
                    ctx.request_mut().invalidate_with("missing key");
                    Ok(StatusCode::FORBIDDEN)
                }
            }
        }

        let mut registry = RouteRegistry::new();
        registry
            .add(Route::new(RouteMeta::get("/greet"), Arc::new(Greet)))
            .unwrap();
        let chained = Chained::resolve(RequireKey, &registry).unwrap();
        let route = Route::new(RouteMeta::get("/secure"), Arc::new(chained));
        let pipeline = Pipeline::default();

        let handle = serve(&pipeline, &route, "/secure?name=guest");
        assert_eq!(handle.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(handle.body_text(), r#"{"message":"missing key"}"#);

        let mut incoming = IncomingRequest::new(Method::GET, "/secure?name=guest".parse().unwrap());
        incoming.headers.insert("x-api-key", HeaderValue::from_static("k"));
        let handle = serve_request(&pipeline, &route, incoming);
        assert_eq!(handle.status(), Some(StatusCode::OK));
        assert_eq!(handle.body_text(), r#"{"message":"hello, key holder"}"#);
    }

    #[test]
    fn test_error_adapter_replacement_on_valid_request() {
        let handler = handler_fn(|_: &mut RequestContext, _: &mut Greeting| -> HandlerResult {
            Ok(Outcome::replace(StatusCode::NOT_FOUND, ErrorAdapter::new("no such user")))
        });
        let route = Route::new(RouteMeta::get("/users/{id}"), Arc::new(handler));

        let handle = serve(&Pipeline::default(), &route, "/users/9");
        assert_eq!(handle.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(handle.body_text(), r#"{"message":"no such user"}"#);
    }
}
