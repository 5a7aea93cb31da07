//! Route matching and execution-context selection.
//!
//! Requests start on the async runtime. A request moves to a blocking
//! worker, exactly once and before its handler runs, when its route is
//! marked blocking or when it carries a body. Body parsing happens on that
//! worker too.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use sluice_framework::{IncomingRequest, Pipeline, RequestBody, ResponseHead, RouteRegistry};
use tracing::{trace, warn};

use crate::body::BodyParser;
use crate::defaults::respond_unmatched;
use crate::error::TransportResult;
use crate::sink::{ChannelResponse, ChannelSink, SendMode};

/// A request as read off the wire.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub peer_addr: Option<SocketAddr>,
    pub body: Bytes,
}

impl RawRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            peer_addr: None,
            body: Bytes::new(),
        }
    }
}

/// Matches requests against the registry and runs them through the
/// pipeline.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<RouteRegistry>,
    pipeline: Pipeline,
    parser: BodyParser,
}

impl Dispatcher {
    pub fn new(registry: Arc<RouteRegistry>, pipeline: Pipeline) -> Self {
        Self {
            registry,
            pipeline,
            parser: BodyParser::new(),
        }
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Starts processing `request` and returns the channel its response
    /// arrives on.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, request: RawRequest) -> ChannelResponse {
        let Some(found) = self.registry.find(&request.method, request.uri.path()) else {
            let (sink, response) = ChannelSink::channel(SendMode::NonBlocking);
            respond_unmatched(&request.method, &request.uri, Box::new(sink));
            return response;
        };

        let route = found.route;
        let RawRequest {
            method,
            uri,
            headers,
            peer_addr,
            body,
        } = request;
        let mut incoming = IncomingRequest::new(method, uri);
        incoming.headers = headers;
        incoming.peer_addr = peer_addr;
        incoming.path_params = found.path_params;

        if !route.meta().is_blocking() && body.is_empty() {
            trace!(path = %route.meta().path(), "Dispatching inline");
            let (sink, response) = ChannelSink::channel(SendMode::NonBlocking);
            self.pipeline.dispatch(&*route, incoming, Box::new(sink));
            return response;
        }

        let (sink, response) = ChannelSink::channel(SendMode::Blocking);
        let pipeline = self.pipeline.clone();
        let parser = self.parser;
        trace!(path = %route.meta().path(), "Dispatching to blocking worker");
        tokio::task::spawn_blocking(move || {
            incoming.body = match body.is_empty() {
                true => RequestBody::None,
                false => parser.parse(&incoming.headers, &body),
            };
            pipeline.dispatch(&*route, incoming, Box::new(sink));
        });
        response
    }

    /// Dispatches `request` and waits for the complete response.
    pub async fn dispatch_collect(
        &self,
        request: RawRequest,
    ) -> TransportResult<(ResponseHead, Bytes)> {
        let (head, body) = self.dispatch(request).into_parts().await?;
        let body = body.to_bytes().await;
        if head.content_length.is_some_and(|len| len != body.len() as u64) {
            warn!(declared = ?head.content_length, actual = body.len(), "Response length mismatch");
        }
        Ok((head, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONTENT_TYPE;
    use http::{HeaderValue, StatusCode};
    use serde::Serialize;
    use sluice_core::{BufferedAdapter, ParameterSource, TextAdapter, impl_structured_adapter};
    use sluice_framework::{
        Handler, HandlerResult, InterceptorChain, Outcome, Phase, PipelineSettings, RequestContext,
        Route, RouteMeta, handler_fn,
    };
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Default, Serialize)]
    struct Echo {
        id: String,
        bar: Option<String>,
    }

    impl_structured_adapter!(Echo);

    struct EchoHandler;

    impl Handler for EchoHandler {
        type Adapter = Echo;

        fn handle(&self, ctx: &mut RequestContext, adapter: &mut Echo) -> HandlerResult {
            let params = ctx.request().params();
            adapter.id = params.get("id").unwrap_or_default().to_string();
            adapter.bar = ctx.request().body_params().get("bar").map(str::to_string);
            Ok(Outcome::ok())
        }
    }

    fn dispatcher() -> Dispatcher {
        let mut registry = RouteRegistry::new();
        registry
            .add(Route::new(RouteMeta::get("/items/{id}"), Arc::new(EchoHandler)))
            .unwrap();
        registry
            .add(Route::new(RouteMeta::post("/items/{id}"), Arc::new(EchoHandler)))
            .unwrap();
        registry
            .add(Route::new(
                RouteMeta::get("/files/{*path}")
                    .blocking()
                    .produces("application/octet-stream"),
                Arc::new(handler_fn(
                    |ctx: &mut RequestContext, adapter: &mut BufferedAdapter| -> HandlerResult {
                        let path = ctx.request().path_params().get("path").unwrap_or_default();
                        adapter.set_bytes(path.repeat(3000));
                        Ok(Outcome::ok())
                    },
                )),
            ))
            .unwrap();
        registry
            .add(Route::new(
                RouteMeta::get("/text").produces("text/plain"),
                Arc::new(handler_fn(|_: &mut RequestContext, adapter: &mut TextAdapter| -> HandlerResult {
                    adapter.set_body("plain");
                    Ok(Outcome::ok())
                })),
            ))
            .unwrap();
        Dispatcher::new(
            Arc::new(registry),
            Pipeline::new(PipelineSettings::default(), InterceptorChain::new()),
        )
    }

    fn get(uri: &str) -> RawRequest {
        RawRequest::new(Method::GET, uri.parse().unwrap())
    }

    #[tokio::test]
    async fn test_inline_route_with_path_capture() {
        let (head, body) = dispatcher().dispatch_collect(get("/items/42")).await.unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(body, Bytes::from_static(br#"{"id":"42"}"#));
    }

    #[tokio::test]
    async fn test_json_body_is_not_form_parsed() {
        let mut request = RawRequest::new(Method::POST, "/items/7".parse().unwrap());
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        request.body = Bytes::from_static(br#"{"bar":"x"}"#);

        let (head, body) = dispatcher().dispatch_collect(request).await.unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(body, Bytes::from_static(br#"{"id":"7"}"#));
    }

    #[tokio::test]
    async fn test_form_body_reaches_body_source() {
        let mut request = RawRequest::new(Method::POST, "/items/7".parse().unwrap());
        request.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        request.body = Bytes::from_static(b"bar=y");

        let (_, body) = dispatcher().dispatch_collect(request).await.unwrap();
        assert_eq!(body, Bytes::from_static(br#"{"bar":"y","id":"7"}"#));
    }

    #[tokio::test]
    async fn test_blocking_route_streams_buffered_body() {
        let (head, body) = dispatcher().dispatch_collect(get("/files/ab")).await.unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.content_length, Some(6000));
        assert_eq!(body.len(), 6000);
    }

    #[tokio::test]
    async fn test_unmatched_requests() {
        let dispatcher = dispatcher();
        let (head, body) = dispatcher.dispatch_collect(get("/nope")).await.unwrap();
        assert_eq!(head.status, StatusCode::NOT_FOUND);
        assert_eq!(body, Bytes::from_static(b"Could not GET /nope"));

        let request = RawRequest::new(Method::OPTIONS, "/items/1".parse().unwrap());
        let (head, body) = dispatcher.dispatch_collect(request).await.unwrap();
        assert_eq!(head.status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_ending_interceptors_run_after_delivery() {
        let ended = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ended);
        let mut chain = InterceptorChain::new();
        chain.register(
            Phase::Ending,
            0,
            move |ctx: &mut RequestContext| {
                flag.store(ctx.response().was_successful() == Some(true), Ordering::SeqCst);
            },
        );

        let mut registry = RouteRegistry::new();
        registry
            .add(Route::new(
                RouteMeta::get("/text").source(ParameterSource::Query),
                Arc::new(handler_fn(|_: &mut RequestContext, adapter: &mut TextAdapter| -> HandlerResult {
                    adapter.set_body("done");
                    Ok(Outcome::ok())
                })),
            ))
            .unwrap();
        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            Pipeline::new(PipelineSettings::default(), chain),
        );

        let (head, body) = dispatcher.dispatch_collect(get("/text")).await.unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(body, Bytes::from_static(b"done"));
        assert!(ended.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_inline_ejected_route_writes_many_frames() {
        let mut registry = RouteRegistry::new();
        registry
            .add(Route::new(
                RouteMeta::get("/ticks"),
                Arc::new(handler_fn(|ctx: &mut RequestContext, _: &mut TextAdapter| -> HandlerResult {
                    if let Some(sink) = ctx.sink_mut() {
                        sink.send_head(ResponseHead::new(StatusCode::OK))?;
                        for _ in 0..100 {
                            sink.write_all(b"tick\n")?;
                        }
                    }
                    Ok(Outcome::eject(StatusCode::OK))
                })),
            ))
            .unwrap();
        let dispatcher = Dispatcher::new(Arc::new(registry), Pipeline::default());

        let (head, body) = dispatcher.dispatch_collect(get("/ticks")).await.unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(body, Bytes::from("tick\n".repeat(100)));
    }

    #[tokio::test]
    async fn test_text_route_content_type() {
        let (head, body) = dispatcher().dispatch_collect(get("/text")).await.unwrap();
        assert_eq!(
            head.headers.get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(body, Bytes::from_static(b"plain"));
    }
}
