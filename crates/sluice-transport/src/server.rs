//! HTTP server built on axum.
//!
//! Every method and path is routed to a single catch-all handler that hands
//! the request to the [`Dispatcher`]. The response head arrives first and
//! becomes the axum response; body chunks are streamed as they are written
//! by the pipeline.
//!
//! ```text
//! TcpListener ─► axum Router (/{*path}, /) ─► Dispatcher ─► Pipeline
//!                          ▲                                   │
//!                          └──── ChannelResponse ◄─ ChannelSink┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header::CONTENT_LENGTH},
    response::{IntoResponse, Response},
    routing::any,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::{Dispatcher, RawRequest};
use crate::error::{TransportError, TransportResult};
use crate::sink::ChannelResponse;

// ─── Server lifecycle ─────────────────────────────────────────────────────────

/// A running server.
///
/// Dropping the handle does not stop the server; call
/// [`shutdown`](Self::shutdown).
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_token: CancellationToken,
    join: JoinHandle<()>,
}

impl ServerHandle {
    /// The address the listener is bound to, including an ephemeral port.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Asks the server to stop accepting connections.
    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }

    /// Returns a token that stops the server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Waits for the serve loop to exit.
    pub async fn stopped(self) {
        if let Err(e) = self.join.await {
            error!(error = %e, "Server task failed");
        }
    }
}

/// Binds `addr` and serves requests through `dispatcher` until shut down.
pub async fn serve(addr: &str, dispatcher: Dispatcher) -> TransportResult<ServerHandle> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    let local_addr = listener.local_addr()?;

    let router = build_router(Arc::new(dispatcher));
    let shutdown_token = CancellationToken::new();
    let token = shutdown_token.clone();

    info!(addr = %local_addr, "HTTP server listening");

    let join = tokio::spawn(async move {
        let server = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        );
        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!(error = %e, "HTTP server error");
                }
            }
            () = token.cancelled() => {
                info!(addr = %local_addr, "HTTP server shutting down");
            }
        }
    });

    Ok(ServerHandle {
        local_addr,
        shutdown_token,
        join,
    })
}

// ─── Router construction ──────────────────────────────────────────────────────

fn build_router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/{*path}", any(dispatch))
        .route("/", any(dispatch))
        .with_state(dispatcher)
}

// ─── Dispatch ─────────────────────────────────────────────────────────────────

async fn dispatch(
    State(dispatcher): State<Arc<Dispatcher>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    debug!(%method, %uri, peer = %addr, "Incoming request");
    let request = RawRequest {
        method,
        uri,
        headers,
        peer_addr: Some(addr),
        body,
    };
    into_response(dispatcher.dispatch(request)).await
}

async fn into_response(response: ChannelResponse) -> Response {
    let (head, body) = match response.into_parts().await {
        Ok(parts) => parts,
        Err(e) => {
            warn!(error = %e, "Pipeline produced no response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = head.status;
    *response.headers_mut() = head.headers;
    if let Some(length) = head.content_length {
        response
            .headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from(length));
    }
    response
}
