//! Responses for requests no route matched.

use std::io::{self, Write};

use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, StatusCode, Uri};
use sluice_framework::{Completion, ResponseHead, ResponseSink};
use tracing::debug;

/// Answers an unmatched request: `204` for `OPTIONS`, otherwise `404` with
/// a plain-text body naming the method and URI.
pub fn respond_unmatched(method: &Method, uri: &Uri, mut sink: Box<dyn ResponseSink>) {
    let written = if method == Method::OPTIONS {
        options(sink.as_mut())
    } else {
        not_found(method, uri, sink.as_mut())
    };

    match written {
        Ok(()) => sink.finish(Completion::noop()),
        Err(e) => debug!(error = %e, "Failed to send default response"),
    }
}

fn options(sink: &mut dyn ResponseSink) -> io::Result<()> {
    let mut head = ResponseHead::new(StatusCode::NO_CONTENT);
    head.content_length = Some(0);
    sink.send_head(head)
}

fn not_found(method: &Method, uri: &Uri, sink: &mut dyn ResponseSink) -> io::Result<()> {
    let body = format!("Could not {method} {uri}");
    debug!(%method, %uri, "No route matched");

    let mut head = ResponseHead::new(StatusCode::NOT_FOUND);
    head.headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    head.content_length = Some(body.len() as u64);
    sink.send_head(head)?;
    sink.write_all(body.as_bytes())?;
    sink.flush()
}
