//! Handler system for the Sluice framework.
//!
//! A [`Handler`] receives the exchange context and a pooled adapter of its
//! declared type, fills the adapter in, and returns an [`Outcome`]: the status
//! code plus what should happen to the adapter afterwards.
//!
//! # Example
//!
//! ```rust,ignore
//! use sluice::prelude::*;
//!
//! struct Greet;
//!
//! impl Handler for Greet {
//!     type Adapter = TextAdapter;
//!
//!     fn handle(&self, ctx: &mut RequestContext, adapter: &mut TextAdapter) -> HandlerResult {
//!         let name = ctx.request().params().get_or("name", "world".to_string());
//!         adapter.set_body(format!("hello, {name}"));
//!         Ok(StatusCode::OK.into())
//!     }
//! }
//! ```

use std::fmt;
use std::io;
use std::marker::PhantomData;

use http::StatusCode;
use sluice_core::Adapter;

use crate::context::RequestContext;
use crate::error::HandlerError;

/// Result type returned by handlers.
pub type HandlerResult = Result<Outcome, HandlerError>;

/// What happens to the route adapter once a handler returns.
pub enum Disposition {
    /// Render the route adapter.
    Continue,
    /// Render this adapter instead.
    Replace(Box<dyn Adapter>),
    /// The handler already sent the response; render nothing.
    Eject,
}

impl fmt::Debug for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => f.write_str("Continue"),
            Self::Replace(adapter) => f.debug_tuple("Replace").field(&adapter.type_name()).finish(),
            Self::Eject => f.write_str("Eject"),
        }
    }
}

/// Status code and adapter disposition returned by a handler.
#[derive(Debug)]
pub struct Outcome {
    status: StatusCode,
    disposition: Disposition,
}

impl Outcome {
    /// Renders the route adapter with `status`.
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            disposition: Disposition::Continue,
        }
    }

    /// `200 OK`, rendering the route adapter.
    pub fn ok() -> Self {
        Self::status(StatusCode::OK)
    }

    /// Renders `adapter` instead of the route adapter.
    pub fn replace(status: StatusCode, adapter: impl Adapter) -> Self {
        Self {
            status,
            disposition: Disposition::Replace(Box::new(adapter)),
        }
    }

    /// Marks the response as already sent by the handler.
    pub fn eject(status: StatusCode) -> Self {
        Self {
            status,
            disposition: Disposition::Eject,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn disposition(&self) -> &Disposition {
        &self.disposition
    }

    pub fn into_parts(self) -> (StatusCode, Disposition) {
        (self.status, self.disposition)
    }
}

impl From<StatusCode> for Outcome {
    fn from(status: StatusCode) -> Self {
        Self::status(status)
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// A request handler bound to one adapter type.
///
/// Handlers run synchronously. Routes marked blocking, and every request
/// carrying a body, are moved to a blocking worker before the handler is
/// invoked, so a handler may perform blocking I/O there.
///
/// Returning an error or panicking produces a `500` response with an error
/// body; neither escapes the pipeline.
pub trait Handler: Send + Sync + 'static {
    /// The pooled adapter this handler fills in.
    type Adapter: Adapter;

    fn handle(&self, ctx: &mut RequestContext, adapter: &mut Self::Adapter) -> HandlerResult;

    /// Called once the context exists, before request interceptors run.
    fn on_request_created(&self, _ctx: &mut RequestContext) {}

    /// Called after response interceptors, right before rendering.
    fn on_response_ready(&self, _ctx: &mut RequestContext) {}

    /// Called once the transport delivered the response.
    fn on_response_sent(&self, _ctx: &mut RequestContext) {}

    /// Called if the transport failed to deliver the response.
    fn on_response_error(&self, _ctx: &mut RequestContext, _error: &io::Error) {}
}

// ============================================================================
// HandlerFn - closures as handlers
// ============================================================================

/// A closure wrapped as a [`Handler`].
pub struct HandlerFn<A, F> {
    f: F,
    _marker: PhantomData<fn() -> A>,
}

impl<A, F> HandlerFn<A, F> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<A, F> Handler for HandlerFn<A, F>
where
    A: Adapter,
    F: Fn(&mut RequestContext, &mut A) -> HandlerResult + Send + Sync + 'static,
{
    type Adapter = A;

    fn handle(&self, ctx: &mut RequestContext, adapter: &mut A) -> HandlerResult {
        (self.f)(ctx, adapter)
    }
}

/// Converts a closure into a handler.
pub fn handler_fn<A, F>(f: F) -> HandlerFn<A, F>
where
    A: Adapter,
    F: Fn(&mut RequestContext, &mut A) -> HandlerResult + Send + Sync + 'static,
{
    HandlerFn::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::context_for;
    use sluice_core::{ErrorAdapter, TextAdapter};

    #[test]
    fn test_outcome_constructors() {
        let outcome: Outcome = StatusCode::CREATED.into();
        assert_eq!(outcome.status_code(), StatusCode::CREATED);
        assert!(matches!(outcome.disposition(), Disposition::Continue));

        let outcome = Outcome::replace(StatusCode::OK, ErrorAdapter::new("x"));
        assert!(matches!(outcome.disposition(), Disposition::Replace(_)));

        let (status, disposition) = Outcome::eject(StatusCode::ACCEPTED).into_parts();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(matches!(disposition, Disposition::Eject));
    }

    #[test]
    fn test_handler_fn() {
        let handler = handler_fn(|ctx: &mut RequestContext, adapter: &mut TextAdapter| {
            let name = ctx.request().params().get_or("name", "world".to_string());
            adapter.set_body(format!("hello, {name}"));
            Ok(Outcome::ok())
        });

        let (mut ctx, _) = context_for("/?name=sluice");
        let mut adapter = TextAdapter::default();
        let outcome = handler.handle(&mut ctx, &mut adapter).unwrap();
        assert_eq!(outcome.status_code(), StatusCode::OK);
        assert_eq!(adapter.body(), "hello, sluice");
    }
}
