//! Runs a handler and classifies the result.
//!
//! The processor never lets a handler error or panic escape: both become a
//! `500` with an [`ErrorAdapter`](sluice_core::ErrorAdapter) replacement.

use std::any::type_name;
use std::panic::{self, AssertUnwindSafe};

use http::StatusCode;
use sluice_core::{Adapter, Category, ErrorAdapter};
use tracing::{debug, error, warn};

use crate::context::RequestContext;
use crate::handler::{Disposition, Handler};
use crate::settings::PipelineSettings;
use crate::writer::{ResponseWriter, error_chain, panic_message};

/// Whether the request was still valid once the handler returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Valid,
    Invalid,
}

/// Which adapter the renderer should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterStatus {
    /// The route adapter.
    Original,
    /// The top replacement adapter.
    Replaced,
    /// Nothing; the handler sent the response itself.
    Ejected,
}

/// The classified result of running a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseState {
    pub status: StatusCode,
    pub request_status: RequestStatus,
    pub adapter_status: AdapterStatus,
}

impl ResponseState {
    pub fn valid(status: StatusCode, adapter_status: AdapterStatus) -> Self {
        Self {
            status,
            request_status: RequestStatus::Valid,
            adapter_status,
        }
    }

    /// An invalid request always renders a replacement.
    pub fn invalid(status: StatusCode) -> Self {
        Self {
            status,
            request_status: RequestStatus::Invalid,
            adapter_status: AdapterStatus::Replaced,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.request_status == RequestStatus::Valid
    }
}

/// Runs the handler of one exchange.
#[derive(Debug, Clone, Copy)]
pub struct HandlerProcessor<'a> {
    settings: &'a PipelineSettings,
}

impl<'a> HandlerProcessor<'a> {
    pub fn new(settings: &'a PipelineSettings) -> Self {
        Self { settings }
    }

    pub fn process<H: Handler>(
        &self,
        handler: &H,
        ctx: &mut RequestContext,
        adapter: &mut H::Adapter,
    ) -> ResponseState {
        if let Some(state) = self.check_buffered::<H>(ctx, adapter.content().category()) {
            return state;
        }

        if !ctx.request().is_valid() {
            let status = ctx.response().status().unwrap_or(StatusCode::BAD_REQUEST);
            let message = ctx
                .request()
                .error()
                .unwrap_or("Request was invalidated")
                .to_string();
            debug!(%status, %message, "Request invalidated before handling");
            ctx.response_mut()
                .replace_adapter(ResponseWriter::error_adapter(message));
            return ResponseState::invalid(status);
        }

        if !ctx.request_mut().has_all_required_parameters() {
            let missing: Vec<&str> = ctx
                .request()
                .missing_parameters()
                .iter()
                .map(String::as_str)
                .collect();
            let message = format!("Missing required parameters: [{}]", missing.join(", "));
            debug!(%message, "Rejecting request");

            let (request, response) = ctx.facets_mut();
            request.invalidate_with(&message);
            response.replace_adapter(ResponseWriter::error_adapter(message));
            return ResponseState::invalid(self.settings.missing_params_status);
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(ctx, adapter)));
        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                let adapter = ResponseWriter::handler_error(&e);
                return self.fail::<H>(ctx, adapter, error_chain(&*e));
            }
            Err(payload) => {
                let adapter = ResponseWriter::panic_error(&*payload);
                let trace = vec![panic_message(&*payload).to_string()];
                return self.fail::<H>(ctx, adapter, trace);
            }
        };

        let (status, disposition) = outcome.into_parts();
        if !ctx.request().is_valid() {
            if let Disposition::Replace(replacement) = disposition {
                ctx.response_mut().push_replacement(replacement);
            }
            // Only an error-shaped replacement may stand in for an invalid request.
            let error_shaped = ctx
                .response()
                .replacement()
                .is_some_and(|r| r.as_error().is_some());
            if !error_shaped {
                let message = ctx
                    .request()
                    .error()
                    .unwrap_or("Request was invalidated")
                    .to_string();
                ctx.response_mut()
                    .replace_adapter(ResponseWriter::error_adapter(message));
            }
            return ResponseState::invalid(status);
        }

        match disposition {
            Disposition::Continue if ctx.response().has_replacement() => {
                ResponseState::valid(status, AdapterStatus::Replaced)
            }
            Disposition::Continue => ResponseState::valid(status, AdapterStatus::Original),
            Disposition::Replace(mut replacement) => {
                let category = replacement.content().category();
                ctx.response_mut().push_replacement(replacement);
                self.check_buffered::<H>(ctx, category)
                    .unwrap_or(ResponseState::valid(status, AdapterStatus::Replaced))
            }
            Disposition::Eject => ResponseState::valid(status, AdapterStatus::Ejected),
        }
    }

    /// Re-applies the blocking check to a replacement pushed after the
    /// handler returned, such as one added by a response interceptor.
    pub fn recheck<H: Handler>(
        &self,
        ctx: &mut RequestContext,
        state: ResponseState,
    ) -> ResponseState {
        if !state.is_valid() || state.adapter_status == AdapterStatus::Ejected {
            return state;
        }
        let Some(category) = ctx
            .response_mut()
            .replacement_mut()
            .map(|r| r.content().category())
        else {
            return state;
        };
        self.check_buffered::<H>(ctx, category).unwrap_or(state)
    }

    /// Buffered bodies can only be streamed from a blocking worker.
    fn check_buffered<H: Handler>(
        &self,
        ctx: &mut RequestContext,
        category: Category,
    ) -> Option<ResponseState> {
        if category != Category::Buffered || ctx.route().is_blocking() {
            return None;
        }

        let message = format!(
            "Attempting to send BufferedResponse without using blocking I/O. Mark the handler [{}] as blocking",
            type_name::<H>()
        );
        warn!(handler = type_name::<H>(), "Buffered response on a non-blocking route");

        let (request, response) = ctx.facets_mut();
        request.invalidate_with(&message);
        response.replace_adapter(ResponseWriter::error_adapter(message));
        Some(ResponseState::invalid(StatusCode::INTERNAL_SERVER_ERROR))
    }

    fn fail<H: Handler>(
        &self,
        ctx: &mut RequestContext,
        mut adapter: ErrorAdapter,
        trace: Vec<String>,
    ) -> ResponseState {
        error!(
            handler = type_name::<H>(),
            error = %adapter.message(),
            "Handler failed"
        );
        if self.settings.prints_stack_trace() {
            error!(trace = ?trace, "Handler failure trace");
        }
        if self.settings.embeds_stack_trace() {
            adapter.set_stack_trace(trace);
        }

        let (request, response) = ctx.facets_mut();
        request.invalidate_with(adapter.message());
        response.replace_adapter(adapter);
        ResponseState::invalid(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::context_for;
    use crate::handler::{HandlerResult, Outcome, handler_fn};
    use sluice_core::{BufferedAdapter, TextAdapter};

    fn settings() -> PipelineSettings {
        PipelineSettings::default()
    }

    fn error_message(ctx: &RequestContext) -> Option<String> {
        ctx.response()
            .replacement()
            .and_then(|a| a.as_error())
            .map(|e| e.message().to_string())
    }

    fn ok_text(_: &mut RequestContext, adapter: &mut TextAdapter) -> HandlerResult {
        adapter.set_body("ok");
        Ok(Outcome::ok())
    }

    #[test]
    fn test_valid_original() {
        let settings = settings();
        let (mut ctx, _) = context_for("/");
        let mut adapter = TextAdapter::default();
        let state = HandlerProcessor::new(&settings).process(&handler_fn(ok_text), &mut ctx, &mut adapter);
        assert_eq!(state, ResponseState::valid(StatusCode::OK, AdapterStatus::Original));
    }

    #[test]
    fn test_invalid_before_handling_keeps_prior_status() {
        let settings = settings();
        let (mut ctx, _) = context_for("/");
        ctx.request_mut().invalidate_with("no entry");
        ctx.response_mut().set_status(StatusCode::FORBIDDEN);

        let mut adapter = TextAdapter::default();
        let state = HandlerProcessor::new(&settings).process(&handler_fn(ok_text), &mut ctx, &mut adapter);
        assert_eq!(state, ResponseState::invalid(StatusCode::FORBIDDEN));
        assert_eq!(error_message(&ctx).as_deref(), Some("no entry"));
        assert_eq!(adapter.body(), "");
    }

    #[test]
    fn test_missing_required_parameters() {
        let settings = settings();
        let (mut ctx, _) = context_for("/?a=1");
        ctx.request_mut().require_parameters(["a", "c", "b"]).unwrap();

        let mut adapter = TextAdapter::default();
        let state = HandlerProcessor::new(&settings).process(&handler_fn(ok_text), &mut ctx, &mut adapter);
        assert_eq!(state, ResponseState::invalid(StatusCode::BAD_REQUEST));
        assert_eq!(
            error_message(&ctx).as_deref(),
            Some("Missing required parameters: [b, c]")
        );
        assert!(ctx.request().parameters_inspected());
    }

    #[test]
    fn test_handler_error_becomes_500() {
        let settings = settings();
        let (mut ctx, _) = context_for("/");
        let handler = handler_fn(|_: &mut RequestContext, _: &mut TextAdapter| -> HandlerResult {
            Err("database unavailable".into())
        });

        let mut adapter = TextAdapter::default();
        let state = HandlerProcessor::new(&settings).process(&handler, &mut ctx, &mut adapter);
        assert_eq!(state, ResponseState::invalid(StatusCode::INTERNAL_SERVER_ERROR));

        let replacement = ctx.response().replacement().and_then(|a| a.as_error()).unwrap();
        assert_eq!(
            replacement.message(),
            "Caught runtime exception: HandlerError - database unavailable"
        );
        assert_eq!(
            replacement.stack_trace(),
            Some(&["database unavailable".to_string()][..])
        );
        assert!(!ctx.request().is_valid());
    }

    #[test]
    fn test_panic_is_caught() {
        let mut settings = settings();
        settings.mode = crate::settings::DeploymentMode::Production;
        let (mut ctx, _) = context_for("/");
        let handler = handler_fn(|_: &mut RequestContext, _: &mut TextAdapter| -> HandlerResult {
            panic!("kaboom")
        });

        let mut adapter = TextAdapter::default();
        let state = HandlerProcessor::new(&settings).process(&handler, &mut ctx, &mut adapter);
        assert_eq!(state, ResponseState::invalid(StatusCode::INTERNAL_SERVER_ERROR));

        let replacement = ctx.response().replacement().and_then(|a| a.as_error()).unwrap();
        assert_eq!(replacement.message(), "Caught runtime exception: Panic - kaboom");
        assert!(replacement.stack_trace().is_none());
    }

    #[test]
    fn test_invalidated_during_handling() {
        let settings = settings();
        let (mut ctx, _) = context_for("/");
        let handler = handler_fn(|ctx: &mut RequestContext, _: &mut TextAdapter| -> HandlerResult {
            ctx.request_mut().invalidate_with("conflict");
            Ok(StatusCode::CONFLICT.into())
        });

        let mut adapter = TextAdapter::default();
        let state = HandlerProcessor::new(&settings).process(&handler, &mut ctx, &mut adapter);
        assert_eq!(state, ResponseState::invalid(StatusCode::CONFLICT));
        assert_eq!(error_message(&ctx).as_deref(), Some("conflict"));
    }

    #[test]
    fn test_invalidated_after_non_error_replacement() {
        let settings = settings();
        let (mut ctx, _) = context_for("/");
        let handler = handler_fn(|ctx: &mut RequestContext, _: &mut TextAdapter| -> HandlerResult {
            ctx.response_mut().replace_adapter(TextAdapter::new("partial"));
            ctx.request_mut().invalidate_with("bad");
            Ok(StatusCode::CONFLICT.into())
        });

        let mut adapter = TextAdapter::default();
        let state = HandlerProcessor::new(&settings).process(&handler, &mut ctx, &mut adapter);
        assert_eq!(state, ResponseState::invalid(StatusCode::CONFLICT));
        assert_eq!(error_message(&ctx).as_deref(), Some("bad"));
    }

    #[test]
    fn test_invalidated_with_replace_outcome() {
        let settings = settings();
        let processor = HandlerProcessor::new(&settings);

        let (mut ctx, _) = context_for("/");
        let with_error = handler_fn(|ctx: &mut RequestContext, _: &mut TextAdapter| -> HandlerResult {
            ctx.request_mut().invalidate_with("ignored");
            Ok(Outcome::replace(StatusCode::GONE, ErrorAdapter::new("moved away")))
        });
        let state = processor.process(&with_error, &mut ctx, &mut TextAdapter::default());
        assert_eq!(state, ResponseState::invalid(StatusCode::GONE));
        assert_eq!(error_message(&ctx).as_deref(), Some("moved away"));

        let (mut ctx, _) = context_for("/");
        let with_text = handler_fn(|ctx: &mut RequestContext, _: &mut TextAdapter| -> HandlerResult {
            ctx.request_mut().invalidate_with("bad input");
            Ok(Outcome::replace(StatusCode::BAD_REQUEST, TextAdapter::new("partial")))
        });
        let state = processor.process(&with_text, &mut ctx, &mut TextAdapter::default());
        assert_eq!(state, ResponseState::invalid(StatusCode::BAD_REQUEST));
        assert_eq!(error_message(&ctx).as_deref(), Some("bad input"));
    }

    #[test]
    fn test_replacement_and_eject() {
        let settings = settings();
        let processor = HandlerProcessor::new(&settings);

        let (mut ctx, _) = context_for("/");
        let replace = handler_fn(|_: &mut RequestContext, _: &mut TextAdapter| -> HandlerResult {
            Ok(Outcome::replace(StatusCode::ACCEPTED, TextAdapter::new("other")))
        });
        let state = processor.process(&replace, &mut ctx, &mut TextAdapter::default());
        assert_eq!(state, ResponseState::valid(StatusCode::ACCEPTED, AdapterStatus::Replaced));

        let (mut ctx, _) = context_for("/");
        let eject = handler_fn(|_: &mut RequestContext, _: &mut TextAdapter| -> HandlerResult {
            Ok(Outcome::eject(StatusCode::OK))
        });
        let state = processor.process(&eject, &mut ctx, &mut TextAdapter::default());
        assert_eq!(state, ResponseState::valid(StatusCode::OK, AdapterStatus::Ejected));
    }

    #[test]
    fn test_buffered_on_non_blocking_route() {
        let settings = settings();
        let (mut ctx, _) = context_for("/");
        let handler = handler_fn(|_: &mut RequestContext, adapter: &mut BufferedAdapter| -> HandlerResult {
            adapter.set_bytes(b"data".to_vec());
            Ok(Outcome::ok())
        });

        let mut adapter = BufferedAdapter::default();
        let state = HandlerProcessor::new(&settings).process(&handler, &mut ctx, &mut adapter);
        assert_eq!(state, ResponseState::invalid(StatusCode::INTERNAL_SERVER_ERROR));
        let message = error_message(&ctx).unwrap();
        assert!(message.starts_with("Attempting to send BufferedResponse without using blocking I/O"));
        assert!(!adapter.body().is_set());
    }
}
