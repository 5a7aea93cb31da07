//! Turns a classified response into body bytes.
//!
//! Valid responses render the adapter that will actually be sent: the top
//! replacement if there is one, otherwise the route adapter. Invalid
//! responses render the error replacement in the shape of the route's own
//! category, so a JSON route keeps answering in JSON and a text route in
//! text.

use std::fmt;
use std::io::Read;

use sluice_core::{Adapter, Category, Content, ErrorAdapter};
use tracing::warn;

use crate::context::RequestContext;
use crate::processor::{AdapterStatus, ResponseState};
use crate::settings::PipelineSettings;
use crate::writer::ResponseWriter;

/// A rendered response body.
pub enum RenderedBody {
    /// Nothing to send; the handler ejected.
    None,
    Bytes(Vec<u8>),
    /// A stream copied to the sink in chunks.
    Stream {
        reader: Box<dyn Read + Send>,
        length: Option<u64>,
    },
}

impl fmt::Debug for RenderedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream { length, .. } => {
                f.debug_struct("Stream").field("length", length).finish()
            }
        }
    }
}

/// Renders response bodies.
#[derive(Debug, Clone, Copy)]
pub struct Renderer<'a> {
    settings: &'a PipelineSettings,
    writer: ResponseWriter,
}

impl<'a> Renderer<'a> {
    pub fn new(settings: &'a PipelineSettings) -> Self {
        Self {
            settings,
            writer: ResponseWriter::new(settings.json),
        }
    }

    pub fn render(
        &self,
        state: &ResponseState,
        ctx: &mut RequestContext,
        adapter: &mut (dyn Adapter + 'static),
    ) -> RenderedBody {
        if state.adapter_status == AdapterStatus::Ejected {
            return RenderedBody::None;
        }
        if state.is_valid() {
            return self.render_valid(ctx, adapter);
        }

        let category = adapter.content().category();
        match ctx.response().replacement().and_then(|r| r.as_error()) {
            Some(error) => self.render_error(category, error),
            None => {
                let message = format!(
                    "Replacement adapter for [{}] does not carry an error signature",
                    adapter.type_name()
                );
                warn!(%message, "Cannot render invalid response");
                self.render_error(category, &ErrorAdapter::new(message))
            }
        }
    }

    fn render_valid(
        &self,
        ctx: &mut RequestContext,
        adapter: &mut (dyn Adapter + 'static),
    ) -> RenderedBody {
        let top = match ctx.response_mut().replacement_mut() {
            Some(replacement) => replacement,
            None => adapter,
        };
        let type_name = top.type_name();

        match top.content() {
            Content::Structured(body) => RenderedBody::Bytes(self.writer.to_json(body, type_name)),
            Content::Text(text) => RenderedBody::Bytes(text.as_bytes().to_vec()),
            Content::Buffered(body) => match body.take_reader() {
                Some(reader) => RenderedBody::Stream {
                    reader,
                    length: body.length(),
                },
                None => RenderedBody::Bytes(Vec::new()),
            },
        }
    }

    fn render_error(&self, category: Category, error: &ErrorAdapter) -> RenderedBody {
        match category {
            Category::Structured => RenderedBody::Bytes(self.writer.to_json(error, "ErrorAdapter")),
            Category::Text | Category::Buffered => {
                RenderedBody::Bytes(self.error_text(error).into_bytes())
            }
        }
    }

    fn error_text(&self, error: &ErrorAdapter) -> String {
        match error.stack_trace() {
            Some(trace) if self.settings.embeds_stack_trace() => format!(
                "{}\n\nStack Trace:\n{}",
                error.message(),
                trace.join("\n\t")
            ),
            _ => error.message().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::context_for;
    use crate::settings::DeploymentMode;
    use http::StatusCode;
    use serde::Serialize;
    use sluice_core::{BufferedAdapter, TextAdapter, impl_structured_adapter};

    #[derive(Debug, Default, Serialize)]
    struct Item {
        id: u32,
    }

    impl_structured_adapter!(Item);

    fn bytes(body: RenderedBody) -> String {
        match body {
            RenderedBody::Bytes(bytes) => String::from_utf8(bytes).unwrap(),
            other => panic!("expected bytes, got {other:?}"),
        }
    }

    fn valid(adapter_status: AdapterStatus) -> ResponseState {
        ResponseState::valid(StatusCode::OK, adapter_status)
    }

    #[test]
    fn test_valid_structured_and_text() {
        let settings = PipelineSettings::default();
        let renderer = Renderer::new(&settings);

        let (mut ctx, _) = context_for("/");
        let mut item = Item { id: 4 };
        let body = renderer.render(&valid(AdapterStatus::Original), &mut ctx, &mut item);
        assert_eq!(bytes(body), r#"{"id":4}"#);

        let (mut ctx, _) = context_for("/");
        ctx.response_mut().replace_adapter(TextAdapter::new("swapped"));
        let body = renderer.render(&valid(AdapterStatus::Replaced), &mut ctx, &mut Item::default());
        assert_eq!(bytes(body), "swapped");
    }

    #[test]
    fn test_valid_buffered_streams() {
        let settings = PipelineSettings::default();
        let (mut ctx, _) = context_for("/");
        let mut adapter = BufferedAdapter::default();
        adapter.set_bytes(b"abc".to_vec());

        let body = Renderer::new(&settings).render(&valid(AdapterStatus::Original), &mut ctx, &mut adapter);
        match body {
            RenderedBody::Stream { mut reader, length } => {
                assert_eq!(length, Some(3));
                let mut out = String::new();
                reader.read_to_string(&mut out).unwrap();
                assert_eq!(out, "abc");
            }
            other => panic!("expected stream, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_follows_route_category() {
        let settings = PipelineSettings::default();
        let renderer = Renderer::new(&settings);
        let state = ResponseState::invalid(StatusCode::BAD_REQUEST);

        let (mut ctx, _) = context_for("/");
        ctx.response_mut().replace_adapter(ErrorAdapter::new("bad"));
        let body = renderer.render(&state, &mut ctx, &mut Item::default());
        assert_eq!(bytes(body), r#"{"message":"bad"}"#);

        let (mut ctx, _) = context_for("/");
        ctx.response_mut().replace_adapter(ErrorAdapter::new("bad"));
        let body = renderer.render(&state, &mut ctx, &mut TextAdapter::default());
        assert_eq!(bytes(body), "bad");
    }

    #[test]
    fn test_text_error_embeds_trace_in_development() {
        let mut settings = PipelineSettings::default();
        let state = ResponseState::invalid(StatusCode::INTERNAL_SERVER_ERROR);
        let error = ErrorAdapter::new("boom").with_stack_trace(vec!["a".into(), "b".into()]);

        let (mut ctx, _) = context_for("/");
        ctx.response_mut().replace_adapter(error.clone());
        let body = Renderer::new(&settings).render(&state, &mut ctx, &mut TextAdapter::default());
        assert_eq!(bytes(body), "boom\n\nStack Trace:\na\n\tb");

        settings.mode = DeploymentMode::Production;
        let (mut ctx, _) = context_for("/");
        ctx.response_mut().replace_adapter(error);
        let body = Renderer::new(&settings).render(&state, &mut ctx, &mut TextAdapter::default());
        assert_eq!(bytes(body), "boom");
    }

    #[test]
    fn test_invalid_without_error_replacement() {
        let settings = PipelineSettings::default();
        let state = ResponseState::invalid(StatusCode::BAD_REQUEST);
        let (mut ctx, _) = context_for("/");
        ctx.response_mut().replace_adapter(TextAdapter::new("not an error"));

        let body = Renderer::new(&settings).render(&state, &mut ctx, &mut TextAdapter::default());
        let text = bytes(body);
        assert!(text.starts_with("Replacement adapter for ["));
        assert!(text.ends_with("] does not carry an error signature"));
    }

    #[test]
    fn test_ejected_renders_nothing() {
        let settings = PipelineSettings::default();
        let (mut ctx, _) = context_for("/");
        let body = Renderer::new(&settings).render(&valid(AdapterStatus::Ejected), &mut ctx, &mut TextAdapter::default());
        assert!(matches!(body, RenderedBody::None));
    }
}
