//! Two-stage handlers.
//!
//! A [`ChainLink`] runs first, validates or prepares the request, and fills
//! an [`InjectableParams`] set. If the request is still valid afterwards, the
//! injected values become the highest-precedence parameter source and the
//! target handler runs with the route adapter.

use std::any::type_name;
use std::io;
use std::sync::Arc;

use http::StatusCode;
use sluice_core::InjectableParams;
use tracing::debug;

use crate::context::RequestContext;
use crate::error::{HandlerError, RegistryError, RegistryResult};
use crate::handler::{Handler, HandlerResult, Outcome};
use crate::route::RouteRegistry;

/// The first stage of a chained handler.
pub trait ChainLink: Send + Sync + 'static {
    /// The handler run when this stage leaves the request valid.
    type Target: Handler;

    /// Runs the first stage. The returned status is used as-is if the
    /// request was invalidated.
    fn handle(
        &self,
        ctx: &mut RequestContext,
        next: &mut InjectableParams,
    ) -> Result<StatusCode, HandlerError>;
}

/// A [`ChainLink`] bound to its target handler instance.
pub struct Chained<C: ChainLink> {
    link: C,
    target: Arc<C::Target>,
}

impl<C: ChainLink> Chained<C> {
    pub fn new(link: C, target: Arc<C::Target>) -> Self {
        Self { link, target }
    }

    /// Binds `link` to the target instance held by `registry`.
    pub fn resolve(link: C, registry: &RouteRegistry) -> RegistryResult<Self> {
        registry
            .handler::<C::Target>()
            .map(|target| Self::new(link, target))
            .ok_or(RegistryError::UnknownHandler(type_name::<C::Target>()))
    }

    pub fn link(&self) -> &C {
        &self.link
    }

    pub fn target(&self) -> &Arc<C::Target> {
        &self.target
    }
}

impl<C: ChainLink> Handler for Chained<C> {
    type Adapter = <C::Target as Handler>::Adapter;

    fn handle(&self, ctx: &mut RequestContext, adapter: &mut Self::Adapter) -> HandlerResult {
        let mut next = InjectableParams::new();
        let status = self.link.handle(ctx, &mut next)?;

        if !ctx.request().is_valid() {
            debug!(link = type_name::<C>(), %status, "Chain link invalidated the request");
            return Ok(Outcome::status(status));
        }

        ctx.request_mut().inject(next);
        self.target.handle(ctx, adapter)
    }

    fn on_request_created(&self, ctx: &mut RequestContext) {
        self.target.on_request_created(ctx);
    }

    fn on_response_ready(&self, ctx: &mut RequestContext) {
        self.target.on_response_ready(ctx);
    }

    fn on_response_sent(&self, ctx: &mut RequestContext) {
        self.target.on_response_sent(ctx);
    }

    fn on_response_error(&self, ctx: &mut RequestContext, error: &io::Error) {
        self.target.on_response_error(ctx, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::context_for;
    use crate::route::{Route, RouteMeta};
    use sluice_core::TextAdapter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Greet {
        calls: AtomicUsize,
    }

    impl Handler for Greet {
        type Adapter = TextAdapter;

        fn handle(&self, ctx: &mut RequestContext, adapter: &mut TextAdapter) -> HandlerResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let user = ctx.request().params().get("user").unwrap_or("nobody");
            adapter.set_body(format!("hello {user}"));
            Ok(Outcome::ok())
        }
    }

    struct Authenticate;

    impl ChainLink for Authenticate {
        type Target = Greet;

        fn handle(
            &self,
            ctx: &mut RequestContext,
            next: &mut InjectableParams,
        ) -> Result<StatusCode, HandlerError> {
            if ctx.request().params().get("token") == Some("secret") {
                next.put("user", "admin");
                Ok(StatusCode::OK)
            } else {
                ctx.request_mut().invalidate_with("bad token");
                Ok(StatusCode::UNAUTHORIZED)
            }
        }
    }

    #[test]
    fn test_injected_params_reach_target() {
        let chained = Chained::new(Authenticate, Arc::new(Greet::default()));
        let (mut ctx, _) = context_for("/?token=secret&user=guest");
        let mut adapter = TextAdapter::default();

        let outcome = chained.handle(&mut ctx, &mut adapter).unwrap();
        assert_eq!(outcome.status_code(), StatusCode::OK);
        assert_eq!(adapter.body(), "hello admin");
    }

    #[test]
    fn test_invalid_first_stage_skips_target() {
        let target = Arc::new(Greet::default());
        let chained = Chained::new(Authenticate, Arc::clone(&target));
        let (mut ctx, _) = context_for("/?token=wrong");
        let mut adapter = TextAdapter::default();

        let outcome = chained.handle(&mut ctx, &mut adapter).unwrap();
        assert_eq!(outcome.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(target.calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.request().error(), Some("bad token"));
    }

    #[test]
    fn test_resolve_requires_registered_target() {
        let mut registry = RouteRegistry::new();
        assert!(matches!(
            Chained::resolve(Authenticate, &registry),
            Err(RegistryError::UnknownHandler(_))
        ));

        registry
            .add(Route::new(RouteMeta::get("/greet"), Arc::new(Greet::default())))
            .unwrap();
        assert!(Chained::resolve(Authenticate, &registry).is_ok());
    }
}
