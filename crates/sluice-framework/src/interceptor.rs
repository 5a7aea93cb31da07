//! Priority-ordered interceptors around handler execution.
//!
//! Interceptors are registered at boot into one of three [`Phase`]s and run
//! in ascending priority:
//!
//! - [`Phase::Request`]: before the handler; may invalidate the request
//! - [`Phase::Response`]: after the handler, before the body is rendered;
//!   may replace the adapter
//! - [`Phase::Ending`]: after the transport reported delivery or failure;
//!   runs exactly once per exchange
//!
//! Registering a second interceptor at a priority already taken in the same
//! phase replaces the first one.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::RequestContext;

/// The three interception points of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Request,
    Response,
    Ending,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Ending => "ending",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A callback run at one interception point.
pub trait Interceptor: Send + Sync + 'static {
    fn intercept(&self, ctx: &mut RequestContext);
}

impl<F> Interceptor for F
where
    F: Fn(&mut RequestContext) + Send + Sync + 'static,
{
    fn intercept(&self, ctx: &mut RequestContext) {
        self(ctx)
    }
}

type Slots = BTreeMap<i32, Arc<dyn Interceptor>>;

/// The interceptors of all three phases.
///
/// Populated during boot and shared immutably afterwards.
#[derive(Default, Clone)]
pub struct InterceptorChain {
    request: Slots,
    response: Slots,
    ending: Slots,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self, phase: Phase) -> &Slots {
        match phase {
            Phase::Request => &self.request,
            Phase::Response => &self.response,
            Phase::Ending => &self.ending,
        }
    }

    fn slots_mut(&mut self, phase: Phase) -> &mut Slots {
        match phase {
            Phase::Request => &mut self.request,
            Phase::Response => &mut self.response,
            Phase::Ending => &mut self.ending,
        }
    }

    /// Registers an interceptor, returning `true` if it replaced one at the
    /// same priority.
    pub fn register(
        &mut self,
        phase: Phase,
        priority: i32,
        interceptor: impl Interceptor,
    ) -> bool {
        let replaced = self
            .slots_mut(phase)
            .insert(priority, Arc::new(interceptor))
            .is_some();

        if replaced {
            warn!(%phase, priority, "Interceptor priority already taken, replacing previous registration");
        } else {
            debug!(%phase, priority, "Registered interceptor");
        }
        replaced
    }

    pub fn len(&self, phase: Phase) -> usize {
        self.slots(phase).len()
    }

    pub fn is_empty(&self) -> bool {
        self.request.is_empty() && self.response.is_empty() && self.ending.is_empty()
    }

    /// Runs the interceptors of `phase` in ascending priority until one of
    /// them ends interception.
    pub fn run(&self, phase: Phase, ctx: &mut RequestContext) {
        ctx.begin_phase();
        for interceptor in self.slots(phase).values() {
            if ctx.intercepts_ended() {
                break;
            }
            interceptor.intercept(ctx);
        }
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("request", &self.request.keys().collect::<Vec<_>>())
            .field("response", &self.response.keys().collect::<Vec<_>>())
            .field("ending", &self.ending.keys().collect::<Vec<_>>())
            .finish()
    }
}
