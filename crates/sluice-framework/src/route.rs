//! Route metadata and the boot-time route registry.
//!
//! Routes are registered explicitly as `(metadata, handler)` pairs. Each
//! [`Route`] owns the handler instance and the [`AdapterPool`] for the
//! handler's adapter type, and is stored type-erased as a [`BoxedRoute`].

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use http::Method;
use sluice_core::{AdapterPool, ParameterSource, PoolStats};
use tracing::info;

use crate::error::{RegistryError, RegistryResult};
use crate::handler::Handler;
use crate::pipeline::Pipeline;
use crate::request::IncomingRequest;
use crate::settings::{DeploymentMode, PipelineSettings};
use crate::sink::ResponseSink;

// ============================================================================
// RouteMeta
// ============================================================================

/// Declarative description of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMeta {
    method: Method,
    path: String,
    aliases: Vec<String>,
    required: BTreeSet<String>,
    source: Option<ParameterSource>,
    blocking: bool,
    content_type: Option<String>,
    ignored_modes: Vec<DeploymentMode>,
}

impl RouteMeta {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            aliases: Vec::new(),
            required: BTreeSet::new(),
            source: None,
            blocking: false,
            content_type: None,
            ignored_modes: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Serves the route under an additional path.
    pub fn alias(mut self, path: impl Into<String>) -> Self {
        self.aliases.push(path.into());
        self
    }

    /// Requires parameters to be present in any source.
    pub fn require<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Overrides the per-method default parameter source.
    pub fn source(mut self, source: ParameterSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Runs the handler on a blocking worker.
    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    /// Sets the response content type.
    pub fn produces(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Skips registration when the application runs in `mode`.
    pub fn ignore_in(mut self, mode: DeploymentMode) -> Self {
        self.ignored_modes.push(mode);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// The primary path followed by every alias.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.path.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    pub fn required(&self) -> &BTreeSet<String> {
        &self.required
    }

    pub fn explicit_source(&self) -> Option<ParameterSource> {
        self.source
    }

    /// The declared source, or the configured default for the method.
    pub fn effective_source(&self, settings: &PipelineSettings) -> ParameterSource {
        self.source
            .unwrap_or_else(|| settings.default_source(&self.method))
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn is_ignored_in(&self, mode: DeploymentMode) -> bool {
        self.ignored_modes.contains(&mode)
    }
}

// ============================================================================
// PathTemplate
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Capture(String),
    Rest(String),
}

/// A path template such as `/users/{id}` or `/files/{*path}`.
///
/// Empty segments are ignored, so trailing slashes do not matter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(path: &str) -> RegistryResult<Self> {
        if !path.starts_with('/') {
            return Err(RegistryError::invalid_path(path, "must start with '/'"));
        }

        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(name) => match name.strip_prefix('*') {
                    Some(_) if i + 1 != parts.len() => {
                        return Err(RegistryError::invalid_path(
                            path,
                            "catch-all capture must be the last segment",
                        ));
                    }
                    Some(rest) if is_capture_name(rest) => Segment::Rest(rest.to_string()),
                    None if is_capture_name(name) => Segment::Capture(name.to_string()),
                    _ => return Err(RegistryError::invalid_path(path, "invalid capture name")),
                },
                None if part.contains(['{', '}']) => {
                    return Err(RegistryError::invalid_path(path, "unbalanced braces"));
                }
                None => Segment::Literal(part.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Matches `path`, returning the captures in template order.
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut captures = Vec::new();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(literal) => {
                    if parts.get(i) != Some(&literal.as_str()) {
                        return None;
                    }
                }
                Segment::Capture(name) => {
                    captures.push((name.clone(), parts.get(i)?.to_string()));
                }
                Segment::Rest(name) => {
                    captures.push((name.clone(), parts.get(i..)?.join("/")));
                    return Some(captures);
                }
            }
        }

        (parts.len() == self.segments.len()).then_some(captures)
    }

    /// Canonical shape used to detect conflicting templates: capture names
    /// are erased.
    fn shape(&self) -> String {
        let mut shape = String::new();
        for segment in &self.segments {
            shape.push('/');
            match segment {
                Segment::Literal(literal) => shape.push_str(literal),
                Segment::Capture(_) => shape.push_str("{}"),
                Segment::Rest(_) => shape.push_str("{*}"),
            }
        }
        shape
    }

    /// Higher for more specific templates: literals beat captures, and
    /// captures beat catch-alls.
    fn specificity(&self) -> (usize, usize) {
        let literals = self
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count();
        let fixed = self
            .segments
            .iter()
            .filter(|s| !matches!(s, Segment::Rest(_)))
            .count();
        (literals, fixed)
    }
}

fn is_capture_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

// ============================================================================
// Route and RouteService
// ============================================================================

/// A route with its type erased, as stored by the registry.
pub trait RouteService: Send + Sync {
    fn meta(&self) -> &Arc<RouteMeta>;

    /// Type name of the handler, for diagnostics.
    fn handler_name(&self) -> &'static str;

    fn pool_stats(&self) -> PoolStats;

    /// Runs one request through the pipeline.
    fn serve(&self, pipeline: &Pipeline, incoming: IncomingRequest, sink: Box<dyn ResponseSink>);
}

/// A type-erased route shared across requests.
pub type BoxedRoute = Arc<dyn RouteService>;

/// A handler bound to its metadata and adapter pool.
pub struct Route<H: Handler> {
    meta: Arc<RouteMeta>,
    handler: Arc<H>,
    pool: Arc<AdapterPool<H::Adapter>>,
}

impl<H> Route<H>
where
    H: Handler,
    H::Adapter: Default,
{
    pub fn new(meta: RouteMeta, handler: Arc<H>) -> Self {
        Self::with_pool(meta, handler, AdapterPool::new())
    }
}

impl<H: Handler> Route<H> {
    /// Builds a route whose adapters come from a fallible factory.
    pub fn with_factory<F>(meta: RouteMeta, handler: Arc<H>, factory: F) -> Self
    where
        F: Fn() -> Option<H::Adapter> + Send + Sync + 'static,
    {
        Self::with_pool(meta, handler, AdapterPool::with_factory(factory))
    }

    pub fn with_pool(meta: RouteMeta, handler: Arc<H>, pool: Arc<AdapterPool<H::Adapter>>) -> Self {
        Self {
            meta: Arc::new(meta),
            handler,
            pool,
        }
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    pub fn pool(&self) -> &Arc<AdapterPool<H::Adapter>> {
        &self.pool
    }
}

impl<H: Handler> RouteService for Route<H> {
    fn meta(&self) -> &Arc<RouteMeta> {
        &self.meta
    }

    fn handler_name(&self) -> &'static str {
        std::any::type_name::<H>()
    }

    fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    fn serve(&self, pipeline: &Pipeline, incoming: IncomingRequest, sink: Box<dyn ResponseSink>) {
        pipeline.execute(
            Arc::clone(&self.handler),
            &self.pool,
            &self.meta,
            incoming,
            sink,
        );
    }
}

impl<H: Handler> fmt::Debug for Route<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("meta", &self.meta)
            .field("handler", &self.handler_name())
            .field("pool", &self.pool)
            .finish()
    }
}

// ============================================================================
// RouteRegistry
// ============================================================================

/// A matched route with the captures extracted from the request path.
pub struct RouteMatch {
    pub route: BoxedRoute,
    pub path_params: Vec<(String, String)>,
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("route", &self.route.meta().path())
            .field("path_params", &self.path_params)
            .finish()
    }
}

struct Entry {
    template: PathTemplate,
    route: usize,
}

/// Every registered route and handler instance.
///
/// Built during boot and shared immutably while serving.
#[derive(Default)]
pub struct RouteRegistry {
    routes: Vec<BoxedRoute>,
    entries: HashMap<Method, Vec<Entry>>,
    handlers: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route under its primary path and aliases.
    ///
    /// The handler instance also becomes available to [`handler`](Self::handler)
    /// unless another instance of the same type was registered first.
    pub fn add<H: Handler>(&mut self, route: Route<H>) -> RegistryResult<()> {
        let handler = Arc::clone(route.handler());
        self.add_service(Arc::new(route))?;
        self.handlers
            .entry(TypeId::of::<H>())
            .or_insert(handler);
        Ok(())
    }

    /// Adds an already erased route.
    pub fn add_service(&mut self, route: BoxedRoute) -> RegistryResult<()> {
        let meta = Arc::clone(route.meta());
        let existing = self.entries.get(meta.method());

        let mut templates = Vec::new();
        for path in meta.paths() {
            let template = PathTemplate::parse(path)?;
            let conflicts = existing
                .into_iter()
                .flatten()
                .map(|entry| &entry.template)
                .chain(&templates)
                .any(|other: &PathTemplate| other.shape() == template.shape());
            if conflicts {
                return Err(RegistryError::DuplicateRoute {
                    method: meta.method().clone(),
                    path: path.to_string(),
                });
            }
            templates.push(template);
        }

        let index = self.routes.len();
        self.routes.push(route);
        let entries = self.entries.entry(meta.method().clone()).or_default();
        for template in templates {
            info!(method = %meta.method(), path = %template.as_str(), "Registered route");
            entries.push(Entry {
                template,
                route: index,
            });
        }
        Ok(())
    }

    /// Makes a handler instance available for chaining without routing it.
    pub fn register_handler<H: Handler>(&mut self, handler: Arc<H>) {
        self.handlers.insert(TypeId::of::<H>(), handler);
    }

    /// Returns the registered instance of handler type `H`.
    pub fn handler<H: Handler>(&self) -> Option<Arc<H>> {
        let handler = Arc::clone(self.handlers.get(&TypeId::of::<H>())?);
        handler.downcast::<H>().ok()
    }

    /// Finds the most specific route for `method` and `path`.
    pub fn find(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.entries
            .get(method)?
            .iter()
            .filter_map(|entry| {
                entry
                    .template
                    .matches(path)
                    .map(|captures| (entry, captures))
            })
            .max_by_key(|(entry, _)| entry.template.specificity())
            .map(|(entry, path_params)| RouteMatch {
                route: Arc::clone(&self.routes[entry.route]),
                path_params,
            })
    }

    pub fn routes(&self) -> &[BoxedRoute] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for RouteRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteRegistry")
            .field("routes", &self.routes.len())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
