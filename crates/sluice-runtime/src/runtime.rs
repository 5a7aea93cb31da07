//! Application assembly and the serve loop.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sluice_runtime::SluiceRuntime;
//!
//! let mut runtime = SluiceRuntime::new()?;
//! runtime
//!     .route(RouteMeta::get("/users/{id}").require(["id"]), GetUser)?
//!     .interceptor(Phase::Request, 0, auth)?;
//! runtime.run().await?;
//! ```
//!
//! # Boot sequence
//!
//! 1. `Application::on_pre_bootstrap`
//! 2. pre-scan bootables, in priority order
//! 3. route registrations, in the order they were declared
//! 4. post-scan bootables, concurrently, bounded by the boot timeout
//! 5. `Application::on_post_bootstrap`
//! 6. the server binds and `Application::on_started` runs
//!
//! Registration is only possible before step 1. Afterwards every
//! registration method fails with [`RuntimeError::Sealed`].

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use sluice_framework::{
    ChainLink, Chained, DeploymentMode, Handler, HandlerError, Interceptor, InterceptorChain,
    Phase, Pipeline, PipelineSettings, Route, RouteMeta, RouteRegistry,
};
use sluice_transport::Dispatcher;
use tracing::{debug, info};

use crate::application::{Application, NoopApplication};
use crate::boot::{BootManager, Bootable};
use crate::config::{ConfigLoader, SluiceConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Lifecycle state of a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// Accepting registrations.
    Configuring,
    Bootstrapping,
    Running,
    Stopped,
}

type Registration = Box<dyn FnOnce(&mut RouteRegistry, DeploymentMode) -> RuntimeResult<()> + Send>;

/// Owns everything registered for an application and drives its boot.
pub struct SluiceRuntime {
    config: SluiceConfig,
    settings: PipelineSettings,
    interceptors: InterceptorChain,
    boot: BootManager,
    registrations: Vec<Registration>,
    application: Arc<dyn Application>,
    state: AppState,
    created_at: Instant,
}

impl SluiceRuntime {
    /// Loads configuration from the current directory and the environment.
    pub fn new() -> RuntimeResult<Self> {
        let config = ConfigLoader::new().with_current_dir().load()?;
        Self::from_config(config)
    }

    /// Creates a runtime builder for custom configuration loading.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Validates `config`, initializes logging and creates the runtime.
    pub fn from_config(config: SluiceConfig) -> RuntimeResult<Self> {
        validate_config(&config)?;
        logging::init_from_config(&config.logging);
        let settings = config.pipeline_settings()?;

        info!(
            mode = %settings.mode,
            log_level = %config.logging.level,
            "Runtime initialized from configuration"
        );

        Ok(Self {
            config,
            settings,
            interceptors: InterceptorChain::new(),
            boot: BootManager::new(),
            registrations: Vec::new(),
            application: Arc::new(NoopApplication),
            state: AppState::Configuring,
            created_at: Instant::now(),
        })
    }

    pub fn config(&self) -> &SluiceConfig {
        &self.config
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    fn ensure_configuring(&self, what: &'static str) -> RuntimeResult<()> {
        if self.state != AppState::Configuring {
            return Err(RuntimeError::Sealed(what));
        }
        Ok(())
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers a route served by `handler`.
    pub fn route<H>(&mut self, meta: RouteMeta, handler: H) -> RuntimeResult<&mut Self>
    where
        H: Handler,
        H::Adapter: Default,
    {
        self.route_factory(meta, move || Ok(handler))
    }

    /// Registers a route whose handler is created during boot, after the
    /// pre-scan bootables ran. A failing factory aborts the boot.
    pub fn route_factory<H, F>(&mut self, meta: RouteMeta, factory: F) -> RuntimeResult<&mut Self>
    where
        H: Handler,
        H::Adapter: Default,
        F: FnOnce() -> Result<H, HandlerError> + Send + 'static,
    {
        self.register("routes", meta, move |meta, _| {
            let handler = create_handler(&meta, factory)?;
            Ok(Route::new(meta, Arc::new(handler)))
        })
    }

    /// Registers a route whose adapters come from `adapters` instead of
    /// `Default`. When it returns `None` the request is answered with
    /// `500 Invalid Adapter`.
    pub fn route_with_adapters<H, A>(
        &mut self,
        meta: RouteMeta,
        handler: H,
        adapters: A,
    ) -> RuntimeResult<&mut Self>
    where
        H: Handler,
        A: Fn() -> Option<H::Adapter> + Send + Sync + 'static,
    {
        self.register("routes", meta, move |meta, _| {
            Ok(Route::with_factory(meta, Arc::new(handler), adapters))
        })
    }

    /// Registers a chained route. Its target handler must be registered
    /// earlier, either as a route or with [`handler`](Self::handler).
    pub fn chained<C>(&mut self, meta: RouteMeta, link: C) -> RuntimeResult<&mut Self>
    where
        C: ChainLink,
        <C::Target as Handler>::Adapter: Default,
    {
        self.register("routes", meta, move |meta, registry| {
            let chained = Chained::resolve(link, registry)?;
            Ok(Route::new(meta, Arc::new(chained)))
        })
    }

    fn register<H, B>(
        &mut self,
        what: &'static str,
        meta: RouteMeta,
        build: B,
    ) -> RuntimeResult<&mut Self>
    where
        H: Handler,
        B: FnOnce(RouteMeta, &RouteRegistry) -> RuntimeResult<Route<H>> + Send + 'static,
    {
        self.ensure_configuring(what)?;
        self.registrations.push(Box::new(move |registry, mode| {
            if meta.is_ignored_in(mode) {
                debug!(
                    method = %meta.method(),
                    path = %meta.path(),
                    %mode,
                    "Skipping route ignored in this mode"
                );
                return Ok(());
            }
            let route = build(meta, registry)?;
            registry.add(route)?;
            Ok(())
        }));
        Ok(self)
    }

    /// Makes a handler available to chained routes without routing it.
    pub fn handler<H: Handler>(&mut self, handler: H) -> RuntimeResult<&mut Self> {
        self.ensure_configuring("handlers")?;
        self.registrations.push(Box::new(move |registry, _| {
            if registry.handler::<H>().is_some() {
                return Err(RuntimeError::DuplicateHandler(std::any::type_name::<H>()));
            }
            registry.register_handler(Arc::new(handler));
            Ok(())
        }));
        Ok(self)
    }

    /// Registers an interceptor. A later registration at the same priority
    /// replaces the earlier one.
    pub fn interceptor(
        &mut self,
        phase: Phase,
        priority: i32,
        interceptor: impl Interceptor,
    ) -> RuntimeResult<&mut Self> {
        self.ensure_configuring("interceptors")?;
        self.interceptors.register(phase, priority, interceptor);
        Ok(self)
    }

    /// Queues a bootable that runs before routes are built.
    pub fn pre_scan(&mut self, priority: i32, bootable: impl Bootable) -> RuntimeResult<&mut Self> {
        self.ensure_configuring("bootables")?;
        self.boot.add_pre_scan(priority, bootable)?;
        Ok(self)
    }

    /// Queues a bootable that runs concurrently once routes are built.
    pub fn post_scan(&mut self, bootable: impl Bootable) -> RuntimeResult<&mut Self> {
        self.ensure_configuring("bootables")?;
        self.boot.add_post_scan(bootable)?;
        Ok(self)
    }

    /// Sets the lifecycle hooks.
    pub fn application(&mut self, application: impl Application) -> RuntimeResult<&mut Self> {
        self.ensure_configuring("the application")?;
        self.application = Arc::new(application);
        Ok(self)
    }

    // =========================================================================
    // Boot
    // =========================================================================

    /// Runs the boot sequence and returns the dispatcher to serve with.
    pub async fn bootstrap(&mut self) -> RuntimeResult<Dispatcher> {
        self.ensure_configuring("a second bootstrap")?;
        self.state = AppState::Bootstrapping;
        info!(mode = %self.settings.mode, "Bootstrapping Sluice");

        self.application.on_pre_bootstrap(&self.config).await;
        self.boot.invoke_pre_scan()?;

        let mut registry = RouteRegistry::new();
        for registration in self.registrations.drain(..) {
            registration(&mut registry, self.settings.mode)?;
        }
        info!(routes = registry.len(), "Routes registered");

        info!("Invoking post-scan bootables");
        self.boot
            .invoke_post_scan(
                self.config.boot.post_scan_workers,
                self.config.boot.post_scan_timeout(),
            )
            .await?;
        self.application.on_post_bootstrap().await;
        info!(
            elapsed_ms = self.created_at.elapsed().as_millis() as u64,
            "Bootstrap complete"
        );

        let interceptors = std::mem::take(&mut self.interceptors);
        let pipeline = Pipeline::new(self.settings.clone(), interceptors);
        Ok(Dispatcher::new(Arc::new(registry), pipeline))
    }
}

fn create_handler<H, F>(meta: &RouteMeta, factory: F) -> RuntimeResult<H>
where
    F: FnOnce() -> Result<H, HandlerError>,
{
    factory().map_err(|source| RuntimeError::HandlerInit {
        route: format!("{} {}", meta.method(), meta.path()),
        source,
    })
}

#[cfg(feature = "http-server")]
mod serve {
    use std::future::Future;

    use super::*;
    use tokio::signal;
    use tokio::sync::oneshot;
    use tracing::{error, warn};

    impl SluiceRuntime {
        /// Boots, serves and stops on Ctrl+C or SIGTERM.
        pub async fn run(&mut self) -> RuntimeResult<()> {
            let (tx, rx) = oneshot::channel();
            tokio::spawn(async move {
                match wait_for_shutdown().await {
                    Ok(()) => {
                        let _ = tx.send(());
                    }
                    Err(e) => error!(error = %e, "Shutdown signals unavailable"),
                }
            });

            info!("Press Ctrl+C to stop");
            self.run_until(async move {
                if rx.await.is_err() {
                    std::future::pending::<()>().await;
                }
            })
            .await
        }

        /// Boots and serves until `shutdown` completes.
        pub async fn run_until<F>(&mut self, shutdown: F) -> RuntimeResult<()>
        where
            F: Future<Output = ()>,
        {
            let dispatcher = self.bootstrap().await?;
            let addr = self.config.server.bind_addr();
            let handle = sluice_transport::serve(&addr, dispatcher).await?;
            self.state = AppState::Running;

            info!(addr = %handle.local_addr(), "Application started");
            self.application.on_started(handle.local_addr()).await;

            let server_token = handle.shutdown_token();
            tokio::select! {
                () = shutdown => info!("Shutting down"),
                () = server_token.cancelled() => {
                    warn!("Server stopped before shutdown was requested");
                }
            }

            self.application.on_shutdown().await;
            handle.shutdown();
            handle.stopped().await;
            self.state = AppState::Stopped;
            info!("HTTP server stopped");
            Ok(())
        }
    }

    async fn wait_for_shutdown() -> RuntimeResult<()> {
        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                .map_err(RuntimeError::Signal)?;

            tokio::select! {
                result = signal::ctrl_c() => {
                    result.map_err(RuntimeError::Signal)?;
                    info!("Received Ctrl+C, shutting down");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await.map_err(RuntimeError::Signal)?;
            info!("Received Ctrl+C, shutting down");
        }

        Ok(())
    }
}

impl fmt::Debug for SluiceRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SluiceRuntime")
            .field("state", &self.state)
            .field("mode", &self.settings.mode)
            .field("pending_registrations", &self.registrations.len())
            .field("interceptors", &self.interceptors)
            .field("boot", &self.boot)
            .finish()
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`SluiceRuntime`] with custom configuration loading.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g. "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges configuration values programmatically.
    pub fn merge(mut self, config: SluiceConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn build(self) -> RuntimeResult<SluiceRuntime> {
        let config = self.config_loader.load()?;
        SluiceRuntime::from_config(config)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
