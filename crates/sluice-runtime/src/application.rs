//! Application lifecycle hooks.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::config::SluiceConfig;

/// Callbacks invoked as the runtime boots, serves and stops.
///
/// Every hook has an empty default.
#[async_trait]
pub trait Application: Send + Sync + 'static {
    /// After configuration is loaded, before any bootable runs.
    async fn on_pre_bootstrap(&self, _config: &SluiceConfig) {}

    /// After routes are built and post-scan bootables finished.
    async fn on_post_bootstrap(&self) {}

    /// Once the server accepts connections on `addr`.
    async fn on_started(&self, _addr: SocketAddr) {}

    /// When a shutdown was requested, before the server stops.
    async fn on_shutdown(&self) {}
}

/// An application without hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopApplication;

impl Application for NoopApplication {}
