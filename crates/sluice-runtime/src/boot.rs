//! Bootables: one-off initialization tasks run while the application boots.
//!
//! Pre-scan bootables run on the boot thread, one after another in priority
//! order, before routes are built. A priority that is already taken moves
//! to the next free slot. Post-scan bootables run after route registration
//! on a fixed number of blocking workers; the server starts once all of them
//! have finished or the timeout elapsed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use sluice_framework::HandlerError;
use thiserror::Error;
use tracing::{debug, error, info};

/// Default number of post-scan workers.
pub const DEFAULT_POST_SCAN_WORKERS: usize = 4;

/// Default bound on post-scan completion.
pub const DEFAULT_POST_SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while running bootables.
#[derive(Debug, Error)]
pub enum BootError {
    /// A bootable was added after bootables were invoked.
    #[error("Bootables were already invoked, cannot add [{0}]")]
    AlreadyInvoked(String),

    /// A bootable returned an error.
    #[error("Bootable [{name}] failed: {source}")]
    Failed {
        name: String,
        #[source]
        source: HandlerError,
    },

    /// A bootable panicked.
    #[error("Bootable [{0}] panicked")]
    Panicked(String),

    /// Post-scan bootables did not finish in time.
    #[error("Post-scan bootables did not complete within {0:?}")]
    Timeout(Duration),
}

/// Result type for boot operations.
pub type BootResult<T> = Result<T, BootError>;

/// A blocking initialization task.
pub trait Bootable: Send + Sync + 'static {
    fn boot(&self) -> Result<(), HandlerError>;

    /// Name used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A named closure registered as a bootable.
pub struct BootFn<F> {
    name: String,
    f: F,
}

impl<F> BootFn<F>
where
    F: Fn() -> Result<(), HandlerError> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Bootable for BootFn<F>
where
    F: Fn() -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn boot(&self) -> Result<(), HandlerError> {
        (self.f)()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

type Queue = BTreeMap<i32, Arc<dyn Bootable>>;

/// Holds and invokes the bootables of an application.
#[derive(Default)]
pub struct BootManager {
    pre_scan: Queue,
    post_scan: Queue,
    completed: bool,
}

impl BootManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a bootable to run before routes are built.
    ///
    /// Smaller priorities run first. Returns the slot actually assigned.
    pub fn add_pre_scan(&mut self, priority: i32, bootable: impl Bootable) -> BootResult<i32> {
        self.ensure_open(&bootable)?;
        let mut slot = priority;
        while self.pre_scan.contains_key(&slot) {
            slot = slot.saturating_add(1);
        }
        if slot != priority {
            debug!(
                bootable = bootable.name(),
                priority, slot, "Bootable priority taken, using next free slot"
            );
        }
        self.pre_scan.insert(slot, Arc::new(bootable));
        Ok(slot)
    }

    /// Queues a bootable to run concurrently after route registration.
    pub fn add_post_scan(&mut self, bootable: impl Bootable) -> BootResult<()> {
        self.ensure_open(&bootable)?;
        let next = self
            .post_scan
            .last_key_value()
            .map_or(0, |(key, _)| key + 1);
        self.post_scan.insert(next, Arc::new(bootable));
        Ok(())
    }

    fn ensure_open(&self, bootable: &dyn Bootable) -> BootResult<()> {
        if self.completed {
            return Err(BootError::AlreadyInvoked(bootable.name().to_string()));
        }
        Ok(())
    }

    pub fn pre_scan_len(&self) -> usize {
        self.pre_scan.len()
    }

    pub fn post_scan_len(&self) -> usize {
        self.post_scan.len()
    }

    /// Returns `true` once post-scan bootables were invoked.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Runs the pre-scan bootables in priority order on the calling thread.
    ///
    /// Stops at the first failure.
    pub fn invoke_pre_scan(&self) -> BootResult<()> {
        for bootable in self.pre_scan.values() {
            info!(bootable = bootable.name(), "Invoking pre-scan bootable");
            run_bootable(bootable.as_ref())?;
        }
        Ok(())
    }

    /// Runs the post-scan bootables on `workers` blocking workers and waits
    /// for all of them, up to `timeout`.
    ///
    /// Every bootable runs even if another one fails; the first failure is
    /// returned. No further bootables can be added afterwards.
    pub async fn invoke_post_scan(&mut self, workers: usize, timeout: Duration) -> BootResult<()> {
        self.completed = true;
        let bootables: Vec<_> = self.post_scan.values().cloned().collect();
        if bootables.is_empty() {
            return Ok(());
        }

        let tasks = stream::iter(bootables)
            .map(|bootable| async move {
                info!(bootable = bootable.name(), "Invoking bootable");
                let name = bootable.name().to_string();
                match tokio::task::spawn_blocking(move || run_bootable(bootable.as_ref())).await {
                    Ok(result) => result,
                    Err(_) => Err(BootError::Panicked(name)),
                }
            })
            .buffer_unordered(workers.max(1))
            .collect::<Vec<_>>();

        let results = tokio::time::timeout(timeout, tasks)
            .await
            .map_err(|_| BootError::Timeout(timeout))?;

        let mut first_error = None;
        for result in results {
            if let Err(e) = result {
                error!(error = %e, "Post-scan bootable failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                info!("All bootables invoked");
                Ok(())
            }
        }
    }
}

fn run_bootable(bootable: &dyn Bootable) -> BootResult<()> {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| bootable.boot()));
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(BootError::Failed {
            name: bootable.name().to_string(),
            source,
        }),
        Err(_) => Err(BootError::Panicked(bootable.name().to_string())),
    }
}

impl fmt::Debug for BootManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |queue: &Queue| {
            queue
                .iter()
                .map(|(slot, b)| format!("{slot}:{}", b.name()))
                .collect::<Vec<_>>()
        };
        f.debug_struct("BootManager")
            .field("pre_scan", &names(&self.pre_scan))
            .field("post_scan", &names(&self.post_scan))
            .field("completed", &self.completed)
            .finish()
    }
}
