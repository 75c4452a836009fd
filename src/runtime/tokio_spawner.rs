//! Tokio runtime spawner implementation.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::core::{FleetError, Spawn};

/// Tokio-based spawner that executes operations on a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioSpawner {
    handle: Arc<tokio::runtime::Handle>,
}

impl TokioSpawner {
    /// Create a new `TokioSpawner` from a tokio runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Spawner for the runtime the caller is running in.
    ///
    /// # Errors
    ///
    /// [`FleetError::InvalidConfig`] when called outside a tokio runtime.
    pub fn try_current() -> Result<Self, FleetError> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| FleetError::InvalidConfig(format!("no tokio runtime: {e}")))
    }

    /// Build a dedicated multi-threaded runtime and a spawner for it.
    ///
    /// `worker_threads` defaults to the number of CPUs. The runtime is
    /// returned to the caller, who must keep it alive as long as the
    /// spawner is used.
    ///
    /// # Errors
    ///
    /// The runtime could not be built.
    pub fn with_worker_threads(
        worker_threads: Option<usize>,
    ) -> Result<(Self, tokio::runtime::Runtime), std::io::Error> {
        let threads = worker_threads.unwrap_or_else(num_cpus::get).max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads)
            .thread_name("fleet-worker")
            .enable_all()
            .build()?;
        tracing::debug!(threads, "dedicated fleet runtime started");
        Ok((Self::new(runtime.handle().clone()), runtime))
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(fut)
    }
}
