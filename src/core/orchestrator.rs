//! Concurrent operation combinators and in-flight operation tracking.
//!
//! ## Architecture
//! ```text
//! caller ──► Orchestrator::run_all / run_first ──► Spawn ──► task 1 .. task N
//!                 │                                              │
//!                 └── OperationTracker ◄── begin()/drop ─────────┘
//!                        cancel_entity / cancel_all ──► child CancellationTokens
//! ```
//!
//! ## Rules
//! - Operations run on the spawner, never inline, so one slow operation
//!   cannot hold up the rest.
//! - Failures are collected, not short-circuited: `run_all` waits for
//!   everything and reports every failure.
//! - Cancellation is cooperative. Tokens are handed down; operations notice
//!   them at their next suspension point.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::entity::EntityId;
use crate::core::state_machine::Action;
use crate::core::FleetError;
use crate::util::clock::now_ms;

/// Abstraction for spawning operations on a runtime.
pub trait Spawn: Clone + Send + Sync + 'static {
    /// Spawn a future and return a handle to its output.
    fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static;
}

/// Outcome of a batch of operations, split by kind.
#[derive(Debug)]
pub struct RunReport<T> {
    /// Successful results with their operation index.
    pub completed: Vec<(usize, T)>,
    /// Every failure with its operation index.
    pub failed: Vec<(usize, FleetError)>,
    /// Indices of operations that ended cancelled.
    pub cancelled: Vec<usize>,
}

impl<T> Default for RunReport<T> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            failed: Vec::new(),
            cancelled: Vec::new(),
        }
    }
}

impl<T> RunReport<T> {
    /// True when nothing failed and nothing was cancelled.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    /// Number of operations accounted for.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len() + self.cancelled.len()
    }

    fn record(&mut self, index: usize, joined: Result<Result<T, FleetError>, JoinError>) {
        match flatten(joined) {
            Ok(value) => self.completed.push((index, value)),
            Err(FleetError::Cancelled) => self.cancelled.push(index),
            Err(err) => self.failed.push((index, err)),
        }
    }

    fn sort(&mut self) {
        self.completed.sort_by_key(|(i, _)| *i);
        self.failed.sort_by_key(|(i, _)| *i);
        self.cancelled.sort_unstable();
    }
}

fn flatten<T>(joined: Result<Result<T, FleetError>, JoinError>) -> Result<T, FleetError> {
    match joined {
        Ok(result) => result,
        Err(err) => {
            let reason = if err.is_panic() {
                "operation panicked".to_string()
            } else {
                err.to_string()
            };
            tracing::error!("orchestrated task ended abnormally: {err}");
            Err(FleetError::TaskAborted(reason))
        }
    }
}

type Indexed<T> = BoxFuture<'static, (usize, Result<Result<T, FleetError>, JoinError>)>;

/// Operations still running after [`Orchestrator::run_first`] returned.
pub struct Remaining<T> {
    pending: FuturesUnordered<Indexed<T>>,
}

impl<T> fmt::Debug for Remaining<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remaining")
            .field("len", &self.pending.len())
            .finish()
    }
}

impl<T: Send + 'static> Remaining<T> {
    /// Number of operations not yet collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Wait for everything that is left.
    pub async fn join_all(mut self) -> RunReport<T> {
        let mut report = RunReport::default();
        while let Some((index, joined)) = self.pending.next().await {
            report.record(index, joined);
        }
        report.sort();
        report
    }
}

/// The first operation to finish and the rest.
#[derive(Debug)]
pub struct First<T> {
    /// Index of the winning operation.
    pub index: usize,
    /// Its result, success or failure.
    pub result: Result<T, FleetError>,
    /// Everything still running.
    pub remaining: Remaining<T>,
}

/// What fires a [`with_cancellation`] wrapper.
#[derive(Debug, Clone)]
pub enum CancelTrigger {
    /// An external token, fired by whoever owns it.
    Token(CancellationToken),
    /// A deadline measured from the start of the operation.
    Timeout(Duration),
    /// Whichever of the two comes first.
    TokenOrTimeout(CancellationToken, Duration),
}

impl CancelTrigger {
    fn split(self) -> (CancellationToken, Option<Duration>) {
        match self {
            Self::Token(token) => (token.child_token(), None),
            Self::Timeout(timeout) => (CancellationToken::new(), Some(timeout)),
            Self::TokenOrTimeout(token, timeout) => (token.child_token(), Some(timeout)),
        }
    }
}

impl From<CancellationToken> for CancelTrigger {
    fn from(token: CancellationToken) -> Self {
        Self::Token(token)
    }
}

impl From<Duration> for CancelTrigger {
    fn from(timeout: Duration) -> Self {
        Self::Timeout(timeout)
    }
}

/// Run `operation` with a token that fires on `trigger`.
///
/// The operation receives the token and is expected to observe it at its
/// suspension points; when the trigger fires it finishes its current step
/// and returns [`FleetError::Cancelled`]. Nothing is aborted from outside.
///
/// # Errors
///
/// Whatever the operation returns.
pub async fn with_cancellation<T, F, Fut>(
    operation: F,
    trigger: impl Into<CancelTrigger>,
) -> Result<T, FleetError>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, FleetError>>,
{
    let (token, timeout) = trigger.into().split();
    let fut = operation(token.clone());
    tokio::pin!(fut);

    let Some(timeout) = timeout else {
        return fut.await;
    };
    tokio::select! {
        out = &mut fut => return out,
        () = tokio::time::sleep(timeout) => {
            tracing::debug!(?timeout, "deadline reached, cancelling operation");
            token.cancel();
        }
    }
    fut.await
}

/// One in-flight unit of work.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    /// Unique operation id.
    pub id: Uuid,
    /// Target entity.
    pub entity: EntityId,
    /// Requested action.
    pub action: Action,
    /// Token cancelling just this operation.
    pub token: CancellationToken,
    /// Start time, milliseconds since epoch.
    pub started_at_ms: u128,
}

/// Registry of in-flight operations.
#[derive(Debug, Default)]
pub struct OperationTracker {
    ops: Mutex<HashMap<Uuid, PendingOperation>>,
}

impl OperationTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation. Its token is a child of `parent`; dropping the
    /// returned guard unregisters it.
    #[must_use]
    pub fn begin(
        self: &Arc<Self>,
        entity: EntityId,
        action: Action,
        parent: &CancellationToken,
    ) -> OperationGuard {
        let op = PendingOperation {
            id: Uuid::new_v4(),
            entity,
            action,
            token: parent.child_token(),
            started_at_ms: now_ms(),
        };
        let guard = OperationGuard {
            tracker: Arc::clone(self),
            id: op.id,
            token: op.token.clone(),
        };
        tracing::debug!(op = %op.id, entity = %entity, %action, "operation started");
        self.ops.lock().insert(op.id, op);
        guard
    }

    /// Copies of every in-flight operation.
    #[must_use]
    pub fn in_flight(&self) -> Vec<PendingOperation> {
        let mut ops: Vec<_> = self.ops.lock().values().cloned().collect();
        ops.sort_by_key(|op| op.started_at_ms);
        ops
    }

    /// Number of in-flight operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.lock().len()
    }

    /// True when nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.lock().is_empty()
    }

    /// Cancel every operation on one entity; returns how many were signalled.
    pub fn cancel_entity(&self, entity: EntityId) -> usize {
        let ops = self.ops.lock();
        let mut count = 0;
        for op in ops.values().filter(|op| op.entity == entity) {
            op.token.cancel();
            count += 1;
        }
        tracing::info!(entity = %entity, count, "cancelled operations for entity");
        count
    }

    /// Cancel everything in flight; returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let ops = self.ops.lock();
        for op in ops.values() {
            op.token.cancel();
        }
        tracing::info!(count = ops.len(), "cancelled all operations");
        ops.len()
    }
}

/// Keeps an operation registered while it runs.
#[derive(Debug)]
pub struct OperationGuard {
    tracker: Arc<OperationTracker>,
    id: Uuid,
    token: CancellationToken,
}

impl OperationGuard {
    /// Operation id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Token the operation must observe.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.tracker.ops.lock().remove(&self.id);
        tracing::debug!(op = %self.id, "operation finished");
    }
}

/// Launches operations concurrently and gathers their outcomes.
#[derive(Clone)]
pub struct Orchestrator<S> {
    spawner: S,
    tracker: Arc<OperationTracker>,
}

impl<S> fmt::Debug for Orchestrator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("in_flight", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

impl<S: Spawn> Orchestrator<S> {
    /// Orchestrator spawning on `spawner`.
    pub fn new(spawner: S) -> Self {
        Self {
            spawner,
            tracker: Arc::new(OperationTracker::new()),
        }
    }

    /// Shared in-flight operation tracker.
    #[must_use]
    pub const fn tracker(&self) -> &Arc<OperationTracker> {
        &self.tracker
    }

    /// Start every operation and wait for all of them.
    ///
    /// Failures do not stop the others; the report lists every success,
    /// failure and cancellation by operation index.
    pub async fn run_all<T, F, I>(&self, operations: I) -> RunReport<T>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, FleetError>> + Send + 'static,
        T: Send + 'static,
    {
        let handles: Vec<_> = operations
            .into_iter()
            .map(|op| self.spawner.spawn(op))
            .collect();
        tracing::debug!(count = handles.len(), "run_all started");

        let mut report = RunReport::default();
        for (index, joined) in futures::future::join_all(handles).await.into_iter().enumerate() {
            report.record(index, joined);
        }
        tracing::info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled.len(),
            "run_all finished"
        );
        report
    }

    /// Start every operation and return as soon as one finishes.
    ///
    /// The others keep running; collect them later through
    /// [`First::remaining`]. Returns `None` for an empty batch.
    pub async fn run_first<T, F, I>(&self, operations: I) -> Option<First<T>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, FleetError>> + Send + 'static,
        T: Send + 'static,
    {
        let mut pending: FuturesUnordered<Indexed<T>> = operations
            .into_iter()
            .enumerate()
            .map(|(index, op)| {
                let handle = self.spawner.spawn(op);
                async move { (index, handle.await) }.boxed()
            })
            .collect();

        let (index, joined) = pending.next().await?;
        tracing::debug!(index, left = pending.len(), "run_first winner");
        Some(First {
            index,
            result: flatten(joined),
            remaining: Remaining { pending },
        })
    }
}
