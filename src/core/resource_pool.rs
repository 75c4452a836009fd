//! Pump admission control.
//!
//! [`ResourcePool`] is a counting gate over a fixed number of interchangeable
//! slots (pumps at a station). Callers that find no free slot park in a
//! single FIFO queue; a released slot is handed straight to the oldest
//! waiter, so a newcomer can never overtake someone already queued.
//!
//! ## Invariants
//! - `0 <= available <= capacity` at all times.
//! - `available + in_use == capacity`; a slot handed to a waiter counts as
//!   in use from the moment it is handed over.
//! - Every successful acquire is matched by exactly one release, performed
//!   by dropping the [`Permit`]. Releasing a slot nobody holds panics with
//!   [`FleetError::PoolInvariantViolation`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::core::FleetError;

/// How a parked waiter is woken.
enum Wake {
    /// Async task waiting on a oneshot.
    Task(oneshot::Sender<()>),
    /// OS thread blocked on a condvar.
    Thread(Arc<ThreadSlot>),
}

struct ThreadSlot {
    granted: Mutex<bool>,
    condvar: Condvar,
}

struct Waiter {
    ticket: u64,
    wake: Wake,
}

/// State guarded by the gate mutex.
struct Gate {
    available: u32,
    waiters: VecDeque<Waiter>,
    next_ticket: u64,
}

impl Gate {
    fn enqueue(&mut self, wake: Wake) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.waiters.push_back(Waiter { ticket, wake });
        ticket
    }

    /// Fast path: a slot is free and nobody is queued ahead of us.
    fn try_take(&mut self) -> bool {
        if self.available > 0 && self.waiters.is_empty() {
            self.available -= 1;
            true
        } else {
            false
        }
    }
}

#[derive(Default)]
struct PoolCounters {
    acquired_total: AtomicU64,
    cancelled_waits: AtomicU64,
    peak_in_use: AtomicU32,
}

struct Inner {
    capacity: u32,
    gate: Mutex<Gate>,
    counters: PoolCounters,
}

impl Inner {
    /// Return one slot: hand it to the oldest live waiter, or make it
    /// available again.
    fn release_slot(&self) {
        let mut gate = self.gate.lock();
        while let Some(waiter) = gate.waiters.pop_front() {
            match waiter.wake {
                Wake::Task(tx) => {
                    if tx.send(()).is_ok() {
                        tracing::debug!(ticket = waiter.ticket, "slot handed to queued task");
                        return;
                    }
                    // Receiver gone without abandoning: the acquire future was
                    // torn down mid-poll. Serve the next waiter.
                }
                Wake::Thread(slot) => {
                    *slot.granted.lock() = true;
                    slot.condvar.notify_one();
                    tracing::debug!(ticket = waiter.ticket, "slot handed to blocked thread");
                    return;
                }
            }
        }

        if gate.available >= self.capacity {
            let violation = FleetError::PoolInvariantViolation {
                available: gate.available + 1,
                capacity: self.capacity,
            };
            drop(gate);
            tracing::error!("{violation}");
            panic!("{violation}");
        }
        gate.available += 1;
    }

    /// Give up a queued wait. If the slot was handed over in the meantime,
    /// pass it on so the available count ends where it started.
    ///
    /// The waiter's receiver must still be alive when this runs.
    fn abandon(&self, ticket: u64) {
        let handed = {
            let mut gate = self.gate.lock();
            match gate.waiters.iter().position(|w| w.ticket == ticket) {
                Some(pos) => {
                    gate.waiters.remove(pos);
                    false
                }
                None => true,
            }
        };
        self.counters.cancelled_waits.fetch_add(1, Ordering::Relaxed);
        if handed {
            self.release_slot();
        }
    }

    fn record_grant(&self, in_use: Option<u32>) {
        self.counters.acquired_total.fetch_add(1, Ordering::Relaxed);
        if let Some(in_use) = in_use {
            self.counters.peak_in_use.fetch_max(in_use, Ordering::Relaxed);
        }
    }
}

/// Removes an abandoned waiter if the acquire future is dropped mid-wait.
struct PendingWait<'a> {
    inner: &'a Inner,
    ticket: u64,
    settled: bool,
}

impl Drop for PendingWait<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.inner.abandon(self.ticket);
        }
    }
}

/// Snapshot of pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Fixed number of slots.
    pub capacity: u32,
    /// Free slots.
    pub available: u32,
    /// Slots held by permits.
    pub in_use: u32,
    /// Callers queued for a slot.
    pub waiting: usize,
    /// Highest `in_use` observed.
    pub peak_in_use: u32,
    /// Successful acquisitions so far.
    pub acquired_total: u64,
    /// Waits given up through cancellation or drop.
    pub cancelled_waits: u64,
}

/// FIFO-fair counting gate over a fixed number of slots.
///
/// Cheap to clone; clones share the same slots.
///
/// # Example
///
/// ```rust,ignore
/// use fleet_dispatch::core::ResourcePool;
/// use tokio_util::sync::CancellationToken;
///
/// let pumps = ResourcePool::new(2)?;
/// let permit = pumps.acquire(&CancellationToken::new()).await?;
/// // ... refuel ...
/// drop(permit); // slot goes to the next vehicle in line
/// ```
#[derive(Clone)]
pub struct ResourcePool {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ResourcePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("stats", &self.stats())
            .finish()
    }
}

impl ResourcePool {
    /// Create a pool with `capacity` slots.
    ///
    /// # Errors
    ///
    /// [`FleetError::InvalidConfig`] when `capacity` is zero.
    pub fn new(capacity: u32) -> Result<Self, FleetError> {
        if capacity == 0 {
            return Err(FleetError::InvalidConfig(
                "pool capacity must be greater than 0".into(),
            ));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                capacity,
                gate: Mutex::new(Gate {
                    available: capacity,
                    waiters: VecDeque::new(),
                    next_ticket: 0,
                }),
                counters: PoolCounters::default(),
            }),
        })
    }

    /// Fixed number of slots.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.inner.capacity
    }

    /// Free slots right now.
    #[must_use]
    pub fn available(&self) -> u32 {
        self.inner.gate.lock().available
    }

    /// Utilization snapshot, consistent with a single point in time.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let (available, waiting) = {
            let gate = self.inner.gate.lock();
            (gate.available, gate.waiters.len())
        };
        let counters = &self.inner.counters;
        PoolStats {
            capacity: self.inner.capacity,
            available,
            in_use: self.inner.capacity - available,
            waiting,
            peak_in_use: counters.peak_in_use.load(Ordering::Relaxed),
            acquired_total: counters.acquired_total.load(Ordering::Relaxed),
            cancelled_waits: counters.cancelled_waits.load(Ordering::Relaxed),
        }
    }

    /// Wait for a slot.
    ///
    /// Suspends until a slot is handed over or `token` fires.
    ///
    /// # Errors
    ///
    /// [`FleetError::Cancelled`] if the token fires first. The available
    /// count is then exactly what it would have been without this call.
    pub async fn acquire(&self, token: &CancellationToken) -> Result<Permit, FleetError> {
        if token.is_cancelled() {
            return Err(FleetError::Cancelled);
        }

        let (ticket, mut rx) = {
            let mut gate = self.inner.gate.lock();
            if gate.try_take() {
                let in_use = self.inner.capacity - gate.available;
                drop(gate);
                self.inner.record_grant(Some(in_use));
                tracing::debug!(in_use, "slot acquired immediately");
                return Ok(self.permit());
            }
            let (tx, rx) = oneshot::channel();
            let ticket = gate.enqueue(Wake::Task(tx));
            tracing::debug!(ticket, waiting = gate.waiters.len(), "no free slot, queued");
            (ticket, rx)
        };

        // `rx` must outlive `abandon`: while it is alive a hand-over to this
        // ticket always succeeds, so a missing ticket means the slot is ours.
        let mut wait = PendingWait {
            inner: self.inner.as_ref(),
            ticket,
            settled: false,
        };
        tokio::select! {
            biased;
            () = token.cancelled() => {
                wait.settled = true;
                self.inner.abandon(ticket);
                drop(rx);
                tracing::debug!(ticket, "wait for slot cancelled");
                Err(FleetError::Cancelled)
            }
            handed = &mut rx => {
                wait.settled = true;
                match handed {
                    Ok(()) => {
                        self.inner.record_grant(None);
                        Ok(self.permit())
                    }
                    // Sender dropped without a hand-over: the waiter entry is gone.
                    Err(_) => Err(FleetError::Cancelled),
                }
            }
        }
    }

    /// Wait for a slot on an OS thread.
    ///
    /// Shares the FIFO queue with async callers. Never call this from inside
    /// an async task: it blocks the executor thread.
    pub fn acquire_blocking(&self) -> Permit {
        let slot = {
            let mut gate = self.inner.gate.lock();
            if gate.try_take() {
                let in_use = self.inner.capacity - gate.available;
                drop(gate);
                self.inner.record_grant(Some(in_use));
                return self.permit();
            }
            let slot = Arc::new(ThreadSlot {
                granted: Mutex::new(false),
                condvar: Condvar::new(),
            });
            gate.enqueue(Wake::Thread(Arc::clone(&slot)));
            slot
        };

        let mut granted = slot.granted.lock();
        while !*granted {
            slot.condvar.wait(&mut granted);
        }
        drop(granted);
        self.inner.record_grant(None);
        self.permit()
    }

    /// Take a slot only if one is free and nobody is queued.
    ///
    /// # Errors
    ///
    /// [`FleetError::CapacityExhausted`] otherwise.
    pub fn try_acquire(&self) -> Result<Permit, FleetError> {
        let mut gate = self.inner.gate.lock();
        if gate.try_take() {
            let in_use = self.inner.capacity - gate.available;
            drop(gate);
            self.inner.record_grant(Some(in_use));
            Ok(self.permit())
        } else {
            Err(FleetError::CapacityExhausted {
                in_use: self.inner.capacity - gate.available,
                capacity: self.inner.capacity,
            })
        }
    }

    /// Return a slot previously taken out of RAII management with
    /// [`Permit::detach`].
    ///
    /// # Panics
    ///
    /// With [`FleetError::PoolInvariantViolation`] if no slot is held, that is
    /// when the release would raise `available` above `capacity`.
    pub fn release(&self) {
        self.inner.release_slot();
    }

    fn permit(&self) -> Permit {
        Permit {
            inner: Some(Arc::clone(&self.inner)),
        }
    }
}

/// One held slot. Dropping it releases the slot exactly once, on every exit
/// path including errors, cancellation and panics.
#[must_use = "dropping a permit releases the slot immediately"]
pub struct Permit {
    inner: Option<Arc<Inner>>,
}

impl Permit {
    /// Stop managing the slot. The caller becomes responsible for calling
    /// [`ResourcePool::release`] once.
    pub fn detach(mut self) {
        self.inner = None;
    }
}

impl std::fmt::Debug for Permit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit")
            .field("held", &self.inner.is_some())
            .finish()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release_slot();
        }
    }
}
