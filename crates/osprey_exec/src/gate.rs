//! Admission gate bounding concurrent partition queries.
//!
//! A fixed pool of slots caps how many partition queries run at once,
//! across every logical query the executor serves. Unlike a rejecting
//! limiter, [`AdmissionGate::admit`] *waits* for a free slot, and the wait
//! races the caller's [`CancelSignal`] so a cancelled query stops queueing
//! immediately instead of holding its place in line.
//!
//! Slots are RAII: dropping the [`GatePermit`] returns the slot, whether
//! the guarded work finished, failed, or was cancelled.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use osprey_common::{CancelSignal, OspreyError, OspreyResult};

/// Point-in-time snapshot of gate counters.
#[derive(Debug, Clone, Default)]
pub struct GateMetrics {
    /// Total permits handed out since startup.
    pub admitted_total: u64,
    /// Waits that ended in cancellation instead of admission.
    pub cancelled_waits: u64,
    /// Permits currently held.
    pub in_flight: usize,
    /// High-water mark of permits held at once.
    pub peak_in_flight: usize,
}

/// RAII slot in the gate. Dropping it releases the slot.
#[derive(Debug)]
pub struct GatePermit {
    gate: Arc<AdmissionGate>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Global concurrency gate for partition queries.
///
/// Thread-safe; clone the `Arc<AdmissionGate>` to share across queries.
pub struct AdmissionGate {
    slots: Arc<Semaphore>,
    capacity: usize,

    // Metrics counters
    admitted_total: AtomicU64,
    cancelled_waits: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("capacity", &self.capacity)
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .field(
                "admitted_total",
                &self.admitted_total.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl AdmissionGate {
    /// Create a gate with the given slot count. A zero-capacity gate would
    /// deadlock every caller, so it is rejected outright.
    pub fn new(capacity: usize) -> OspreyResult<Arc<Self>> {
        if capacity == 0 {
            return Err(OspreyError::invariant(
                "admission gate capacity must be at least 1",
            ));
        }
        Ok(Arc::new(Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            admitted_total: AtomicU64::new(0),
            cancelled_waits: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }))
    }

    /// Wait for a slot. Returns the RAII permit once admitted, or the
    /// cancellation cause if the signal fires first (or had already fired;
    /// an already-cancelled signal never admits).
    pub async fn admit(self: &Arc<Self>, cancel: &CancelSignal) -> OspreyResult<GatePermit> {
        if cancel.is_cancelled() {
            self.cancelled_waits.fetch_add(1, Ordering::Relaxed);
            return Err(self.cancel_cause(cancel));
        }

        let permit = tokio::select! {
            acquired = Arc::clone(&self.slots).acquire_owned() => match acquired {
                Ok(permit) => permit,
                // The semaphore is never closed; closure here is a bug.
                Err(_) => {
                    return Err(OspreyError::invariant("admission gate semaphore closed"))
                }
            },
            _ = cancel.cancelled() => {
                self.cancelled_waits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(capacity = self.capacity, "admission wait cancelled");
                return Err(self.cancel_cause(cancel));
            }
        };

        self.admitted_total.fetch_add(1, Ordering::Relaxed);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_in_flight
            .fetch_max(now_in_flight, Ordering::Relaxed);

        Ok(GatePermit {
            gate: Arc::clone(self),
            _permit: permit,
        })
    }

    fn cancel_cause(&self, cancel: &CancelSignal) -> OspreyError {
        cancel
            .cause()
            .unwrap_or_else(|| OspreyError::cancelled("admission wait interrupted"))
    }

    /// Total slot count.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently held.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Snapshot current metrics.
    pub fn metrics(&self) -> GateMetrics {
        GateMetrics {
            admitted_total: self.admitted_total.load(Ordering::Relaxed),
            cancelled_waits: self.cancelled_waits.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight.load(Ordering::Relaxed),
        }
    }
}
