//! Per-call cancellation signal with an exactly-once cause.
//!
//! `CancelSignal` is the cancellation primitive threaded through a
//! scatter-gather call: the caller holds the root signal, the executor
//! derives one child per `query()` invocation, and every partition task
//! observes that child. The first `cancel()` wins — its cause is recorded,
//! all waiters wake, and live children fire with the same cause. Later
//! cancels are no-ops against the recorded cause.
//!
//! Cancellation flows strictly downward: cancelling a child never touches
//! its parent.
//!
//! # Usage
//! ```ignore
//! let root = CancelSignal::new();
//! let child = root.child();
//!
//! // First failing task fires the child with its error:
//! child.cancel(OspreyError::store(PartitionId(3), "connection reset"));
//!
//! assert!(child.is_cancelled());
//! assert!(!root.is_cancelled());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::OspreyError;

struct CancelState {
    cancelled: AtomicBool,
    /// First writer wins; set-if-absent under the lock.
    cause: Mutex<Option<OspreyError>>,
    /// Children registered for downward propagation. Entries for dropped
    /// children are skipped at fire time and pruned at the next
    /// registration.
    children: Mutex<Vec<Weak<CancelState>>>,
    notify: Notify,
}

impl CancelState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            cause: Mutex::new(None),
            children: Mutex::new(Vec::new()),
            notify: Notify::new(),
        })
    }

    /// Record the cause if none is set yet, wake waiters, and propagate to
    /// live children. Returns true when this call was the first writer.
    fn fire(&self, cause: OspreyError) -> bool {
        {
            let mut slot = self.cause.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(cause.clone());
        }
        // Cause is visible before the flag flips, so any observer that sees
        // `cancelled == true` can read a cause.
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();

        let children = std::mem::take(&mut *self.children.lock());
        for child in children {
            if let Some(child) = child.upgrade() {
                child.fire(cause.clone());
            }
        }
        true
    }
}

/// Cancellation signal with an assignable cause.
///
/// `Clone` shares state: all clones observe the same cancellation and the
/// same cause. Use [`CancelSignal::child`] for a derived signal that the
/// holder can fire independently without cancelling the parent.
#[derive(Clone)]
pub struct CancelSignal {
    state: Arc<CancelState>,
}

impl CancelSignal {
    /// Create a new signal in the non-cancelled state.
    pub fn new() -> Self {
        Self {
            state: CancelState::new(),
        }
    }

    /// Derive a child signal. The child fires when the parent fires (with
    /// the parent's cause) or when `cancel()` is called on the child itself;
    /// a child born of an already-cancelled signal starts out cancelled.
    pub fn child(&self) -> CancelSignal {
        let state = CancelState::new();
        {
            // The registration and the already-fired check are serialized
            // against `fire()` through the children lock: either the parent
            // sees the new entry, or the child sees the cancelled flag.
            let mut children = self.state.children.lock();
            if !self.state.cancelled.load(Ordering::Acquire) {
                // Dropped children leave dead weak entries behind; prune
                // them here so a never-cancelled parent's registry stays
                // bounded by its live children.
                children.retain(|w| w.strong_count() > 0);
                children.push(Arc::downgrade(&state));
                return CancelSignal { state };
            }
        }
        if let Some(cause) = self.cause() {
            state.fire(cause);
        }
        CancelSignal { state }
    }

    /// Cancel with the given cause. The first cancel wins; the recorded
    /// cause never changes afterwards. Returns true when this call set it.
    pub fn cancel(&self, cause: OspreyError) -> bool {
        let desc = cause.to_string();
        let fired = self.state.fire(cause);
        if fired {
            tracing::debug!(cause = %desc, "cancellation fired");
        }
        fired
    }

    /// Check whether this signal has fired (non-blocking).
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// The recorded cause, if the signal has fired.
    pub fn cause(&self) -> Option<OspreyError> {
        self.state.cause.lock().clone()
    }

    /// Wait until the signal fires. Returns immediately if it already has.
    pub async fn cancelled(&self) {
        loop {
            // Register interest before checking the flag so a concurrent
            // `fire()` cannot slip between the check and the await.
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
