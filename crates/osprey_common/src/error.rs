use thiserror::Error;

use crate::request_context::QueryContext;
use crate::types::PartitionId;

/// Convenience alias for `Result<T, OspreyError>`.
pub type OspreyResult<T> = Result<T, OspreyError>;

/// Error classification for retry/escalation decisions.
///
/// - `UserError`   — caller-initiated condition (cancellation, bad input)
/// - `Retryable`   — a partition's backing store failed; client SHOULD retry
/// - `Transient`   — timeout, resource exhaustion; client MAY retry after back-off
/// - `InternalBug` — should never happen; triggers alert + diagnostic dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserError,
    Retryable,
    Transient,
    InternalBug,
}

/// Top-level error type for the scatter-gather executor and its callers.
///
/// Exactly one of these surfaces from a failed `query()` call: the first
/// failure wins the cancellation-cause race and every sibling outcome is
/// discarded. Errors are values across every task boundary; panics never
/// carry results.
#[derive(Error, Debug, Clone)]
pub enum OspreyError {
    /// A partition's underlying sub-query failed.
    #[error("partition {partition} query failed: {reason}")]
    Store {
        partition: PartitionId,
        reason: String,
    },

    /// A timeout-bounded operation did not complete before its deadline.
    /// The operation itself keeps running detached; its result is discarded.
    #[error("{op} timed out after {timeout_ms}ms")]
    Timeout { op: String, timeout_ms: u64 },

    /// Caller-initiated or derived cancellation fired before or while work
    /// was outstanding.
    #[error("cancelled: {reason}")]
    Cancelled { reason: String },

    /// Programming-contract violation caught at runtime (for example a
    /// zero-capacity admission gate). Not a recoverable runtime condition.
    #[error("invariant violation: {reason}")]
    InvariantViolation { reason: String },

    /// Runtime fault outside the contract taxonomy (task panic, runtime
    /// teardown mid-call).
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

// ── classification & helpers ─────────────────────────────────────────────────

impl OspreyError {
    /// Classify this error for retry/escalation decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OspreyError::Cancelled { .. } => ErrorKind::UserError,
            OspreyError::Store { .. } => ErrorKind::Retryable,
            OspreyError::Timeout { .. } => ErrorKind::Transient,
            OspreyError::InvariantViolation { .. } => ErrorKind::InternalBug,
            OspreyError::Internal { .. } => ErrorKind::InternalBug,
        }
    }

    /// Returns true if the caller should retry the whole query.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Retryable)
    }

    /// Returns true if this is a caller-initiated condition.
    pub fn is_user_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::UserError)
    }

    /// Returns true if this is a transient timeout/backpressure error.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    /// Returns true if this is an internal bug that should never occur.
    pub fn is_internal_bug(&self) -> bool {
        matches!(self.kind(), ErrorKind::InternalBug)
    }

    /// The partition that produced this error, when one is attached.
    pub fn partition(&self) -> Option<PartitionId> {
        match self {
            OspreyError::Store { partition, .. } => Some(*partition),
            _ => None,
        }
    }

    /// Construct a partition store failure.
    pub fn store(partition: PartitionId, reason: impl Into<String>) -> Self {
        OspreyError::Store {
            partition,
            reason: reason.into(),
        }
    }

    /// Construct a deadline-expiry error for the named operation.
    pub fn timeout(op: impl Into<String>, timeout: std::time::Duration) -> Self {
        OspreyError::Timeout {
            op: op.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Construct a cancellation error.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        OspreyError::Cancelled {
            reason: reason.into(),
        }
    }

    /// Construct a programming-contract violation.
    pub fn invariant(reason: impl Into<String>) -> Self {
        OspreyError::InvariantViolation {
            reason: reason.into(),
        }
    }

    /// Construct an internal runtime fault.
    pub fn internal(reason: impl Into<String>) -> Self {
        OspreyError::Internal {
            reason: reason.into(),
        }
    }

    /// Add context to an error, **preserving variant and classification**.
    ///
    /// The context is prepended to the variant's text field, so wrapping a
    /// partition failure keeps its `PartitionId` and a timeout keeps its
    /// deadline.
    pub fn with_context(self, ctx: impl Into<String>) -> Self {
        let ctx = ctx.into();
        match self {
            OspreyError::Store { partition, reason } => OspreyError::Store {
                partition,
                reason: format!("{ctx}: {reason}"),
            },
            OspreyError::Timeout { op, timeout_ms } => OspreyError::Timeout {
                op: format!("{ctx}: {op}"),
                timeout_ms,
            },
            OspreyError::Cancelled { reason } => OspreyError::Cancelled {
                reason: format!("{ctx}: {reason}"),
            },
            OspreyError::InvariantViolation { reason } => OspreyError::InvariantViolation {
                reason: format!("{ctx}: {reason}"),
            },
            OspreyError::Internal { reason } => OspreyError::Internal {
                reason: format!("{ctx}: {reason}"),
            },
        }
    }

    /// Enrich this error with `QueryContext` fields so every failure can be
    /// correlated back to a specific query in the logs.
    pub fn with_query_context(self, qctx: &QueryContext) -> Self {
        let tag = format!(
            "qid={} partitions={} elapsed_ms={}",
            qctx.query_id,
            qctx.partition_count,
            qctx.elapsed_ms()
        );
        match self {
            OspreyError::Store { partition, reason } => OspreyError::Store {
                partition,
                reason: format!("{reason} [{tag}]"),
            },
            OspreyError::Timeout { op, timeout_ms } => OspreyError::Timeout {
                op: format!("{op} [{tag}]"),
                timeout_ms,
            },
            OspreyError::Cancelled { reason } => OspreyError::Cancelled {
                reason: format!("{reason} [{tag}]"),
            },
            OspreyError::InvariantViolation { reason } => OspreyError::InvariantViolation {
                reason: format!("{reason} [{tag}]"),
            },
            OspreyError::Internal { reason } => OspreyError::Internal {
                reason: format!("{reason} [{tag}]"),
            },
        }
    }
}

/// Add context to a Result, preserving error classification.
/// Usage: `some_result.ctx("name lookup failed")?`
pub trait ErrorContext<T> {
    fn ctx(self, context: &str) -> Result<T, OspreyError>;
    fn ctx_with(self, f: impl FnOnce() -> String) -> Result<T, OspreyError>;
}

impl<T, E: Into<OspreyError>> ErrorContext<T> for Result<T, E> {
    fn ctx(self, context: &str) -> Result<T, OspreyError> {
        self.map_err(|e| e.into().with_context(context))
    }
    fn ctx_with(self, f: impl FnOnce() -> String) -> Result<T, OspreyError> {
        self.map_err(|e| e.into().with_context(f()))
    }
}
