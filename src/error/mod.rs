//! Error taxonomy and recovery-action mapping for the query pipeline.
//!
//! Every fallible stage in [`crate::pipeline`] produces a [`PipelineError`]
//! tagged with an [`ErrorKind`]; [`recovery_action`] is the single place
//! that maps a kind to what the pipeline should do next, mirroring the
//! table in the component design (cache/embedding faults recover locally,
//! upstream/circuit faults drive dispatcher fallback, validation/context/
//! budget faults fail immediately, cancellation never retries).


use std::fmt;

/// The closed set of error kinds a pipeline run can surface. Closed set, so
/// a tagged enum rather than an open trait hierarchy — new kinds require a
/// new variant here and a new arm in [`recovery_action`], not a new impl
/// scattered across call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Exact-tier or vector-store failure during lookup/store.
    CacheFault,
    /// Embedder failure.
    EmbeddingFault,
    /// Provider returned an error or exhausted its retries.
    UpstreamFault,
    /// Dispatcher blocked the call because a breaker is open.
    CircuitOpen,
    /// No pooled client became available within budget.
    PoolTimeout,
    /// Input was rejected by the validator.
    ValidationFault,
    /// Prompt plus requested max completion exceeds the model's context
    /// window.
    ContextExceeded,
    /// A rate-limit or cost cap was exceeded.
    BudgetExceeded,
    /// The caller cancelled the request or its deadline was reached.
    Cancelled,
}

/// What the pipeline should do next upon encountering an [`ErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Skip the failed tier/stage and continue the pipeline.
    Skip,
    /// Retry the same call, possibly with backoff, before reconsidering.
    Retry,
    /// Hand the request to the dispatcher's fallback chain.
    Fallback,
    /// Abandon the run and surface a structured error to the caller now.
    FailImmediately,
    /// Abort in-flight work; never retry.
    Abort,
}

/// The single source of truth for kind → action, matching spec §4.10.
pub fn recovery_action(kind: ErrorKind) -> RecoveryAction {
    match kind {
        ErrorKind::CacheFault => RecoveryAction::Skip,
        ErrorKind::EmbeddingFault => RecoveryAction::Skip,
        ErrorKind::UpstreamFault => RecoveryAction::Fallback,
        ErrorKind::CircuitOpen => RecoveryAction::Fallback,
        ErrorKind::PoolTimeout => RecoveryAction::Retry,
        ErrorKind::ValidationFault => RecoveryAction::FailImmediately,
        ErrorKind::ContextExceeded => RecoveryAction::FailImmediately,
        ErrorKind::BudgetExceeded => RecoveryAction::FailImmediately,
        ErrorKind::Cancelled => RecoveryAction::Abort,
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::CacheFault => "cache_fault",
            ErrorKind::EmbeddingFault => "embedding_fault",
            ErrorKind::UpstreamFault => "upstream_fault",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::PoolTimeout => "pool_timeout",
            ErrorKind::ValidationFault => "validation_fault",
            ErrorKind::ContextExceeded => "context_exceeded",
            ErrorKind::BudgetExceeded => "budget_exceeded",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A pipeline-facing error: a classified kind, a human message, and whether
/// retrying the same request later might succeed. This is the `{kind,
/// message, retriable_hint}` structured body the spec requires on terminal
/// failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
    pub retriable_hint: bool,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let retriable_hint = matches!(
            recovery_action(kind),
            RecoveryAction::Retry | RecoveryAction::Fallback
        );
        Self {
            kind,
            message: message.into(),
            retriable_hint,
        }
    }
}

impl From<crate::dispatcher::DispatchError> for PipelineError {
    fn from(err: crate::dispatcher::DispatchError) -> Self {
        match &err {
            crate::dispatcher::DispatchError::NoProviders => {
                PipelineError::new(ErrorKind::UpstreamFault, err.to_string())
            }
            crate::dispatcher::DispatchError::DispatchFailed { .. } => {
                PipelineError::new(ErrorKind::UpstreamFault, err.to_string())
            }
        }
    }
}

impl From<crate::pool::PoolError> for PipelineError {
    fn from(err: crate::pool::PoolError) -> Self {
        PipelineError::new(ErrorKind::PoolTimeout, err.to_string())
    }
}
