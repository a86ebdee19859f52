//! Pool error types.

use thiserror::Error;

/// Errors raised by the connection pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// No connection became available within `acquire_timeout`.
    #[error("timed out after {waited_ms}ms waiting for a pooled connection")]
    Timeout { waited_ms: u64 },

    /// The factory failed to establish a new connection.
    #[error("failed to establish pooled connection: {reason}")]
    ConnectFailed { reason: String },

    /// `acquire()` was called after `shutdown()`.
    #[error("pool has been shut down")]
    ShuttingDown,
}
