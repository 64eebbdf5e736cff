use thiserror::Error;

/// Errors surfaced by the connection manager and the pool-handle contract.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid connection string or config: {0}")]
    ParseConfig(String),

    #[error("connection quota exceeded for user {user_id} (cap {cap})")]
    QuotaExceeded { user_id: String, cap: usize },

    #[error("pool unavailable: {0}")]
    Unavailable(String),

    #[error("connection manager has been shut down")]
    Stopped,

    #[error("no adapter registered for kind {0}")]
    NotSupported(String),

    #[error("connected database does not match expected database")]
    WrongDatabase,

    #[error("operation cancelled")]
    Cancelled,

    #[error("handle kind {actual} does not match expected kind {expected}")]
    Downcast { expected: String, actual: String },

    #[error("backend error: {0}")]
    Backend(String),
}

pub type PoolResult<T> = Result<T, PoolError>;
