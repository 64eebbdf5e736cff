use thiserror::Error;

use dsengine_pool::PoolError;

/// Errors surfaced by capability adapters (connection tester, schema
/// discoverer, query executor).
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("backend error: {0}")]
    Backend(String),
}

impl CapabilityError {
    pub fn wrong_database() -> Self {
        Self::Pool(PoolError::WrongDatabase)
    }

    pub fn cancelled() -> Self {
        Self::Pool(PoolError::Cancelled)
    }
}

pub type CapabilityResult<T> = Result<T, CapabilityError>;
