use thiserror::Error;

use dsengine_capability::CapabilityError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no adapter registered for kind {0}")]
    NotSupported(String),

    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
