//! Process-wide, multi-tenant connection pool cache.
//!
//! Mediates access between tenant requests and native backend connection
//! pools, enforcing per-tenant quotas, health recovery, TTL eviction, and
//! safe swap between backend kinds sharing the same tenant key.

mod config;
mod error;
mod handle;
mod key;
mod manager;
mod stats;

pub use config::{ManagerConfig, ManagerOptions, PROBE_DEADLINE};
pub use error::{PoolError, PoolResult};
pub use handle::{downcast, BackendKind, PoolBuilder, PoolHandle};
pub use key::PoolKey;
pub use manager::ConnectionManager;
pub use stats::ConnectionStats;
