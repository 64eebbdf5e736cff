use std::collections::HashMap;
use std::time::Duration;

/// Atomic snapshot of the connection manager's state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Total managed connections across all keys.
    pub total: usize,
    /// Managed connections grouped by project ID.
    pub by_project: HashMap<String, usize>,
    /// Managed connections grouped by user ID.
    pub by_user: HashMap<String, usize>,
    /// Age, in seconds, of the least-recently-used entry, if any.
    pub oldest_idle_seconds: Option<u64>,
    /// Configured per-user cap at the time of the snapshot.
    pub configured_cap: usize,
    /// Configured TTL at the time of the snapshot.
    pub configured_ttl: Duration,
    /// Whether `Shutdown` has been called.
    pub draining: bool,
}
