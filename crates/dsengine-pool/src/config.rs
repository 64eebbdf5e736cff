use std::time::Duration;

/// Raw, caller-supplied options. Any non-positive field falls back to its
/// default when resolved into a [`ManagerConfig`].
#[derive(Clone, Debug, Default)]
pub struct ManagerOptions {
    pub ttl: Option<Duration>,
    pub cleanup_interval: Option<Duration>,
    pub max_connections_per_user: Option<usize>,
    pub pool_max_conns: Option<u32>,
    pub pool_min_conns: Option<u32>,
}

/// Effective configuration for a [`crate::manager::ConnectionManager`], with
/// all defaults applied.
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Idle duration after which a managed connection is eligible for eviction.
    pub ttl: Duration,
    /// Period of the background sweep.
    pub cleanup_interval: Duration,
    /// Cap on distinct pool keys sharing the same user ID.
    pub max_connections_per_user: usize,
    /// Max native connections per pool.
    pub pool_max_conns: u32,
    /// Minimum warm native connections per pool.
    pub pool_min_conns: u32,
}

/// Fixed, non-configurable bound on a health probe's retry deadline —
/// independent of any caller-supplied timeout.
pub const PROBE_DEADLINE: Duration = Duration::from_secs(5);

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(60),
            max_connections_per_user: 10,
            pool_max_conns: 10,
            pool_min_conns: 1,
        }
    }
}

impl ManagerConfig {
    pub fn from_options(opts: ManagerOptions) -> Self {
        let default = Self::default();
        Self {
            ttl: opts
                .ttl
                .filter(|d| !d.is_zero())
                .unwrap_or(default.ttl),
            cleanup_interval: opts
                .cleanup_interval
                .filter(|d| !d.is_zero())
                .unwrap_or(default.cleanup_interval),
            max_connections_per_user: opts
                .max_connections_per_user
                .filter(|n| *n > 0)
                .unwrap_or(default.max_connections_per_user),
            pool_max_conns: opts
                .pool_max_conns
                .filter(|n| *n > 0)
                .unwrap_or(default.pool_max_conns),
            pool_min_conns: opts
                .pool_min_conns
                .filter(|n| *n > 0)
                .unwrap_or(default.pool_min_conns),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_options_apply_all_defaults() {
        let cfg = ManagerConfig::from_options(ManagerOptions::default());
        let default = ManagerConfig::default();
        assert_eq!(cfg.ttl, default.ttl);
        assert_eq!(cfg.cleanup_interval, default.cleanup_interval);
        assert_eq!(cfg.max_connections_per_user, default.max_connections_per_user);
        assert_eq!(cfg.pool_max_conns, default.pool_max_conns);
        assert_eq!(cfg.pool_min_conns, default.pool_min_conns);
    }

    #[test]
    fn zero_cap_falls_back_to_default() {
        let cfg = ManagerConfig::from_options(ManagerOptions {
            max_connections_per_user: Some(0),
            ..Default::default()
        });
        assert_eq!(cfg.max_connections_per_user, 10);
    }

    #[test]
    fn explicit_positive_values_are_honored() {
        let cfg = ManagerConfig::from_options(ManagerOptions {
            ttl: Some(Duration::from_secs(2)),
            max_connections_per_user: Some(2),
            ..Default::default()
        });
        assert_eq!(cfg.ttl, Duration::from_secs(2));
        assert_eq!(cfg.max_connections_per_user, 2);
    }
}
