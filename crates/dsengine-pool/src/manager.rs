//! The Connection Manager: a process-wide, multi-tenant cache of managed
//! connections keyed by [`PoolKey`], with TTL eviction, per-user quotas,
//! health-checked reuse, and backend-kind swap.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Mutex as SyncMutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dsengine_retry::{retry, RetryError, RetryPolicy};

use crate::config::{ManagerConfig, PROBE_DEADLINE};
use crate::error::{PoolError, PoolResult};
use crate::handle::{BackendKind, PoolBuilder, PoolHandle};
use crate::key::PoolKey;
use crate::stats::ConnectionStats;

/// A managed connection: a pool handle plus the bookkeeping the manager
/// needs to decide when to evict it.
struct ManagedConnection {
    handle: Arc<dyn PoolHandle>,
    last_used: SyncMutex<Instant>,
}

impl ManagedConnection {
    fn new(handle: Arc<dyn PoolHandle>) -> Self {
        Self {
            handle,
            last_used: SyncMutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    fn last_used(&self) -> Instant {
        *self.last_used.lock()
    }
}

fn is_retryable(err: &PoolError) -> bool {
    // `builder.build` can legitimately fail with `ParseConfig` (a malformed
    // connection string never becomes valid on a later attempt); surface it
    // immediately instead of burning the retry budget. Every other variant
    // reachable from a probe or a native-pool build (`Unavailable`,
    // `Backend`) is a transient condition worth another attempt.
    !matches!(err, PoolError::ParseConfig(_))
}

/// The core keyed cache of managed connections.
pub struct ConnectionManager {
    entries: RwLock<HashMap<PoolKey, Arc<ManagedConnection>>>,
    stopped: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    config: ManagerConfig,
    build_retry: RetryPolicy,
    probe_retry: RetryPolicy,
    sweeper: SyncMutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Construct a manager and spawn its background TTL sweeper.
    pub fn spawn(config: ManagerConfig) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let manager = Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            stopped: AtomicBool::new(false),
            shutdown_tx,
            config,
            build_retry: RetryPolicy::for_pool_build(),
            probe_retry: RetryPolicy::bounded(PROBE_DEADLINE),
            sweeper: SyncMutex::new(None),
        });

        let weak: Weak<ConnectionManager> = Arc::downgrade(&manager);
        let handle = tokio::spawn(sweep_loop(weak, shutdown_rx));
        *manager.sweeper.lock() = Some(handle);

        manager
    }

    /// `AcquireOrBuild` — see module docs for the fast/kind-mismatch/build
    /// path semantics.
    pub async fn acquire_or_build(
        &self,
        kind: BackendKind,
        key: PoolKey,
        conn_string: &str,
        builder: &dyn PoolBuilder,
        cancel: &CancellationToken,
    ) -> PoolResult<Arc<dyn PoolHandle>> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(PoolError::Stopped);
        }

        let existing = {
            let entries = self.entries.read();
            entries.get(&key).cloned()
        };

        if let Some(entry) = existing {
            if entry.handle.kind() == &kind {
                match retry(
                    &self.probe_retry,
                    cancel,
                    is_retryable,
                    || entry.handle.probe(PROBE_DEADLINE),
                )
                .await
                {
                    Ok(()) => {
                        entry.touch();
                        debug!(project = %key.project_id, user = %key.user_id, ds = %key.datasource_id, "reused healthy pool");
                        return Ok(Arc::clone(&entry.handle));
                    }
                    Err(RetryError::Cancelled) => return Err(PoolError::Cancelled),
                    Err(_) => {
                        warn!(project = %key.project_id, user = %key.user_id, ds = %key.datasource_id, "probe failed, evicting");
                        self.evict(&key).await;
                    }
                }
            } else {
                debug!(ds = %key.datasource_id, "kind mismatch, evicting before rebuild");
                self.evict(&key).await;
            }
        }

        self.build(kind, key, conn_string, builder, cancel).await
    }

    async fn build(
        &self,
        kind: BackendKind,
        key: PoolKey,
        conn_string: &str,
        builder: &dyn PoolBuilder,
        cancel: &CancellationToken,
    ) -> PoolResult<Arc<dyn PoolHandle>> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(PoolError::Stopped);
        }

        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(&key) {
                if entry.handle.kind() == &kind {
                    return Ok(Arc::clone(&entry.handle));
                }
            } else if self.count_for_user(&entries, &key.user_id) >= self.config.max_connections_per_user {
                return Err(PoolError::QuotaExceeded {
                    user_id: key.user_id.clone(),
                    cap: self.config.max_connections_per_user,
                });
            }
        }

        let handle = retry(&self.build_retry, cancel, is_retryable, || {
            builder.build(conn_string)
        })
        .await
        .map_err(|err| match err {
            RetryError::Cancelled => PoolError::Cancelled,
            // Terminal means `is_retryable` rejected it outright (e.g. a
            // malformed connection string) — surface the original variant
            // rather than relabeling it as a transient unavailability.
            RetryError::Terminal(e) => e,
            RetryError::Exhausted(e) => PoolError::Unavailable(e.to_string()),
        })?;

        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&key) {
            if existing.handle.kind() == &kind {
                let existing_handle = Arc::clone(&existing.handle);
                drop(entries);
                let _ = handle.dispose().await;
                return Ok(existing_handle);
            }
        }
        let previous = entries.insert(key.clone(), Arc::new(ManagedConnection::new(Arc::clone(&handle))));
        drop(entries);

        if let Some(prev) = previous {
            let _ = prev.handle.dispose().await;
        }

        info!(project = %key.project_id, user = %key.user_id, ds = %key.datasource_id, kind = %kind, "built new pool");
        Ok(handle)
    }

    fn count_for_user(
        &self,
        entries: &HashMap<PoolKey, Arc<ManagedConnection>>,
        user_id: &str,
    ) -> usize {
        entries.keys().filter(|k| k.user_id == user_id).count()
    }

    /// `RegisterExisting` — always replaces a prior entry under the same
    /// key, disposing it regardless of kind (see `DESIGN.md`).
    pub async fn register_existing(
        &self,
        key: PoolKey,
        handle: Arc<dyn PoolHandle>,
    ) -> PoolResult<Arc<dyn PoolHandle>> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(PoolError::Stopped);
        }

        let previous = {
            let mut entries = self.entries.write();
            if !entries.contains_key(&key)
                && self.count_for_user(&entries, &key.user_id) >= self.config.max_connections_per_user
            {
                return Err(PoolError::QuotaExceeded {
                    user_id: key.user_id.clone(),
                    cap: self.config.max_connections_per_user,
                });
            }
            entries.insert(key.clone(), Arc::new(ManagedConnection::new(Arc::clone(&handle))))
        };

        if let Some(prev) = previous {
            let _ = prev.handle.dispose().await;
        }

        Ok(handle)
    }

    /// `Evict` — idempotent removal and disposal of the entry under `key`.
    pub async fn evict(&self, key: &PoolKey) {
        let removed = { self.entries.write().remove(key) };
        if let Some(entry) = removed {
            let _ = entry.handle.dispose().await;
        }
    }

    /// `Shutdown` — idempotent. Marks the manager stopped, stops the
    /// sweeper, and disposes every stored handle.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = self.shutdown_tx.send(true);

        let drained: Vec<_> = { self.entries.write().drain().map(|(_, v)| v).collect() };
        for entry in drained {
            let _ = entry.handle.dispose().await;
        }

        info!("connection manager shut down");
    }

    /// `Stats` — an atomic snapshot; see [`ConnectionStats`].
    pub fn stats(&self) -> ConnectionStats {
        let entries = self.entries.read();

        let mut by_project: HashMap<String, usize> = HashMap::new();
        let mut by_user: HashMap<String, usize> = HashMap::new();
        let mut oldest: Option<Instant> = None;

        for (key, entry) in entries.iter() {
            *by_project.entry(key.project_id.clone()).or_insert(0) += 1;
            *by_user.entry(key.user_id.clone()).or_insert(0) += 1;
            let last_used = entry.last_used();
            oldest = Some(match oldest {
                Some(current) if current <= last_used => current,
                _ => last_used,
            });
        }

        ConnectionStats {
            total: entries.len(),
            by_project,
            by_user,
            oldest_idle_seconds: oldest.map(|t| t.elapsed().as_secs()),
            configured_cap: self.config.max_connections_per_user,
            configured_ttl: self.config.ttl,
            draining: self.stopped.load(Ordering::Acquire),
        }
    }

    async fn sweep_once(&self) {
        let ttl = self.config.ttl;
        let expired: Vec<(PoolKey, Arc<ManagedConnection>)> = {
            let entries = self.entries.read();
            entries
                .iter()
                .filter(|(_, entry)| entry.last_used().elapsed() >= ttl)
                .map(|(key, entry)| (key.clone(), Arc::clone(entry)))
                .collect()
        };

        if expired.is_empty() {
            return;
        }

        let to_dispose: Vec<Arc<ManagedConnection>> = {
            let mut entries = self.entries.write();
            expired
                .into_iter()
                .filter_map(|(key, candidate)| {
                    let still_expired = entries
                        .get(&key)
                        .map(|current| {
                            Arc::ptr_eq(current, &candidate) && current.last_used().elapsed() >= ttl
                        })
                        .unwrap_or(false);
                    if still_expired {
                        entries.remove(&key)
                    } else {
                        None
                    }
                })
                .collect()
        };

        for entry in &to_dispose {
            let _ = entry.handle.dispose().await;
        }

        if !to_dispose.is_empty() {
            info!(count = to_dispose.len(), "swept expired connections");
        }
    }
}

async fn sweep_loop(weak: Weak<ConnectionManager>, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        let interval = match weak.upgrade() {
            Some(manager) => manager.config.cleanup_interval,
            None => return,
        };

        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                match weak.upgrade() {
                    Some(manager) => manager.sweep_once().await,
                    None => return,
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::test_support::{MockBuilder, MockHandle};
    use std::sync::atomic::Ordering as AtomicOrdering;

    fn test_config(ttl: Duration, cap: usize) -> ManagerConfig {
        ManagerConfig {
            ttl,
            cleanup_interval: Duration::from_millis(20),
            max_connections_per_user: cap,
            pool_max_conns: 10,
            pool_min_conns: 1,
        }
    }

    #[tokio::test]
    async fn reuse_returns_same_handle() {
        let manager = ConnectionManager::spawn(test_config(Duration::from_secs(300), 10));
        let builder = MockBuilder::new("relational-a");
        let cancel = CancellationToken::new();
        let key = PoolKey::new("p1", "alice", "d1");

        let h1 = manager
            .acquire_or_build(BackendKind::new("relational-a"), key.clone(), "conn", &builder, &cancel)
            .await
            .unwrap();
        let h2 = manager
            .acquire_or_build(BackendKind::new("relational-a"), key.clone(), "conn", &builder, &cancel)
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&h1, &h2));
        let stats = manager.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.by_user.get("alice"), Some(&1));
    }

    #[tokio::test]
    async fn distinct_users_get_distinct_handles() {
        let manager = ConnectionManager::spawn(test_config(Duration::from_secs(300), 10));
        let builder = MockBuilder::new("relational-a");
        let cancel = CancellationToken::new();

        manager
            .acquire_or_build(BackendKind::new("relational-a"), PoolKey::new("p1", "u1", "d1"), "c", &builder, &cancel)
            .await
            .unwrap();
        manager
            .acquire_or_build(BackendKind::new("relational-a"), PoolKey::new("p1", "u2", "d1"), "c", &builder, &cancel)
            .await
            .unwrap();

        assert_eq!(manager.stats().total, 2);
    }

    #[tokio::test]
    async fn per_user_cap_rejects_the_nth_plus_one_acquire() {
        let manager = ConnectionManager::spawn(test_config(Duration::from_secs(300), 2));
        let builder = MockBuilder::new("relational-a");
        let cancel = CancellationToken::new();

        manager
            .acquire_or_build(BackendKind::new("relational-a"), PoolKey::new("p", "alice", "d1"), "c", &builder, &cancel)
            .await
            .unwrap();
        manager
            .acquire_or_build(BackendKind::new("relational-a"), PoolKey::new("p", "alice", "d2"), "c", &builder, &cancel)
            .await
            .unwrap();

        let result = manager
            .acquire_or_build(BackendKind::new("relational-a"), PoolKey::new("p", "alice", "d3"), "c", &builder, &cancel)
            .await;

        assert!(matches!(result, Err(PoolError::QuotaExceeded { .. })));
        assert_eq!(manager.stats().total, 2);
    }

    #[tokio::test]
    async fn health_recovery_rebuilds_after_external_dispose() {
        let manager = ConnectionManager::spawn(test_config(Duration::from_secs(300), 10));
        let builder = MockBuilder::new("relational-a");
        let cancel = CancellationToken::new();
        let key = PoolKey::new("p", "alice", "d1");

        let first = manager
            .acquire_or_build(BackendKind::new("relational-a"), key.clone(), "c", &builder, &cancel)
            .await
            .unwrap();
        let mock: &MockHandle = first.as_any().downcast_ref().unwrap();
        mock.set_healthy(false);

        let second = manager
            .acquire_or_build(BackendKind::new("relational-a"), key.clone(), "c", &builder, &cancel)
            .await
            .unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(manager.stats().total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_eviction_removes_stale_entry() {
        let manager = ConnectionManager::spawn(test_config(Duration::from_millis(50), 10));
        let builder = MockBuilder::new("relational-a");
        let cancel = CancellationToken::new();
        let key = PoolKey::new("p", "alice", "d1");

        manager
            .acquire_or_build(BackendKind::new("relational-a"), key, "c", &builder, &cancel)
            .await
            .unwrap();
        assert_eq!(manager.stats().total, 1);

        tokio::time::advance(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(1)).await;
        tokio::task::yield_now().await;

        assert_eq!(manager.stats().total, 0);
    }

    #[tokio::test]
    async fn shutdown_clears_stats_and_rejects_further_acquires() {
        let manager = ConnectionManager::spawn(test_config(Duration::from_secs(300), 10));
        let builder = MockBuilder::new("relational-a");
        let cancel = CancellationToken::new();
        let key = PoolKey::new("p", "alice", "d1");

        let handle = manager
            .acquire_or_build(BackendKind::new("relational-a"), key.clone(), "c", &builder, &cancel)
            .await
            .unwrap();

        manager.shutdown().await;
        assert_eq!(manager.stats().total, 0);

        let mock: &MockHandle = handle.as_any().downcast_ref().unwrap();
        assert!(mock.disposed.load(AtomicOrdering::SeqCst));

        // Idempotent.
        manager.shutdown().await;

        let result = manager
            .acquire_or_build(BackendKind::new("relational-a"), key, "c", &builder, &cancel)
            .await;
        assert!(matches!(result, Err(PoolError::Stopped)));
    }

    #[tokio::test]
    async fn concurrent_acquires_over_distinct_keys_collapse_to_one_pool_each() {
        let manager = ConnectionManager::spawn(test_config(Duration::from_secs(300), 100));
        let builder = Arc::new(MockBuilder::new("relational-a"));

        let mut tasks = Vec::new();
        for user in 0..5 {
            for _ in 0..4 {
                let manager = Arc::clone(&manager);
                let builder = Arc::clone(&builder);
                tasks.push(tokio::spawn(async move {
                    let cancel = CancellationToken::new();
                    let key = PoolKey::new("p", format!("u{user}"), "d1");
                    manager
                        .acquire_or_build(BackendKind::new("relational-a"), key, "c", builder.as_ref(), &cancel)
                        .await
                }));
            }
        }

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(manager.stats().total, 5);
    }

    #[tokio::test]
    async fn kind_swap_disposes_old_handle_and_stats_stays_at_one() {
        let manager = ConnectionManager::spawn(test_config(Duration::from_secs(300), 10));
        let builder_a = MockBuilder::new("relational-a");
        let cancel = CancellationToken::new();
        let key = PoolKey::new("p", "alice", "d1");

        let a = manager
            .acquire_or_build(BackendKind::new("relational-a"), key.clone(), "c", &builder_a, &cancel)
            .await
            .unwrap();

        let b_handle = MockHandle::new("relational-b");
        let b = manager
            .register_existing(key.clone(), b_handle.clone())
            .await
            .unwrap();
        assert_eq!(manager.stats().total, 1);

        let a_mock: &MockHandle = a.as_any().downcast_ref().unwrap();
        assert!(a_mock.disposed.load(AtomicOrdering::SeqCst));
        assert_eq!(b.kind(), &BackendKind::new("relational-b"));

        let back_to_a = manager
            .acquire_or_build(BackendKind::new("relational-a"), key, "c", &builder_a, &cancel)
            .await
            .unwrap();
        assert_eq!(manager.stats().total, 1);
        assert_eq!(back_to_a.kind(), &BackendKind::new("relational-a"));
        assert!(b_handle.disposed.load(AtomicOrdering::SeqCst));
    }

    /// Simulates two concurrent `acquire_or_build` calls for a brand-new key
    /// racing to build different kinds: both pass the fast-path read check
    /// (no entry yet), both build successfully, and land in `build`'s
    /// write-lock section one after the other. The losing builder's handle
    /// must be disposed, not silently overwritten.
    #[tokio::test]
    async fn build_disposes_superseded_handle_on_kind_mismatch_race() {
        let manager = ConnectionManager::spawn(test_config(Duration::from_secs(300), 10));
        let key = PoolKey::new("p", "alice", "d1");
        let cancel = CancellationToken::new();

        let builder_a = MockBuilder::new("relational-a");
        let first = manager
            .build(BackendKind::new("relational-a"), key.clone(), "c", &builder_a, &cancel)
            .await
            .unwrap();

        let builder_b = MockBuilder::new("relational-b");
        let second = manager
            .build(BackendKind::new("relational-b"), key.clone(), "c", &builder_b, &cancel)
            .await
            .unwrap();

        assert_eq!(manager.stats().total, 1);
        let first_mock: &MockHandle = first.as_any().downcast_ref().unwrap();
        assert!(first_mock.disposed.load(AtomicOrdering::SeqCst));
        let second_mock: &MockHandle = second.as_any().downcast_ref().unwrap();
        assert!(!second_mock.disposed.load(AtomicOrdering::SeqCst));
    }

    struct ParseConfigBuilder {
        calls: std::sync::atomic::AtomicU32,
    }

    impl PoolBuilder for ParseConfigBuilder {
        fn build<'a>(
            &'a self,
            _conn_string: &'a str,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = PoolResult<Arc<dyn PoolHandle>>> + Send + 'a>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Box::pin(async { Err(PoolError::ParseConfig("malformed connection string".into())) })
        }
    }

    #[tokio::test]
    async fn malformed_connection_string_fails_fast_without_retry() {
        let manager = ConnectionManager::spawn(test_config(Duration::from_secs(300), 10));
        let builder = ParseConfigBuilder { calls: std::sync::atomic::AtomicU32::new(0) };
        let cancel = CancellationToken::new();
        let key = PoolKey::new("p", "alice", "d1");

        let result = manager
            .acquire_or_build(BackendKind::new("relational-a"), key, "not a conn string", &builder, &cancel)
            .await;

        assert!(matches!(result, Err(PoolError::ParseConfig(_))));
        assert_eq!(builder.calls.load(AtomicOrdering::SeqCst), 1);
    }
}
