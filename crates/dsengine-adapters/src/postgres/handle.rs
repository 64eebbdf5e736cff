use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use dsengine_pool::{BackendKind, PoolBuilder, PoolError, PoolHandle, PoolResult};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub fn kind_tag() -> &'static BackendKind {
    static KIND: OnceLock<BackendKind> = OnceLock::new();
    KIND.get_or_init(|| BackendKind::new("relational-a"))
}

/// Wraps a native `sqlx::PgPool` behind the polymorphic pool-handle
/// contract.
#[derive(Debug)]
pub struct PgPoolHandle {
    pub(crate) pool: PgPool,
}

impl PgPoolHandle {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

impl PoolHandle for PgPoolHandle {
    fn probe<'a>(&'a self, deadline: Duration) -> BoxFuture<'a, PoolResult<()>> {
        Box::pin(async move {
            tokio::time::timeout(deadline, sqlx::query("SELECT 1").execute(&self.pool))
                .await
                .map_err(|_| PoolError::Unavailable("probe deadline exceeded".into()))?
                .map(|_| ())
                .map_err(|e| PoolError::Backend(e.to_string()))
        })
    }

    fn dispose<'a>(&'a self) -> BoxFuture<'a, PoolResult<()>> {
        Box::pin(async move {
            self.pool.close().await;
            Ok(())
        })
    }

    fn kind(&self) -> &BackendKind {
        kind_tag()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Builds a native `PgPool` from a connection string, honoring the
/// manager's configured native pool bounds.
pub struct PgPoolBuilder {
    pub max_conns: u32,
    pub min_conns: u32,
}

impl PoolBuilder for PgPoolBuilder {
    fn build<'a>(&'a self, conn_string: &'a str) -> BoxFuture<'a, PoolResult<Arc<dyn PoolHandle>>> {
        Box::pin(async move {
            let pool = PgPoolOptions::new()
                .max_connections(self.max_conns)
                .min_connections(self.min_conns)
                .connect(conn_string)
                .await
                .map_err(|e| PoolError::ParseConfig(dsengine_retry::sanitize(&e.to_string())))?;
            Ok(PgPoolHandle::new(pool) as Arc<dyn PoolHandle>)
        })
    }
}
