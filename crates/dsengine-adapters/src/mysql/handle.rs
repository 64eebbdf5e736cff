use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;

use dsengine_pool::{BackendKind, PoolBuilder, PoolError, PoolHandle, PoolResult};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub fn kind_tag() -> &'static BackendKind {
    static KIND: OnceLock<BackendKind> = OnceLock::new();
    KIND.get_or_init(|| BackendKind::new("relational-b"))
}

#[derive(Debug)]
pub struct MySqlPoolHandle {
    pub(crate) pool: MySqlPool,
}

impl MySqlPoolHandle {
    pub fn new(pool: MySqlPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

impl PoolHandle for MySqlPoolHandle {
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

pub struct MySqlPoolBuilder {
    pub max_conns: u32,
    pub min_conns: u32,
}

impl PoolBuilder for MySqlPoolBuilder {
    fn build<'a>(&'a self, conn_string: &'a str) -> BoxFuture<'a, PoolResult<Arc<dyn PoolHandle>>> {
        Box::pin(async move {
            let pool = MySqlPoolOptions::new()
                .max_connections(self.max_conns)
                .min_connections(self.min_conns)
                .connect(conn_string)
                .await
                .map_err(|e| PoolError::ParseConfig(dsengine_retry::sanitize(&e.to_string())))?;
            Ok(MySqlPoolHandle::new(pool) as Arc<dyn PoolHandle>)
        })
    }
}
