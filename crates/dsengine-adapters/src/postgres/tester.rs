use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use dsengine_capability::{CapabilityError, CapabilityResult, ConnectionTester};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub struct PgTester {
    pool: sqlx::PgPool,
    expected_database: String,
}

impl PgTester {
    pub fn new(pool: sqlx::PgPool, expected_database: impl Into<String>) -> Self {
        Self {
            pool,
            expected_database: expected_database.into(),
        }
    }
}

impl ConnectionTester for PgTester {
    fn test<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, CapabilityResult<()>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(CapabilityError::cancelled());
            }

            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| CapabilityError::Backend(e.to_string()))?;

            let (one,): (i32,) = sqlx::query_as("SELECT 1")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| CapabilityError::Backend(e.to_string()))?;
            if one != 1 {
                return Err(CapabilityError::Backend("constant select round trip mismatch".into()));
            }

            let (current_db,): (String,) = sqlx::query_as("SELECT current_database()")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| CapabilityError::Backend(e.to_string()))?;

            if !current_db.eq_ignore_ascii_case(&self.expected_database) {
                return Err(CapabilityError::wrong_database());
            }

            Ok(())
        })
    }

    fn close<'a>(&'a self) -> BoxFuture<'a, CapabilityResult<()>> {
        // Adapter owns no resources beyond the pool, which the connection
        // manager owns — nothing to release here.
        Box::pin(async { Ok(()) })
    }
}
