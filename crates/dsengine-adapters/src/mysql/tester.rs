use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use dsengine_capability::{CapabilityError, CapabilityResult, ConnectionTester};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub struct MySqlTester {
    pool: sqlx::MySqlPool,
    expected_database: String,
}

impl MySqlTester {
    pub fn new(pool: sqlx::MySqlPool, expected_database: impl Into<String>) -> Self {
        Self {
            pool,
            expected_database: expected_database.into(),
        }
    }
}

impl ConnectionTester for MySqlTester {
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

            let (current_db,): (String,) = sqlx::query_as("SELECT database()")
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
        Box::pin(async { Ok(()) })
    }
}
