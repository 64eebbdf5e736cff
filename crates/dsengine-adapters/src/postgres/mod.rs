//! Postgres adapter: wires `PgPoolHandle`/`PgPoolBuilder` plus the three
//! capability implementations into the process-wide registry.

mod discoverer;
mod executor;
mod handle;
mod rows;
mod tester;

pub use discoverer::PgDiscoverer;
pub use executor::PgExecutor;
pub use handle::{kind_tag, PgPoolBuilder, PgPoolHandle};
pub use tester::PgTester;

use std::sync::Arc;

use dsengine_capability::{CapabilityResult, ConnectionTester, QueryExecutor, SchemaDiscoverer};
use dsengine_pool::{downcast, PoolKey};
use dsengine_registry::{register, AdapterInfo, FactoryArgs};

/// Expects `FactoryArgs::raw_config` shaped as
/// `{"connectionString": "...", "database": "...", "poolMaxConns": N, "poolMinConns": N}`.
fn parse_config(raw: &serde_json::Value) -> CapabilityResult<(String, String, u32, u32)> {
    let conn_string = raw
        .get("connectionString")
        .and_then(|v| v.as_str())
        .ok_or_else(|| dsengine_capability::CapabilityError::Backend("missing connectionString".into()))?
        .to_string();
    let database = raw
        .get("database")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let max_conns = raw.get("poolMaxConns").and_then(|v| v.as_u64()).unwrap_or(10) as u32;
    let min_conns = raw.get("poolMinConns").and_then(|v| v.as_u64()).unwrap_or(1) as u32;
    Ok((conn_string, database, max_conns, min_conns))
}

async fn acquire_pool(args: &FactoryArgs) -> CapabilityResult<sqlx::PgPool> {
    let (conn_string, _database, max_conns, min_conns) = parse_config(&args.raw_config)?;
    let key = PoolKey::new(args.project_id.as_str(), args.user_id.as_str(), args.datasource_id.as_str());
    let builder = PgPoolBuilder { max_conns, min_conns };

    let handle = args
        .manager
        .acquire_or_build(kind_tag().clone(), key, &conn_string, &builder, &args.cancel)
        .await?;

    let pg_handle = downcast::<PgPoolHandle>(handle.as_ref(), kind_tag())?;
    Ok(pg_handle.pool.clone())
}

/// Registers the Postgres adapter. Call once at process start.
pub fn register_adapter() {
    register(
        AdapterInfo {
            kind: kind_tag().clone(),
            display_name: "PostgreSQL".into(),
            description: "Relational adapter backed by a native Postgres pool".into(),
            icon_tag: "postgres".into(),
        },
        Arc::new(|args: FactoryArgs| {
            Box::pin(async move {
                let (_conn_string, database, _max, _min) = parse_config(&args.raw_config)?;
                let pool = acquire_pool(&args).await?;
                Ok(Arc::new(PgTester::new(pool, database)) as Arc<dyn ConnectionTester>)
            })
        }),
        Arc::new(|args: FactoryArgs| {
            Box::pin(async move {
                let pool = acquire_pool(&args).await?;
                Ok(Arc::new(PgDiscoverer::new(pool)) as Arc<dyn SchemaDiscoverer>)
            })
        }),
        Arc::new(|args: FactoryArgs| {
            Box::pin(async move {
                let pool = acquire_pool(&args).await?;
                Ok(Arc::new(PgExecutor::new(pool)) as Arc<dyn QueryExecutor>)
            })
        }),
    );
}
