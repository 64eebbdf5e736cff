use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use sqlx::{Column, Executor, Row};
use tokio_util::sync::CancellationToken;

use dsengine_capability::{
    effective_limit, quote_identifier, CapabilityError, CapabilityResult, ExecuteResult,
    ExplainResult, QueryExecutionResult, QueryExecutor,
};

use super::rows::{describe_columns, to_result_row};
use crate::params::{bound_as_subquery, translate_positional};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

fn backend_err(e: sqlx::Error) -> CapabilityError {
    CapabilityError::Backend(e.to_string())
}

pub struct MySqlExecutor {
    pool: sqlx::MySqlPool,
}

impl MySqlExecutor {
    pub fn new(pool: sqlx::MySqlPool) -> Self {
        Self { pool }
    }

    async fn run_bounded(&self, sql: &str, params: &[Value], limit: i64) -> CapabilityResult<QueryExecutionResult> {
        let (native_sql, ordered) = translate_positional(sql, params, "?");
        let bounded = bound_as_subquery(&native_sql, effective_limit(limit));
        let mut query = sqlx::query(&bounded);
        for param in &ordered {
            query = bind_json(query, param);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(backend_err)?;

        let columns = rows.first().map(describe_columns).unwrap_or_default();
        let result_rows: Vec<_> = rows.iter().map(to_result_row).collect();
        let count = result_rows.len();
        Ok(QueryExecutionResult { columns, rows: result_rows, count })
    }

    async fn run_unbounded(&self, sql: &str, params: &[Value]) -> CapabilityResult<ExecuteResult> {
        let (native_sql, ordered) = translate_positional(sql, params, "?");

        let mut query = sqlx::query(&native_sql);
        for param in &ordered {
            query = bind_json(query, param);
        }

        match query.fetch_all(&self.pool).await {
            Ok(rows) if rows.is_empty() => {
                // `fetch_all` succeeds with no rows both for a non-RETURNING
                // DML statement and for a SELECT that matched nothing — in
                // the former case we still need the real affected-row count.
                let mut query = sqlx::query(&native_sql);
                for param in &ordered {
                    query = bind_json(query, param);
                }
                let result = query.execute(&self.pool).await.map_err(backend_err)?;
                Ok(ExecuteResult::side_effect(result.rows_affected()))
            }
            Ok(rows) => {
                let columns = describe_columns(&rows[0]);
                let result_rows: Vec<_> = rows.iter().map(to_result_row).collect();
                Ok(ExecuteResult::rows_returned(columns, result_rows))
            }
            Err(_) => {
                let mut query = sqlx::query(&native_sql);
                for param in &ordered {
                    query = bind_json(query, param);
                }
                let result = query.execute(&self.pool).await.map_err(backend_err)?;
                Ok(ExecuteResult::side_effect(result.rows_affected()))
            }
        }
    }
}

fn bind_json<'q>(
    query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    value: &'q Value,
) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

impl QueryExecutor for MySqlExecutor {
    fn query<'a>(
        &'a self,
        sql: &'a str,
        limit: i64,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CapabilityResult<QueryExecutionResult>> {
        Box::pin(async move { self.run_bounded(sql, &[], limit).await })
    }

    fn query_with_params<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
        limit: i64,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CapabilityResult<QueryExecutionResult>> {
        Box::pin(async move { self.run_bounded(sql, params, limit).await })
    }

    fn execute<'a>(&'a self, sql: &'a str, _cancel: &'a CancellationToken) -> BoxFuture<'a, CapabilityResult<ExecuteResult>> {
        Box::pin(async move { self.run_unbounded(sql, &[]).await })
    }

    fn execute_with_params<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CapabilityResult<ExecuteResult>> {
        Box::pin(async move { self.run_unbounded(sql, params).await })
    }

    fn validate<'a>(&'a self, sql: &'a str, _cancel: &'a CancellationToken) -> BoxFuture<'a, CapabilityResult<()>> {
        Box::pin(async move {
            let (native_sql, _) = translate_positional(sql, &[], "?");
            (&self.pool).prepare(&native_sql).await.map_err(backend_err)?;
            Ok(())
        })
    }

    fn explain<'a>(&'a self, sql: &'a str, _cancel: &'a CancellationToken) -> BoxFuture<'a, CapabilityResult<ExplainResult>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!("EXPLAIN FORMAT=TRADITIONAL {sql}"))
                .fetch_all(&self.pool)
                .await
                .map_err(backend_err)?;

            let plan_text = rows
                .iter()
                .map(|row| {
                    row.columns()
                        .iter()
                        .map(|c| row.try_get::<String, _>(c.ordinal()).unwrap_or_default())
                        .collect::<Vec<_>>()
                        .join(" | ")
                })
                .collect::<Vec<_>>()
                .join("\n");

            Ok(ExplainResult {
                plan_text,
                planning_time_ms: 0.0,
                execution_time_ms: 0.0,
                hints: Vec::new(),
            })
        })
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_identifier(name, '`', '`')
    }
}
