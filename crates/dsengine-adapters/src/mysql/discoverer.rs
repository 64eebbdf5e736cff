use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use sqlx::Row;
use tokio_util::sync::CancellationToken;

use dsengine_capability::{
    quote_identifier, CapabilityError, CapabilityResult, ColumnMetadata, ColumnRef, ColumnStats,
    EnumDistributionResult, EnumValueDistribution, EnumValueHeuristic, ForeignKeyMetadata,
    ForeignKeysResult, JoinAnalysis, SchemaDiscoverer, TableMetadata, ValueOverlapResult,
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

fn backend_err(e: sqlx::Error) -> CapabilityError {
    CapabilityError::Backend(e.to_string())
}

fn quote(name: &str) -> String {
    quote_identifier(name, '`', '`')
}

pub struct MySqlDiscoverer {
    pool: sqlx::MySqlPool,
}

impl MySqlDiscoverer {
    pub fn new(pool: sqlx::MySqlPool) -> Self {
        Self { pool }
    }
}

impl SchemaDiscoverer for MySqlDiscoverer {
    fn tables<'a>(&'a self, _cancel: &'a CancellationToken) -> BoxFuture<'a, CapabilityResult<Vec<TableMetadata>>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT table_schema AS `schema`, table_name AS name, \
                 table_type = 'VIEW' AS is_view, table_rows AS row_estimate \
                 FROM information_schema.tables \
                 WHERE table_schema = database() \
                 ORDER BY `schema`, name",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(backend_err)?;

            Ok(rows
                .into_iter()
                .map(|row| TableMetadata {
                    schema: row.get("schema"),
                    name: row.get("name"),
                    is_view: row.get::<i64, _>("is_view") != 0,
                    row_estimate: row.try_get("row_estimate").ok(),
                })
                .collect())
        })
    }

    fn columns<'a>(
        &'a self,
        schema: &'a str,
        table: &'a str,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CapabilityResult<Vec<ColumnMetadata>>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT column_name, data_type, is_nullable = 'YES' AS nullable, \
                 ordinal_position, column_default \
                 FROM information_schema.columns \
                 WHERE table_schema = ? AND table_name = ? \
                 ORDER BY ordinal_position",
            )
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(backend_err)?;

            Ok(rows
                .into_iter()
                .map(|row| ColumnMetadata {
                    schema: schema.to_string(),
                    table: table.to_string(),
                    name: row.get("column_name"),
                    data_type: row.get("data_type"),
                    nullable: row.get::<i64, _>("nullable") != 0,
                    ordinal_position: row.get("ordinal_position"),
                    default: row.try_get("column_default").ok(),
                })
                .collect())
        })
    }

    fn foreign_keys<'a>(&'a self, _cancel: &'a CancellationToken) -> BoxFuture<'a, CapabilityResult<ForeignKeysResult>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT constraint_name, table_schema AS `schema`, table_name AS `table`, \
                 column_name AS `column`, referenced_table_schema AS ref_schema, \
                 referenced_table_name AS ref_table, referenced_column_name AS ref_column \
                 FROM information_schema.key_column_usage \
                 WHERE table_schema = database() AND referenced_table_name IS NOT NULL",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(backend_err)?;

            let foreign_keys = rows
                .into_iter()
                .map(|row| ForeignKeyMetadata {
                    constraint_name: row.get("constraint_name"),
                    schema: row.get("schema"),
                    table: row.get("table"),
                    column: row.get("column"),
                    ref_schema: row.get("ref_schema"),
                    ref_table: row.get("ref_table"),
                    ref_column: row.get("ref_column"),
                })
                .collect();

            Ok(ForeignKeysResult {
                supported: true,
                foreign_keys,
            })
        })
    }

    fn column_stats<'a>(
        &'a self,
        schema: &'a str,
        table: &'a str,
        columns: &'a [String],
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CapabilityResult<Vec<ColumnStats>>> {
        Box::pin(async move {
            let qualified = format!("{}.{}", quote(schema), quote(table));
            let mut out = Vec::with_capacity(columns.len());

            for column in columns {
                let qcol = quote(column);
                let rich = format!(
                    "SELECT count({qcol}) AS non_null_count, count(DISTINCT {qcol}) AS distinct_count, \
                     min(char_length({qcol})) AS min_length, max(char_length({qcol})) AS max_length \
                     FROM {qualified}"
                );

                let stats = match sqlx::query(&rich).fetch_one(&self.pool).await {
                    Ok(row) => ColumnStats {
                        column: column.clone(),
                        non_null_count: row.try_get::<i64, _>("non_null_count").unwrap_or(0).max(0) as u64,
                        distinct_count: row.try_get::<i64, _>("distinct_count").unwrap_or(0).max(0) as u64,
                        min_length: row.try_get("min_length").ok(),
                        max_length: row.try_get("max_length").ok(),
                    },
                    Err(_) => {
                        let plain = format!(
                            "SELECT count({qcol}) AS non_null_count, count(DISTINCT {qcol}) AS distinct_count \
                             FROM {qualified}"
                        );
                        match sqlx::query(&plain).fetch_one(&self.pool).await {
                            Ok(row) => ColumnStats {
                                column: column.clone(),
                                non_null_count: row.try_get::<i64, _>("non_null_count").unwrap_or(0).max(0) as u64,
                                distinct_count: row.try_get::<i64, _>("distinct_count").unwrap_or(0).max(0) as u64,
                                min_length: None,
                                max_length: None,
                            },
                            Err(_) => ColumnStats::degraded(column.clone()),
                        }
                    }
                };
                out.push(stats);
            }

            Ok(out)
        })
    }

    fn value_overlap<'a>(
        &'a self,
        source: ColumnRef<'a>,
        target: ColumnRef<'a>,
        sample_limit: u64,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CapabilityResult<ValueOverlapResult>> {
        Box::pin(async move {
            let src_table = format!("{}.{}", quote(source.schema), quote(source.table));
            let src_col = quote(source.column);
            let dst_table = format!("{}.{}", quote(target.schema), quote(target.table));
            let dst_col = quote(target.column);

            let source_distinct: i64 = sqlx::query_scalar(&format!(
                "SELECT count(DISTINCT {src_col}) FROM (SELECT {src_col} FROM {src_table} LIMIT ?) s"
            ))
            .bind(sample_limit as i64)
            .fetch_one(&self.pool)
            .await
            .map_err(backend_err)?;

            let target_distinct: i64 = sqlx::query_scalar(&format!(
                "SELECT count(DISTINCT {dst_col}) FROM (SELECT {dst_col} FROM {dst_table} LIMIT ?) t"
            ))
            .bind(sample_limit as i64)
            .fetch_one(&self.pool)
            .await
            .map_err(backend_err)?;

            let matched: i64 = sqlx::query_scalar(&format!(
                "SELECT count(DISTINCT s.{src_col}) FROM (SELECT {src_col} FROM {src_table} LIMIT ?) s \
                 WHERE s.{src_col} IN (SELECT {dst_col} FROM {dst_table})"
            ))
            .bind(sample_limit as i64)
            .fetch_one(&self.pool)
            .await
            .map_err(backend_err)?;

            Ok(ValueOverlapResult::new(
                source_distinct.max(0) as u64,
                target_distinct.max(0) as u64,
                matched.max(0) as u64,
            ))
        })
    }

    fn join_analysis<'a>(
        &'a self,
        source: ColumnRef<'a>,
        target: ColumnRef<'a>,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CapabilityResult<JoinAnalysis>> {
        Box::pin(async move {
            let src_table = format!("{}.{}", quote(source.schema), quote(source.table));
            let src_col = quote(source.column);
            let dst_table = format!("{}.{}", quote(target.schema), quote(target.table));
            let dst_col = quote(target.column);

            let forward_orphans: i64 = sqlx::query_scalar(&format!(
                "SELECT count(*) FROM {src_table} s WHERE s.{src_col} IS NOT NULL \
                 AND NOT EXISTS (SELECT 1 FROM {dst_table} t WHERE t.{dst_col} = s.{src_col})"
            ))
            .fetch_one(&self.pool)
            .await
            .map_err(backend_err)?;

            let reverse_orphans: i64 = sqlx::query_scalar(&format!(
                "SELECT count(*) FROM {dst_table} t WHERE t.{dst_col} IS NOT NULL \
                 AND NOT EXISTS (SELECT 1 FROM {src_table} s WHERE s.{src_col} = t.{dst_col})"
            ))
            .fetch_one(&self.pool)
            .await
            .map_err(backend_err)?;

            Ok(JoinAnalysis {
                forward_orphans: forward_orphans.max(0) as u64,
                reverse_orphans: reverse_orphans.max(0) as u64,
            })
        })
    }

    fn distinct_values<'a>(
        &'a self,
        schema: &'a str,
        table: &'a str,
        column: &'a str,
        limit: u64,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CapabilityResult<Vec<Value>>> {
        Box::pin(async move {
            let qualified = format!("{}.{}", quote(schema), quote(table));
            let qcol = quote(column);
            let sql = format!(
                "SELECT DISTINCT CAST({qcol} AS CHAR) AS v FROM {qualified} WHERE {qcol} IS NOT NULL LIMIT ?"
            );
            let rows = sqlx::query(&sql)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(backend_err)?;

            Ok(rows
                .into_iter()
                .map(|row| Value::from(row.get::<String, _>("v")))
                .collect())
        })
    }

    fn enum_distribution<'a>(
        &'a self,
        schema: &'a str,
        table: &'a str,
        column: &'a str,
        completion_timestamp_col: Option<&'a str>,
        limit: u64,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CapabilityResult<EnumDistributionResult>> {
        Box::pin(async move {
            let qualified = format!("{}.{}", quote(schema), quote(table));
            let qcol = quote(column);

            let sql = format!(
                "SELECT CAST({qcol} AS CHAR) AS value, count(*) AS cnt \
                 FROM {qualified} WHERE {qcol} IS NOT NULL \
                 GROUP BY {qcol} ORDER BY cnt DESC LIMIT ?"
            );
            let rows = sqlx::query(&sql)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(backend_err)?;

            let total: i64 = rows.iter().map(|r| r.get::<i64, _>("cnt")).sum();
            let max_count = rows.iter().map(|r| r.get::<i64, _>("cnt")).max().unwrap_or(0);
            let avg_count = if rows.is_empty() { 0.0 } else { total as f64 / rows.len() as f64 };

            let mut distributions = Vec::with_capacity(rows.len());
            for row in &rows {
                let value: String = row.get("value");
                let count: i64 = row.get("cnt");

                let completion_rate = if let Some(ts_col) = completion_timestamp_col {
                    let qts = quote(ts_col);
                    let completed: i64 = sqlx::query_scalar(&format!(
                        "SELECT count(*) FROM {qualified} WHERE CAST({qcol} AS CHAR) = ? AND {qts} IS NOT NULL"
                    ))
                    .bind(&value)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(backend_err)?;
                    Some(if count == 0 { 0.0 } else { completed as f64 / count as f64 })
                } else {
                    None
                };

                let heuristic = completion_rate.and_then(|rate| {
                    if rate >= 0.95 {
                        Some(EnumValueHeuristic::Terminal)
                    } else if rate <= 0.05 && (count as f64) >= avg_count / 2.0 {
                        Some(EnumValueHeuristic::Initial)
                    } else {
                        None
                    }
                }).or_else(|| {
                    if max_count > 0 && (count as f64) < max_count as f64 * 0.05 {
                        Some(EnumValueHeuristic::ErrorOrRare)
                    } else {
                        None
                    }
                });

                distributions.push(EnumValueDistribution {
                    value,
                    count: count.max(0) as u64,
                    percentage: if total == 0 { 0.0 } else { count as f64 / total as f64 * 100.0 },
                    completion_rate,
                    heuristic,
                });
            }

            Ok(EnumDistributionResult { distributions })
        })
    }
}
