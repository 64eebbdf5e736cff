//! The three capability contracts every adapter implements: connection
//! tester, schema discoverer, query executor — independent of backend.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::CapabilityResult;
use crate::results::{
    ColumnStats, EnumDistributionResult, ExecuteResult, ExplainResult, ForeignKeysResult,
    JoinAnalysis, QueryExecutionResult, TableMetadata, ValueOverlapResult,
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Upper bound on rows returned by a bounded query, regardless of the
/// caller-requested limit.
pub const MAX_QUERY_LIMIT: i64 = 1000;

/// `min(max(limit, MaxQueryLimit-if-non-positive), MaxQueryLimit)` — a
/// non-positive requested limit is treated as "use the cap".
pub fn effective_limit(limit: i64) -> i64 {
    if limit <= 0 {
        MAX_QUERY_LIMIT
    } else {
        limit.min(MAX_QUERY_LIMIT)
    }
}

/// Generic identifier-quoting helper: doubles occurrences of the close
/// character and surrounds the name with the quote pair. Adapters call this
/// with their dialect's quote characters rather than reimplementing the
/// escaping rule.
pub fn quote_identifier(name: &str, open: char, close: char) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push(open);
    for c in name.chars() {
        if c == close {
            out.push(close);
        }
        out.push(c);
    }
    out.push(close);
    out
}

/// A `(schema, table, column)` triple naming a column for cross-table
/// operations like `ValueOverlap` and `JoinAnalysis`.
#[derive(Clone, Copy, Debug)]
pub struct ColumnRef<'a> {
    pub schema: &'a str,
    pub table: &'a str,
    pub column: &'a str,
}

/// Tests connectivity and identity of the connection behind a pool handle.
pub trait ConnectionTester: Send + Sync {
    /// Native ping, then a constant-select round trip, then a
    /// case-insensitive current-database check. Any mismatch fails with
    /// [`crate::CapabilityError::wrong_database`].
    fn test<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, CapabilityResult<()>>;

    /// Releases adapter-owned resources. Does NOT dispose the pool owned by
    /// the connection manager.
    fn close<'a>(&'a self) -> BoxFuture<'a, CapabilityResult<()>>;
}

/// Discovers schema metadata and cross-table statistics.
pub trait SchemaDiscoverer: Send + Sync {
    fn tables<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, CapabilityResult<Vec<TableMetadata>>>;

    fn columns<'a>(
        &'a self,
        schema: &'a str,
        table: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CapabilityResult<Vec<crate::results::ColumnMetadata>>>;

    fn foreign_keys<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, CapabilityResult<ForeignKeysResult>>;

    /// Degrades gracefully per column: tries the rich (length-aware) query
    /// first for text-compatible types, falls back to the length-free
    /// variant on failure, and reports a zeroed [`ColumnStats`] entry if
    /// both fail. The call as a whole never fails because of a single
    /// column.
    fn column_stats<'a>(
        &'a self,
        schema: &'a str,
        table: &'a str,
        columns: &'a [String],
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CapabilityResult<Vec<ColumnStats>>>;

    fn value_overlap<'a>(
        &'a self,
        source: ColumnRef<'a>,
        target: ColumnRef<'a>,
        sample_limit: u64,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CapabilityResult<ValueOverlapResult>>;

    fn join_analysis<'a>(
        &'a self,
        source: ColumnRef<'a>,
        target: ColumnRef<'a>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CapabilityResult<JoinAnalysis>>;

    fn distinct_values<'a>(
        &'a self,
        schema: &'a str,
        table: &'a str,
        column: &'a str,
        limit: u64,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CapabilityResult<Vec<Value>>>;

    fn enum_distribution<'a>(
        &'a self,
        schema: &'a str,
        table: &'a str,
        column: &'a str,
        completion_timestamp_col: Option<&'a str>,
        limit: u64,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CapabilityResult<EnumDistributionResult>>;
}

/// Issues bounded queries and unbounded DDL/DML.
pub trait QueryExecutor: Send + Sync {
    /// Bounded: the executor wraps `sql` as a subquery and applies a
    /// backend-appropriate top/limit clause at [`effective_limit`].
    fn query<'a>(
        &'a self,
        sql: &'a str,
        limit: i64,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CapabilityResult<QueryExecutionResult>>;

    fn query_with_params<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
        limit: i64,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CapabilityResult<QueryExecutionResult>>;

    /// Unbounded DDL/DML. Attempts a row-returning execution first; if no
    /// columns are reported, falls back to a side-effect execution and
    /// reports `rows_affected`.
    fn execute<'a>(&'a self, sql: &'a str, cancel: &'a CancellationToken) -> BoxFuture<'a, CapabilityResult<ExecuteResult>>;

    fn execute_with_params<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CapabilityResult<ExecuteResult>>;

    /// Prepares the statement without executing it; any parse/bind failure
    /// surfaces.
    fn validate<'a>(&'a self, sql: &'a str, cancel: &'a CancellationToken) -> BoxFuture<'a, CapabilityResult<()>>;

    /// Plan text plus performance hints; timing fields are zero when the
    /// backend does not report them.
    fn explain<'a>(&'a self, sql: &'a str, cancel: &'a CancellationToken) -> BoxFuture<'a, CapabilityResult<ExplainResult>>;

    /// Backend-specific identifier quoting. Callers MUST use this to
    /// compose dynamic SQL and MUST NOT concatenate user input.
    fn quote_identifier(&self, name: &str) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_limit_uses_cap() {
        assert_eq!(effective_limit(0), MAX_QUERY_LIMIT);
        assert_eq!(effective_limit(-5), MAX_QUERY_LIMIT);
    }

    #[test]
    fn positive_limit_under_cap_passes_through() {
        assert_eq!(effective_limit(50), 50);
    }

    #[test]
    fn positive_limit_over_cap_is_clamped() {
        assert_eq!(effective_limit(5_000), MAX_QUERY_LIMIT);
    }

    #[test]
    fn quote_identifier_doubles_close_character() {
        assert_eq!(quote_identifier("a\"b", '"', '"'), "\"a\"\"b\"");
    }

    #[test]
    fn quote_identifier_plain_name() {
        assert_eq!(quote_identifier("users", '"', '"'), "\"users\"");
    }

    #[test]
    fn quote_identifier_with_backtick_dialect() {
        assert_eq!(quote_identifier("col`x", '`', '`'), "`col``x`");
    }
}
