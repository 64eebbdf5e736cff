//! Capability result records.
//!
//! Plain value types, serializable for the upper layers that forward them
//! to a client. Invariants: counts are non-negative; percentages are in
//! `[0, 100]`; optional length fields are absent for non-text columns;
//! `rows_affected` is set when no rows are returned and zero when rows are
//! returned.

use serde::{Deserialize, Serialize};

/// A single table or view discovered in a schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct TableMetadata {
    pub schema: String,
    pub name: String,
    /// `true` for views, `false` for ordinary tables.
    pub is_view: bool,
    /// Planner's row estimate, when the backend exposes one.
    pub row_estimate: Option<i64>,
}

/// A single column within a table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ColumnMetadata {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub ordinal_position: i64,
    pub default: Option<String>,
}

/// A single foreign-key relationship.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ForeignKeyMetadata {
    pub constraint_name: String,
    pub schema: String,
    pub table: String,
    pub column: String,
    pub ref_schema: String,
    pub ref_table: String,
    pub ref_column: String,
}

/// `ForeignKeys` result: the relationships found plus whether the backend
/// is even capable of reporting them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ForeignKeysResult {
    pub supported: bool,
    pub foreign_keys: Vec<ForeignKeyMetadata>,
}

/// Per-column statistics. Degrades gracefully: a column whose stats query
/// (and its length-free retry) both fail appears with zero counts and
/// `None` length fields rather than failing the whole call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ColumnStats {
    pub column: String,
    pub non_null_count: u64,
    pub distinct_count: u64,
    pub min_length: Option<i64>,
    pub max_length: Option<i64>,
}

impl ColumnStats {
    /// A zeroed-out entry used when both the rich and length-free queries
    /// fail for a column — the call as a whole still succeeds.
    pub fn degraded(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            non_null_count: 0,
            distinct_count: 0,
            min_length: None,
            max_length: None,
        }
    }
}

/// Result of `ValueOverlap`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ValueOverlapResult {
    pub source_distinct: u64,
    pub target_distinct: u64,
    pub matched: u64,
    pub match_rate: f64,
}

impl ValueOverlapResult {
    pub fn new(source_distinct: u64, target_distinct: u64, matched: u64) -> Self {
        let match_rate = if source_distinct == 0 {
            0.0
        } else {
            matched as f64 / source_distinct as f64
        };
        Self {
            source_distinct,
            target_distinct,
            matched,
            match_rate,
        }
    }
}

/// Result of `JoinAnalysis`: orphans in both directions so pathological
/// inclusions are detectable.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct JoinAnalysis {
    /// Source values missing in the target.
    pub forward_orphans: u64,
    /// Target values missing in the source.
    pub reverse_orphans: u64,
}

/// Heuristic classification of an enum value's completion behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnumValueHeuristic {
    /// Completion rate >= 95%.
    Terminal,
    /// Completion rate <= 5% and count >= half the average.
    Initial,
    /// Count < 5% of the maximum count.
    ErrorOrRare,
}

/// Per-value count, share, and (when a completion-timestamp column was
/// given) completion heuristic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct EnumValueDistribution {
    pub value: String,
    pub count: u64,
    pub percentage: f64,
    pub completion_rate: Option<f64>,
    pub heuristic: Option<EnumValueHeuristic>,
}

/// Result of `EnumDistribution`: values sorted by count descending, capped
/// at the caller's limit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct EnumDistributionResult {
    pub distributions: Vec<EnumValueDistribution>,
}

/// A column descriptor in a query result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
}

/// A single result row, keyed by column name.
pub type ResultRow = std::collections::HashMap<String, serde_json::Value>;

/// Result of a bounded `Query`/`QueryWithParams` call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct QueryExecutionResult {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<ResultRow>,
    pub count: usize,
}

/// Result of an unbounded `Execute`/`ExecuteWithParams` call. Row-returning
/// executions populate `columns`/`rows`/`row_count`; side-effect-only
/// executions populate `rows_affected` instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ExecuteResult {
    pub columns: Option<Vec<ColumnDescriptor>>,
    pub rows: Option<Vec<ResultRow>>,
    pub row_count: usize,
    pub rows_affected: u64,
}

impl ExecuteResult {
    pub fn rows_returned(columns: Vec<ColumnDescriptor>, rows: Vec<ResultRow>) -> Self {
        let row_count = rows.len();
        Self {
            columns: Some(columns),
            rows: Some(rows),
            row_count,
            rows_affected: 0,
        }
    }

    pub fn side_effect(rows_affected: u64) -> Self {
        Self {
            columns: None,
            rows: None,
            row_count: 0,
            rows_affected,
        }
    }
}

/// Result of `Explain`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ExplainResult {
    pub plan_text: String,
    pub planning_time_ms: f64,
    pub execution_time_ms: f64,
    pub hints: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_overlap_match_rate_zero_when_source_empty() {
        let result = ValueOverlapResult::new(0, 5, 0);
        assert_eq!(result.match_rate, 0.0);
    }

    #[test]
    fn value_overlap_match_rate_is_ratio() {
        let result = ValueOverlapResult::new(10, 20, 4);
        assert_eq!(result.match_rate, 0.4);
    }

    #[test]
    fn execute_result_side_effect_has_zero_row_count() {
        let result = ExecuteResult::side_effect(7);
        assert_eq!(result.rows_affected, 7);
        assert_eq!(result.row_count, 0);
        assert!(result.rows.is_none());
    }

    #[test]
    fn execute_result_rows_returned_has_zero_rows_affected() {
        let result = ExecuteResult::rows_returned(
            vec![ColumnDescriptor {
                name: "id".into(),
                data_type: "int".into(),
            }],
            vec![ResultRow::new()],
        );
        assert_eq!(result.rows_affected, 0);
        assert_eq!(result.row_count, 1);
    }
}
