//! Shared capability contracts — connection tester, schema discoverer,
//! query executor — and their result records. Independent of backend;
//! `dsengine-adapters` implements these for each concrete kind.

mod contracts;
mod error;
mod results;

pub use contracts::{
    effective_limit, quote_identifier, ColumnRef, ConnectionTester, QueryExecutor,
    SchemaDiscoverer, MAX_QUERY_LIMIT,
};
pub use error::{CapabilityError, CapabilityResult};
pub use results::{
    ColumnDescriptor, ColumnMetadata, ColumnStats, EnumDistributionResult, EnumValueDistribution,
    EnumValueHeuristic, ExecuteResult, ExplainResult, ForeignKeyMetadata, ForeignKeysResult,
    JoinAnalysis, QueryExecutionResult, ResultRow, TableMetadata, ValueOverlapResult,
};

pub use dsengine_pool::ConnectionStats;
