//! Tabular boundary between Arrow record batches and typed records
//!
//! Input batches are checked before deserialization: every mandatory column
//! must exist and be free of nulls, so malformed rows are rejected here
//! rather than deep inside aggregation logic.

pub mod crosswalk;
pub mod records;

use arrow::record_batch::RecordBatch;
use itertools::Itertools;

use crate::error::{HarmonizeError, Result};

pub use crosswalk::{country_crosswalk_from_batch, product_crosswalk_from_batch};
pub use records::{
    TREND_RESULT_COLUMNS, TRADE_RECORD_COLUMNS, TrendRow, grouped_to_batch, records_from_batch,
    records_to_batch, trend_results_to_batch, trade_record_schema,
};

/// A problem found while checking a batch against the columns a record type needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnIssue {
    Missing(String),
    Nulls { column: String, count: usize },
}

impl std::fmt::Display for ColumnIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(column) => write!(f, "missing column '{column}'"),
            Self::Nulls { column, count } => {
                write!(f, "{count} null(s) in mandatory column '{column}'")
            }
        }
    }
}

/// List the mandatory-column problems of a batch
#[must_use]
pub fn check_mandatory_columns(batch: &RecordBatch, mandatory: &[&str]) -> Vec<ColumnIssue> {
    let schema = batch.schema();
    mandatory
        .iter()
        .filter_map(|name| match schema.index_of(name) {
            Err(_) => Some(ColumnIssue::Missing((*name).to_string())),
            Ok(idx) => {
                let count = batch.column(idx).null_count();
                (count > 0).then(|| ColumnIssue::Nulls {
                    column: (*name).to_string(),
                    count,
                })
            }
        })
        .collect()
}

/// Reject a batch with mandatory-column problems
///
/// # Errors
/// Returns `Schema` listing every problem found
pub fn require_columns(batch: &RecordBatch, mandatory: &[&str], what: &str) -> Result<()> {
    let issues = check_mandatory_columns(batch, mandatory);
    if issues.is_empty() {
        return Ok(());
    }
    Err(HarmonizeError::schema(format!(
        "{what} batch rejected: {}",
        issues.iter().join("; ")
    )))
}
