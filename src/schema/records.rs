//! Conversions for trade records, grouped records and trend results

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, FieldRef, Schema};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use serde_arrow::schema::{SchemaLike, TracingOptions};

use crate::algorithm::aggregation::GroupedRecord;
use crate::algorithm::trend::{TrendResult, TrendStatus};
use crate::error::Result;
use crate::models::TradeRecord;
use crate::schema::require_columns;

/// Columns every trade record batch must carry without nulls
pub const TRADE_RECORD_COLUMNS: [&str; 9] = [
    "source",
    "reporter_code",
    "reporter",
    "product_code",
    "element",
    "period",
    "year",
    "unit",
    "value",
];

/// Column order of [`trend_results_to_batch`] output
pub const TREND_RESULT_COLUMNS: [&str; 22] = [
    "source",
    "reporter_code",
    "partner_code",
    "product_code",
    "element",
    "unit",
    "status",
    "n_points",
    "segment_count",
    "start_year",
    "end_year",
    "slope",
    "intercept",
    "fit_score",
    "mk_slope",
    "mk_p_value",
    "mk_trend",
    "mk_significant",
    "relative_change",
    "absolute_change",
    "reference_start",
    "reference_end",
];

/// Arrow schema of a trade record batch
#[must_use]
pub fn trade_record_schema() -> Schema {
    Schema::new(vec![
        Field::new("source", DataType::Utf8, false),
        Field::new("reporter_code", DataType::Int64, false),
        Field::new("reporter", DataType::Utf8, false),
        Field::new("partner_code", DataType::Int64, true),
        Field::new("partner", DataType::Utf8, true),
        Field::new("product_code", DataType::Utf8, false),
        Field::new("product", DataType::Utf8, true),
        Field::new("element", DataType::Utf8, false),
        Field::new("period", DataType::Int32, false),
        Field::new("year", DataType::Int32, false),
        Field::new("unit", DataType::Utf8, false),
        Field::new("value", DataType::Float64, false),
        Field::new("flag", DataType::Utf8, true),
        Field::new("harmonized", DataType::Boolean, false),
    ])
}

/// Read trade records from a batch
///
/// The optional columns `partner_code`, `partner`, `product`, `flag` and
/// `harmonized` may be absent.
///
/// # Errors
/// Returns `Schema` if a mandatory column is missing or contains nulls, and
/// `Serialization` if a column has an incompatible type
pub fn records_from_batch(batch: &RecordBatch) -> Result<Vec<TradeRecord>> {
    require_columns(batch, &TRADE_RECORD_COLUMNS, "Trade record")?;
    Ok(serde_arrow::from_record_batch::<Vec<TradeRecord>>(batch)?)
}

/// Write trade records to a batch with [`trade_record_schema`]
///
/// # Errors
/// Returns `Serialization` if the records cannot be converted
pub fn records_to_batch(records: &[TradeRecord]) -> Result<RecordBatch> {
    let fields: Vec<FieldRef> = trade_record_schema().fields().iter().map(Arc::clone).collect();
    Ok(serde_arrow::to_record_batch(&fields, &records)?)
}

/// Write grouped records to a batch
///
/// # Errors
/// Returns `Serialization` if the schema cannot be traced or the records
/// cannot be converted
pub fn grouped_to_batch(records: &[GroupedRecord]) -> Result<RecordBatch> {
    let fields = Vec::<FieldRef>::from_type::<GroupedRecord>(TracingOptions::default())?;
    Ok(serde_arrow::to_record_batch(&fields, &records)?)
}

/// One trend result flattened to a table row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRow {
    pub source: String,
    pub reporter_code: i64,
    pub partner_code: Option<i64>,
    pub product_code: String,
    pub element: String,
    pub unit: String,
    /// `ok` or `insufficient_data`
    pub status: String,
    pub n_points: u64,
    pub segment_count: u64,
    /// Bounds and fit of the most recent segment
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub slope: Option<f64>,
    pub intercept: Option<f64>,
    pub fit_score: Option<f64>,
    pub mk_slope: Option<f64>,
    pub mk_p_value: Option<f64>,
    pub mk_trend: Option<String>,
    pub mk_significant: bool,
    pub relative_change: Option<f64>,
    pub absolute_change: Option<f64>,
    pub reference_start: Option<i32>,
    pub reference_end: Option<i32>,
}

impl From<&TrendResult> for TrendRow {
    fn from(result: &TrendResult) -> Self {
        let segment = result.most_recent_segment.as_ref();
        let latest = result.changes.last();
        Self {
            source: result.key.source.clone(),
            reporter_code: result.key.reporter_code,
            partner_code: result.key.partner_code,
            product_code: result.key.product_code.clone(),
            element: result.key.element.clone(),
            unit: result.key.unit.clone(),
            status: match result.status {
                TrendStatus::Ok => "ok".to_string(),
                TrendStatus::InsufficientData { .. } => "insufficient_data".to_string(),
            },
            n_points: result.n_points as u64,
            segment_count: result.segments.len() as u64,
            start_year: segment.map(|s| s.start_year),
            end_year: segment.map(|s| s.end_year),
            slope: segment.map(|s| s.slope),
            intercept: segment.map(|s| s.intercept),
            fit_score: segment.map(|s| s.fit_score),
            mk_slope: result.mk_slope,
            mk_p_value: result.mann_kendall.map(|mk| mk.p_value),
            mk_trend: result.mann_kendall.map(|mk| mk.trend.to_string()),
            mk_significant: result.mk_significant,
            relative_change: result.relative_change,
            absolute_change: result.absolute_change,
            reference_start: latest.map(|c| c.reference_start),
            reference_end: latest.map(|c| c.reference_end),
        }
    }
}

/// Write trend results to a batch, one row per series
///
/// # Errors
/// Returns `Serialization` if the schema cannot be traced or the rows cannot
/// be converted
pub fn trend_results_to_batch(results: &[TrendResult]) -> Result<RecordBatch> {
    let rows: Vec<TrendRow> = results.iter().map(TrendRow::from).collect();
    let fields = Vec::<FieldRef>::from_type::<TrendRow>(TracingOptions::default())?;
    Ok(serde_arrow::to_record_batch(&fields, &rows)?)
}
