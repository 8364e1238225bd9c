//! Top-n ranking within slice groups

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use itertools::Itertools;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{HarmonizeError, Result};
use crate::models::{Column, KeyValue, Tabular, ValueColumn};
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// What to rank and how to partition the ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingSpec {
    /// Columns to sum; the first one is the sort key
    pub value_vars: Vec<ValueColumn>,
    /// Columns identifying a ranked row; values are summed within each key
    pub agg_groups: Vec<Column>,
    /// Columns partitioning the ranking; each partition keeps its own top `n`
    pub slice_groups: Vec<Column>,
    pub n: usize,
    /// Rank on the mean over years of the yearly sums instead of the plain sum
    #[serde(default)]
    pub time_average: bool,
}

impl RankingSpec {
    /// Start a ranking of the top `n` rows by `value`
    #[must_use]
    pub fn top(n: usize) -> Self {
        Self {
            value_vars: vec![ValueColumn::Value],
            agg_groups: Vec::new(),
            slice_groups: Vec::new(),
            n,
            time_average: false,
        }
    }

    /// Set the value columns
    #[must_use]
    pub fn with_value_vars(mut self, value_vars: Vec<ValueColumn>) -> Self {
        self.value_vars = value_vars;
        self
    }

    /// Set the aggregation key columns
    #[must_use]
    pub fn with_agg_groups(mut self, agg_groups: Vec<Column>) -> Self {
        self.agg_groups = agg_groups;
        self
    }

    /// Set the slice columns
    #[must_use]
    pub fn with_slice_groups(mut self, slice_groups: Vec<Column>) -> Self {
        self.slice_groups = slice_groups;
        self
    }

    /// Average yearly sums before ranking
    #[must_use]
    pub const fn with_time_average(mut self, time_average: bool) -> Self {
        self.time_average = time_average;
        self
    }

    /// Check the ranking can be evaluated
    ///
    /// # Errors
    /// Returns `Configuration` if `n` is zero, no value column is given, or
    /// `time_average` is combined with a time column in the keys
    pub fn validate(&self) -> Result<()> {
        if self.n == 0 {
            return Err(HarmonizeError::config("nlargest requires n > 0"));
        }
        if self.value_vars.is_empty() {
            return Err(HarmonizeError::config("nlargest requires at least one value column"));
        }
        if self.time_average
            && self
                .key_columns()
                .iter()
                .any(|c| matches!(c, Column::Year | Column::Period))
        {
            return Err(HarmonizeError::config(
                "time_average cannot be combined with year or period in the group columns",
            ));
        }
        Ok(())
    }

    /// Aggregation columns followed by slice columns not already among them
    #[must_use]
    pub fn key_columns(&self) -> Vec<Column> {
        self.agg_groups
            .iter()
            .chain(&self.slice_groups)
            .copied()
            .unique()
            .collect()
    }
}

impl fmt::Display for RankingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ranking:")?;
        writeln!(f, "  Values: {}", self.value_vars.iter().join(", "))?;
        writeln!(f, "  Aggregation Groups: {}", self.agg_groups.iter().join(", "))?;
        writeln!(f, "  Slice Groups: {}", self.slice_groups.iter().join(", "))?;
        writeln!(f, "  Top: {}", self.n)?;
        writeln!(f, "  Time Average: {}", self.time_average)
    }
}

/// One row of ranking output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRow {
    /// Values of the aggregation and slice columns
    pub keys: BTreeMap<Column, KeyValue>,
    /// Summed (or averaged) value columns, in `value_vars` order
    pub values: Vec<(ValueColumn, f64)>,
    /// 1-based position within the slice group
    pub rank: usize,
}

impl RankedRow {
    /// The primary (first) value column
    #[must_use]
    pub fn primary_value(&self) -> f64 {
        self.values.first().map_or(f64::NAN, |(_, v)| *v)
    }
}

impl Tabular for RankedRow {
    fn key_value(&self, column: Column) -> KeyValue {
        self.keys.get(&column).cloned().unwrap_or(KeyValue::Null)
    }

    fn numeric(&self, column: ValueColumn) -> Option<f64> {
        self.values.iter().find(|(c, _)| *c == column).map(|(_, v)| *v)
    }
}

/// Sum rows per key, keeping first-appearance order of the keys
fn sum_by_key<'a, I>(rows: I, width: usize) -> (Vec<Vec<KeyValue>>, Vec<Vec<f64>>)
where
    I: Iterator<Item = (Vec<KeyValue>, &'a [Option<f64>])>,
{
    let mut positions: FxHashMap<Vec<KeyValue>, usize> = FxHashMap::default();
    let mut keys = Vec::new();
    let mut sums: Vec<Vec<f64>> = Vec::new();
    for (key, values) in rows {
        let pos = *positions.entry(key.clone()).or_insert_with(|| {
            keys.push(key);
            sums.push(vec![0.0; width]);
            sums.len() - 1
        });
        for (sum, value) in sums[pos].iter_mut().zip(values) {
            if let Some(v) = *value {
                if !v.is_nan() {
                    *sum += v;
                }
            }
        }
    }
    (keys, sums)
}

/// Keep the `n` largest rows of each slice group
///
/// Values are first summed within each distinct combination of the
/// aggregation and slice columns. Each slice group is then sorted descending
/// on the first value column with a stable sort, so ties keep the order in
/// which their keys first appeared. Slice groups are emitted in ascending key
/// order; a group with fewer than `n` members is returned whole. Missing
/// numeric values count as zero.
///
/// # Errors
/// Returns `Configuration` if the ranking spec is invalid
pub fn nlargest<T: Tabular>(records: &[T], spec: &RankingSpec) -> Result<Vec<RankedRow>> {
    spec.validate()?;
    let start = Instant::now();
    log_operation_start(&format!("Ranking top {}", spec.n), records.len());

    let key_columns = spec.key_columns();
    let width = spec.value_vars.len();
    let numeric: Vec<Vec<Option<f64>>> = records
        .iter()
        .map(|r| spec.value_vars.iter().map(|c| r.numeric(*c)).collect())
        .collect();

    let (keys, values) = if spec.time_average {
        let mut with_year = key_columns.clone();
        with_year.push(Column::Year);
        let (yearly_keys, yearly_sums) = sum_by_key(
            records
                .iter()
                .zip(&numeric)
                .map(|(r, v)| (r.key_values(&with_year), v.as_slice())),
            width,
        );
        average_over_years(yearly_keys, yearly_sums, width)
    } else {
        sum_by_key(
            records
                .iter()
                .zip(&numeric)
                .map(|(r, v)| (r.key_values(&key_columns), v.as_slice())),
            width,
        )
    };

    let slice_positions: Vec<usize> = spec
        .slice_groups
        .iter()
        .filter_map(|c| key_columns.iter().position(|k| k == c))
        .collect();

    let mut slices: BTreeMap<Vec<KeyValue>, Vec<(Vec<KeyValue>, Vec<f64>)>> = BTreeMap::new();
    for (key, sums) in keys.into_iter().zip(values) {
        let slice_key = slice_positions.iter().map(|&i| key[i].clone()).collect();
        slices.entry(slice_key).or_default().push((key, sums));
    }

    let mut ranked = Vec::new();
    for (_, mut rows) in slices {
        rows.sort_by(|a, b| b.1[0].total_cmp(&a.1[0]));
        rows.truncate(spec.n);
        for (rank, (key, sums)) in rows.into_iter().enumerate() {
            ranked.push(RankedRow {
                keys: key_columns.iter().copied().zip(key).collect(),
                values: spec.value_vars.iter().copied().zip(sums).collect(),
                rank: rank + 1,
            });
        }
    }

    log_operation_complete("ranked", ranked.len(), Some(start.elapsed()));
    Ok(ranked)
}

/// Collapse `[keys.., year]` sums to the mean per key
fn average_over_years(
    yearly_keys: Vec<Vec<KeyValue>>,
    yearly_sums: Vec<Vec<f64>>,
    width: usize,
) -> (Vec<Vec<KeyValue>>, Vec<Vec<f64>>) {
    let mut positions: FxHashMap<Vec<KeyValue>, usize> = FxHashMap::default();
    let mut keys = Vec::new();
    let mut totals: Vec<(Vec<f64>, usize)> = Vec::new();
    for (mut key, sums) in yearly_keys.into_iter().zip(yearly_sums) {
        key.pop();
        let pos = *positions.entry(key.clone()).or_insert_with(|| {
            keys.push(key);
            totals.push((vec![0.0; width], 0));
            totals.len() - 1
        });
        let (total, years) = &mut totals[pos];
        for (t, s) in total.iter_mut().zip(sums) {
            *t += s;
        }
        *years += 1;
    }
    let means = totals
        .into_iter()
        .map(|(total, years)| total.into_iter().map(|t| t / years as f64).collect())
        .collect();
    (keys, means)
}
