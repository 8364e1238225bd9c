//! Cross-source merge of independent estimates of the same flows
//!
//! Before two sources can be lined up their records must be on the same
//! footing: same units, same (yearly) frequency, and the same names for the
//! same canonical countries. `merge_sources` takes care of all three and
//! concatenates the results; each row keeps its `source` tag so the same
//! flow appears once per source.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use log::{debug, info};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::{HarmonizeError, Result};
use crate::models::TradeRecord;
use crate::utils::logging::{log_operation_complete, log_operation_start, log_warning};

/// Flag attached to trailing-twelve-month estimates
pub const ESTIMATE_FLAG: &str = "estimate";

/// Unit conversions applied before comparing sources: (from, to, factor)
pub const UNIT_CONVERSIONS: [(&str, &str, f64); 2] =
    [("1000 US$", "usd", 1000.0), ("tonnes", "kg", 1000.0)];

/// Convert values to the common units
///
/// # Returns
/// The number of records converted
pub fn normalize_units(records: &mut [TradeRecord]) -> usize {
    let mut converted = 0;
    for record in records.iter_mut() {
        if let Some((_, to, factor)) =
            UNIT_CONVERSIONS.iter().find(|(from, _, _)| *from == record.unit)
        {
            record.value *= factor;
            record.unit = (*to).to_string();
            converted += 1;
        }
    }
    converted
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct YearKey {
    source: String,
    reporter_code: i64,
    partner_code: Option<i64>,
    product_code: String,
    element: String,
    unit: String,
    year: i32,
}

impl YearKey {
    fn of(record: &TradeRecord, year: i32) -> Self {
        Self {
            source: record.source.clone(),
            reporter_code: record.reporter_code,
            partner_code: record.partner_code,
            product_code: record.product_code.clone(),
            element: record.element.clone(),
            unit: record.unit.clone(),
            year,
        }
    }
}

/// Months between two `YYYYMM` periods
const fn month_index(period: i32) -> i32 {
    (period / 100) * 12 + (period % 100 - 1)
}

/// Sum monthly records into calendar years
///
/// Yearly records pass through untouched. For every `(source, reporter)` the
/// most recent reported month determines the latest year: if it is not
/// December, that year is incomplete and its value is replaced by the sum of
/// the twelve months ending at the last reported month, flagged
/// [`ESTIMATE_FLAG`].
#[must_use]
pub fn annualize_monthly(records: Vec<TradeRecord>) -> Vec<TradeRecord> {
    let (monthly, mut yearly): (Vec<TradeRecord>, Vec<TradeRecord>) =
        records.into_iter().partition(TradeRecord::is_monthly);
    if monthly.is_empty() {
        return yearly;
    }

    let mut last_period: FxHashMap<(&str, i64), i32> = FxHashMap::default();
    for record in &monthly {
        let last = last_period
            .entry((record.source.as_str(), record.reporter_code))
            .or_insert(record.period);
        *last = (*last).max(record.period);
    }

    let mut sums: BTreeMap<YearKey, TradeRecord> = BTreeMap::new();
    let mut estimates: BTreeMap<YearKey, TradeRecord> = BTreeMap::new();
    for record in &monthly {
        let last = last_period[&(record.source.as_str(), record.reporter_code)];
        add_to_year(&mut sums, record, record.year);

        if last % 100 != 12 {
            let lag = month_index(last) - month_index(record.period);
            if (0..12).contains(&lag) {
                add_to_year(&mut estimates, record, last / 100);
            }
        }
    }

    let estimated = estimates.len();
    for (key, mut estimate) in estimates {
        estimate.flag = Some(ESTIMATE_FLAG.to_string());
        sums.insert(key, estimate);
    }
    if estimated > 0 {
        info!("Annualization: {estimated} trailing twelve month estimates for incomplete years");
    }

    debug!("Annualization: {} monthly rows into {} yearly rows", monthly.len(), sums.len());
    yearly.extend(sums.into_values());
    yearly
}

fn add_to_year(sums: &mut BTreeMap<YearKey, TradeRecord>, record: &TradeRecord, year: i32) {
    sums.entry(YearKey::of(record, year))
        .and_modify(|sum| {
            sum.value += record.value;
            if sum.flag != record.flag {
                sum.flag = None;
            }
        })
        .or_insert_with(|| {
            let mut sum = record.clone();
            sum.period = year;
            sum.year = year;
            sum
        });
}

/// Country codes that carry more than one name across the given records
fn name_conflicts(records: &[TradeRecord]) -> Vec<String> {
    let mut names: BTreeMap<i64, BTreeSet<&str>> = BTreeMap::new();
    for record in records {
        names.entry(record.reporter_code).or_default().insert(&record.reporter);
        if let (Some(code), Some(name)) = (record.partner_code, record.partner.as_deref()) {
            names.entry(code).or_default().insert(name);
        }
    }
    names
        .into_iter()
        .filter(|(_, n)| n.len() > 1)
        .map(|(code, n)| format!("{code}: {}", n.into_iter().collect::<Vec<_>>().join(" / ")))
        .collect()
}

/// Merge the harmonized records of several sources into one table
///
/// Units are normalized, monthly data are annualized, and country names are
/// checked for consistency across sources before concatenation.
///
/// # Errors
/// Returns `Configuration` if a record has not been resolved to canonical
/// codes, and `CrosswalkIntegrity` if `strict` is set and a country code
/// carries different names in different rows
pub fn merge_sources(sources: Vec<Vec<TradeRecord>>, strict: bool) -> Result<Vec<TradeRecord>> {
    let start = Instant::now();
    let total: usize = sources.iter().map(Vec::len).sum();
    log_operation_start("Merging sources", total);

    let mut merged = Vec::with_capacity(total);
    for mut records in sources {
        if let Some(raw) = records.iter().find(|r| !r.harmonized) {
            return Err(HarmonizeError::config(format!(
                "merging requires resolved records, found native {} row for reporter {}",
                raw.source, raw.reporter_code
            )));
        }
        let converted = normalize_units(&mut records);
        if converted > 0 {
            debug!("Normalized units of {converted} rows");
        }
        merged.extend(annualize_monthly(records));
    }

    let conflicts = name_conflicts(&merged);
    if !conflicts.is_empty() {
        let detail = conflicts.join("; ");
        if strict {
            return Err(HarmonizeError::crosswalk(format!(
                "country codes with conflicting names across sources: {detail}"
            )));
        }
        log_warning("Country codes with conflicting names across sources", Some(&detail));
    }

    log_operation_complete("merged", merged.len(), Some(start.elapsed()));
    Ok(merged)
}

/// Values of the same flow in each source, side by side
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceComparison {
    pub reporter_code: i64,
    pub partner_code: Option<i64>,
    pub product_code: String,
    pub element: String,
    pub unit: String,
    pub year: i32,
    /// Summed value per source
    pub values: BTreeMap<String, f64>,
}

impl SourceComparison {
    /// Value reported by one source
    #[must_use]
    pub fn value(&self, source: &str) -> Option<f64> {
        self.values.get(source).copied()
    }

    /// `value(a) - value(b)` when both sources report the flow
    #[must_use]
    pub fn difference(&self, a: &str, b: &str) -> Option<f64> {
        Some(self.value(a)? - self.value(b)?)
    }
}

/// Pivot merged records so each flow and year has one row with a value per source
#[must_use]
pub fn compare_sources(records: &[TradeRecord]) -> Vec<SourceComparison> {
    let mut pivot: BTreeMap<(i64, Option<i64>, &str, &str, &str, i32), BTreeMap<String, f64>> =
        BTreeMap::new();
    for record in records {
        let key = (
            record.reporter_code,
            record.partner_code,
            record.product_code.as_str(),
            record.element.as_str(),
            record.unit.as_str(),
            record.year,
        );
        *pivot
            .entry(key)
            .or_default()
            .entry(record.source.clone())
            .or_insert(0.0) += record.value;
    }

    pivot
        .into_iter()
        .map(
            |((reporter_code, partner_code, product_code, element, unit, year), values)| {
                SourceComparison {
                    reporter_code,
                    partner_code,
                    product_code: product_code.to_string(),
                    element: element.to_string(),
                    unit: unit.to_string(),
                    year,
                    values,
                }
            },
        )
        .collect()
}
