//! Consistency check between a reported aggregate and its constituents

use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;

use crate::crosswalk::CountryCrosswalk;
use crate::models::TradeRecord;

/// Reported aggregate versus the sum of its individual-country constituents
/// for one `(source, partner, product, element, unit, period)` key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateCheck {
    pub source: String,
    pub partner_code: Option<i64>,
    pub product_code: String,
    pub element: String,
    pub unit: String,
    pub period: i32,
    /// Value reported by the aggregate entity, if it reported this key
    pub aggregate_value: Option<f64>,
    /// Sum over reporters that are individual countries
    pub constituents_value: f64,
    pub constituent_count: usize,
}

impl AggregateCheck {
    /// `aggregate_value - constituents_value`
    #[must_use]
    pub fn difference(&self) -> Option<f64> {
        self.aggregate_value.map(|v| v - self.constituents_value)
    }

    /// Difference relative to the aggregate, in percent; `None` for a zero aggregate
    #[must_use]
    pub fn relative_difference(&self) -> Option<f64> {
        match self.aggregate_value {
            Some(v) if v != 0.0 => Some((v - self.constituents_value) / v * 100.0),
            _ => None,
        }
    }
}

type CheckKey = (String, Option<i64>, String, String, String, i32);

/// Compare the rows reported by `aggregate_code` (e.g. World) with the sum of
/// the rows reported by individual countries, key by key
///
/// Reporters flagged as aggregates in the crosswalk are never counted as
/// constituents. Output is sorted by key.
#[must_use]
pub fn compare_aggregate_to_constituents(
    records: &[TradeRecord],
    crosswalk: &CountryCrosswalk,
    aggregate_code: i64,
) -> Vec<AggregateCheck> {
    let mut checks: BTreeMap<CheckKey, (Option<f64>, f64, usize)> = BTreeMap::new();

    for record in records {
        let is_target = record.reporter_code == aggregate_code;
        if !is_target && crosswalk.is_aggregate(record.reporter_code) {
            continue;
        }
        let key = (
            record.source.clone(),
            record.partner_code,
            record.product_code.clone(),
            record.element.clone(),
            record.unit.clone(),
            record.period,
        );
        let entry = checks.entry(key).or_insert((None, 0.0, 0));
        if is_target {
            entry.0 = Some(entry.0.unwrap_or(0.0) + record.value);
        } else {
            entry.1 += record.value;
            entry.2 += 1;
        }
    }

    debug!("Aggregate check for {aggregate_code}: {} keys", checks.len());
    checks
        .into_iter()
        .map(|(key, (aggregate, sum, count))| {
            let (source, partner_code, product_code, element, unit, period) = key;
            AggregateCheck {
                source,
                partner_code,
                product_code,
                element,
                unit,
                period,
                aggregate_value: aggregate,
                constituents_value: sum,
                constituent_count: count,
            }
        })
        .collect()
}
