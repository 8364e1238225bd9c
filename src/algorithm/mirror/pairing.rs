//! Mirror flow pairing
//!
//! A bilateral flow is reported twice: once by the exporter and once by the
//! importer. Pairing attaches to every reporter-perspective row the value the
//! counterpart reported for the same movement of goods (reporter and partner
//! swapped, import and export swapped, same match keys).

use std::fmt;
use std::time::Instant;

use itertools::Itertools;
use log::{debug, info};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::crosswalk::ProductCrosswalk;
use crate::error::{HarmonizeError, Result};
use crate::models::{Column, KeyValue, Tabular, TradeRecord, ValueColumn};
use crate::utils::logging::{log_operation_complete, log_operation_start, log_rows_removed};

/// Columns that pairing always handles itself
const IMPLICIT_COLUMNS: [Column; 5] = [
    Column::ReporterCode,
    Column::Reporter,
    Column::PartnerCode,
    Column::Partner,
    Column::Element,
];

/// Default match keys besides the swapped countries and the mirrored element
#[must_use]
pub fn default_match_keys() -> Vec<Column> {
    vec![Column::ProductCode, Column::Period, Column::Unit]
}

/// Configuration for cross-source mirror comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Columns that must be equal on both sides of a flow
    pub match_keys: Vec<Column>,
    /// Compare only products with a complete crosswalk mapping
    pub strict: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            match_keys: default_match_keys(),
            strict: false,
        }
    }
}

impl MirrorConfig {
    /// Set the match keys
    #[must_use]
    pub fn with_match_keys(mut self, match_keys: Vec<Column>) -> Self {
        self.match_keys = match_keys;
        self
    }

    /// Set strict mode
    #[must_use]
    pub const fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns `Configuration` when a match key is one of the columns pairing
    /// swaps or mirrors itself
    pub fn validate(&self) -> Result<()> {
        validate_match_keys(&self.match_keys)
    }

    /// Load a configuration from JSON, e.g. `{"match_keys": ["product_code", "year"]}`
    ///
    /// # Errors
    /// Returns `Configuration` if the JSON is malformed or names an invalid
    /// match key
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| HarmonizeError::config(format!("invalid mirror configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

impl fmt::Display for MirrorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mirror Configuration:")?;
        writeln!(f, "  Match Keys: {}", self.match_keys.iter().join(", "))?;
        writeln!(f, "  Strict: {}", self.strict)
    }
}

fn validate_match_keys(match_keys: &[Column]) -> Result<()> {
    if let Some(column) = match_keys.iter().find(|c| IMPLICIT_COLUMNS.contains(c)) {
        return Err(HarmonizeError::config(format!(
            "'{column}' cannot be a mirror match key: \
             reporter, partner and element are swapped implicitly"
        )));
    }
    Ok(())
}

/// A reporter-perspective row with the counterpart's report attached
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MirroredRecord {
    pub record: TradeRecord,
    /// Value reported by the partner for the same flow; `None` when unmatched
    pub value_mirror: Option<f64>,
    pub flag_mirror: Option<String>,
    /// Source of the mirror row
    pub source_mirror: Option<String>,
}

impl MirroredRecord {
    /// `value - value_mirror`
    #[must_use]
    pub fn discrepancy(&self) -> Option<f64> {
        self.value_mirror.map(|mirror| self.record.value - mirror)
    }

    /// Whether a counterpart report was found
    #[must_use]
    pub const fn is_matched(&self) -> bool {
        self.value_mirror.is_some()
    }
}

impl Tabular for MirroredRecord {
    fn key_value(&self, column: Column) -> KeyValue {
        self.record.key_value(column)
    }

    fn numeric(&self, column: ValueColumn) -> Option<f64> {
        match column {
            ValueColumn::Value => Some(self.record.value),
            ValueColumn::ValueMirror => self.value_mirror,
        }
    }
}

/// Identity of one flow from one side's perspective
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FlowKey {
    reporter_code: i64,
    partner_code: i64,
    element: String,
    keys: SmallVec<[KeyValue; 4]>,
}

impl FlowKey {
    /// Key of the record itself; `None` for records that are not a bilateral flow
    fn own(record: &TradeRecord, match_keys: &[Column]) -> Option<Self> {
        let partner_code = record.partner_code?;
        record.flow_direction()?;
        Some(Self {
            reporter_code: record.reporter_code,
            partner_code,
            element: record.element.clone(),
            keys: match_keys.iter().map(|c| record.key_value(*c)).collect(),
        })
    }

    /// Key under which the counterpart would have reported the same flow
    fn mirrored(record: &TradeRecord, match_keys: &[Column]) -> Option<Self> {
        Some(Self {
            reporter_code: record.partner_code?,
            partner_code: record.reporter_code,
            element: record.mirror_element()?,
            keys: match_keys.iter().map(|c| record.key_value(*c)).collect(),
        })
    }
}

fn duplicate_flow(match_keys: &[Column], side: &str, existing: &TradeRecord) -> HarmonizeError {
    HarmonizeError::comparison_key(format!(
        "match keys [{}] do not identify a flow uniquely in {side}: {} reporter {} partner {:?} \
         element '{}' product '{}' period {} occurs twice",
        match_keys.iter().join(", "),
        existing.source,
        existing.reporter_code,
        existing.partner_code,
        existing.element,
        existing.product_code,
        existing.period,
    ))
}

/// Index records by flow key, rejecting keys that occur twice
fn index_flows<'a>(
    records: &'a [TradeRecord],
    match_keys: &[Column],
    side: &str,
) -> Result<FxHashMap<FlowKey, &'a TradeRecord>> {
    let mut index: FxHashMap<FlowKey, &TradeRecord> = FxHashMap::default();
    for record in records {
        let Some(key) = FlowKey::own(record, match_keys) else {
            continue;
        };
        if let Some(existing) = index.insert(key, record) {
            return Err(duplicate_flow(match_keys, side, existing));
        }
    }
    Ok(index)
}

/// Reject flows that occur twice within one source; the same flow may
/// appear once per source
fn check_unique_per_source(
    records: &[TradeRecord],
    match_keys: &[Column],
    side: &str,
) -> Result<()> {
    let mut seen: FxHashMap<(&str, FlowKey), &TradeRecord> = FxHashMap::default();
    for record in records {
        let Some(key) = FlowKey::own(record, match_keys) else {
            continue;
        };
        if let Some(existing) = seen.insert((record.source.as_str(), key), record) {
            return Err(duplicate_flow(match_keys, side, existing));
        }
    }
    Ok(())
}

/// Attach to every row of `records_a` the mirror report found in `records_b`
///
/// Pass the same slice twice to pair flows within one source. Rows without a
/// partner, rows whose element is not an import or export, and rows without a
/// counterpart keep a null mirror value; no row is dropped.
///
/// # Arguments
/// * `records_a` - Reporter-perspective rows; one output row each, same order.
///   A flow may occur once per source
/// * `records_b` - Rows searched for counterpart reports
/// * `match_keys` - Columns that must match besides the swapped countries
///   and the mirrored element
///
/// # Errors
/// Returns `ComparisonKey` if the match keys do not identify a flow uniquely
/// within one source of `records_a` or within `records_b`, and
/// `Configuration` if a match key is a column that is swapped implicitly
pub fn pair_mirrors(
    records_a: &[TradeRecord],
    records_b: &[TradeRecord],
    match_keys: &[Column],
) -> Result<Vec<MirroredRecord>> {
    validate_match_keys(match_keys)?;
    let start = Instant::now();
    log_operation_start("Pairing mirror flows", records_a.len() + records_b.len());

    check_unique_per_source(records_a, match_keys, "the reporter-side input")?;
    let counterparts = index_flows(records_b, match_keys, "the mirror-side input")?;

    let paired: Vec<MirroredRecord> = records_a
        .iter()
        .map(|record| {
            let mirror =
                FlowKey::mirrored(record, match_keys).and_then(|key| counterparts.get(&key));
            MirroredRecord {
                record: record.clone(),
                value_mirror: mirror.map(|m| m.value),
                flag_mirror: mirror.and_then(|m| m.flag.clone()),
                source_mirror: mirror.map(|m| m.source.clone()),
            }
        })
        .collect();

    let matched = paired.iter().filter(|p| p.is_matched()).count();
    debug!("Mirror pairing matched {matched} of {} rows", paired.len());
    log_operation_complete("paired", matched, Some(start.elapsed()));
    Ok(paired)
}

/// Result of a cross-source mirror comparison
#[derive(Debug, Clone, Default)]
pub struct MirrorOutcome {
    pub pairs: Vec<MirroredRecord>,
    /// Rows left out because their product is only partially mapped (strict mode)
    pub excluded_rows: usize,
    /// Rows of partially mapped products summed into another row (non-strict mode)
    pub combined_rows: usize,
}

/// Compares harmonized records of two sources flow by flow
#[derive(Debug, Clone)]
pub struct MirrorComparator<'a> {
    products: &'a ProductCrosswalk,
    config: MirrorConfig,
}

impl<'a> MirrorComparator<'a> {
    /// Create a comparator
    ///
    /// # Errors
    /// Returns `Configuration` if the configuration is invalid
    pub fn new(products: &'a ProductCrosswalk, config: MirrorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { products, config })
    }

    /// Pair every row of `records_a` with its mirror report in `records_b`
    ///
    /// In strict mode only products with a complete crosswalk mapping are
    /// compared. Otherwise rows of partially mapped products that collide on
    /// the flow key are summed as a best-effort aggregation; collisions on
    /// completely mapped products still fail.
    ///
    /// # Errors
    /// Returns `Configuration` if any record has not been resolved to
    /// canonical codes, and `ComparisonKey` on non-unique flows
    pub fn compare(
        &self,
        records_a: Vec<TradeRecord>,
        records_b: Vec<TradeRecord>,
    ) -> Result<MirrorOutcome> {
        if let Some(raw) = records_a.iter().chain(&records_b).find(|r| !r.harmonized) {
            return Err(HarmonizeError::config(format!(
                "mirror comparison requires resolved records, found native {} row for reporter {}",
                raw.source, raw.reporter_code
            )));
        }

        let mut outcome = MirrorOutcome::default();
        let (records_a, records_b) = if self.config.strict {
            let (a, excluded_a) = self.retain_complete(records_a);
            let (b, excluded_b) = self.retain_complete(records_b);
            outcome.excluded_rows = excluded_a + excluded_b;
            log_rows_removed(
                "Strict mirror comparison",
                outcome.excluded_rows,
                "partially mapped products",
            );
            (a, b)
        } else {
            let (a, combined_a) = self.combine_partial(records_a);
            let (b, combined_b) = self.combine_partial(records_b);
            outcome.combined_rows = combined_a + combined_b;
            if outcome.combined_rows > 0 {
                info!(
                    "Mirror comparison: summed {} rows of partially mapped products",
                    outcome.combined_rows
                );
            }
            (a, b)
        };

        outcome.pairs = pair_mirrors(&records_a, &records_b, &self.config.match_keys)?;
        Ok(outcome)
    }

    fn retain_complete(&self, records: Vec<TradeRecord>) -> (Vec<TradeRecord>, usize) {
        let before = records.len();
        let kept: Vec<TradeRecord> = records
            .into_iter()
            .filter(|r| self.products.is_complete(&r.product_code))
            .collect();
        let excluded = before - kept.len();
        (kept, excluded)
    }

    /// Sum rows of partially mapped products sharing a source and flow key
    fn combine_partial(&self, records: Vec<TradeRecord>) -> (Vec<TradeRecord>, usize) {
        let mut positions: FxHashMap<(String, FlowKey), usize> = FxHashMap::default();
        let mut combined: Vec<TradeRecord> = Vec::with_capacity(records.len());
        let mut merged = 0;

        for record in records {
            let key = if self.products.is_complete(&record.product_code) {
                None
            } else {
                FlowKey::own(&record, &self.config.match_keys)
                    .map(|key| (record.source.clone(), key))
            };
            match key {
                Some(key) => {
                    if let Some(&pos) = positions.get(&key) {
                        let target = &mut combined[pos];
                        target.value += record.value;
                        if target.flag != record.flag {
                            target.flag = None;
                        }
                        merged += 1;
                    } else {
                        positions.insert(key, combined.len());
                        combined.push(record);
                    }
                }
                None => combined.push(record),
            }
        }
        (combined, merged)
    }
}
