//! Crosswalk resolution of source records
//!
//! The resolver looks up the reporter, partner and product codes of every
//! record in the crosswalk tables, replaces them with canonical codes and
//! names, and then collapses records that became identical keys:
//!
//! - constituents of one canonical entity (e.g. a country and a dependent
//!   territory reported separately by one source) are summed into a single
//!   canonical record;
//! - when a source reports both an already-aggregated territory and its
//!   constituents, the constituents are discarded instead of summed so the
//!   territory is not counted twice.
//!
//! Records that cannot be mapped are never silently dropped: they are
//! returned (in full or as a sample) together with a count.

use std::fmt;
use std::time::Instant;

use log::{debug, warn};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::crosswalk::CrosswalkTables;
use crate::crosswalk::tables::{CountryMatch, UnmappedKind};
use crate::error::{HarmonizeError, Result};
use crate::models::{CountryStatus, RecordKey, TradeRecord};
use crate::utils::logging::{log_operation_complete, log_operation_start, log_rows_removed};

/// What to do with records whose codes cannot be mapped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedPolicy {
    /// Remove them from the output, reporting a count and a sample
    #[default]
    Drop,
    /// Return every unmapped record with null canonical codes
    KeepWithNullCanonical,
    /// Fail the call with a crosswalk integrity error
    Fail,
}

/// What to do with repeated native rows carrying the same full key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// The last occurrence replaces earlier ones
    #[default]
    LastWriteWins,
    /// Fail the call with a duplicate record error
    Reject,
}

/// Configuration for crosswalk resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub on_unmapped: UnmappedPolicy,
    pub on_duplicate: DuplicatePolicy,
    /// Number of dropped records returned as a sample under `Drop`
    pub sample_size: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            on_unmapped: UnmappedPolicy::Drop,
            on_duplicate: DuplicatePolicy::LastWriteWins,
            sample_size: 20,
        }
    }
}

impl ResolverConfig {
    /// Set the unmapped-record policy
    #[must_use]
    pub const fn with_unmapped_policy(mut self, policy: UnmappedPolicy) -> Self {
        self.on_unmapped = policy;
        self
    }

    /// Set the duplicate-record policy
    #[must_use]
    pub const fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.on_duplicate = policy;
        self
    }

    /// Set the size of the dropped-record sample
    #[must_use]
    pub const fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }
}

impl fmt::Display for ResolverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Resolver Configuration:")?;
        writeln!(f, "  On Unmapped: {:?}", self.on_unmapped)?;
        writeln!(f, "  On Duplicate: {:?}", self.on_duplicate)?;
        writeln!(f, "  Sample Size: {}", self.sample_size)
    }
}

/// Field of a record that failed to map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappedField {
    Reporter,
    Partner,
    Product,
}

/// One failed lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmappedReason {
    pub field: MappedField,
    pub kind: UnmappedKind,
    /// The source code that failed
    pub code: String,
}

impl fmt::Display for UnmappedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} code '{}': {}", self.field, self.code, self.kind)
    }
}

/// A record that could not be fully mapped, with whatever canonical codes
/// could be resolved (`None` where the lookup failed)
#[derive(Debug, Clone, PartialEq)]
pub struct UnmappedRecord {
    /// The record with its source-native codes
    pub record: TradeRecord,
    pub reporter_canonical: Option<i64>,
    pub partner_canonical: Option<i64>,
    pub product_canonical: Option<String>,
    pub reasons: Vec<UnmappedReason>,
}

/// Counts describing what the resolver did to its input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    pub input_rows: usize,
    pub resolved_rows: usize,
    pub unmapped_rows: usize,
    /// Unmapped rows removed under the `Drop` policy
    pub dropped_rows: usize,
    /// Earlier duplicates replaced under `LastWriteWins`
    pub duplicates_replaced: usize,
    /// Rows summed into another row of the same canonical key
    pub collapsed_rows: usize,
    /// Constituent rows discarded because an aggregate row already covers them
    pub discarded_rows: usize,
}

/// Output of a resolution pass
#[derive(Debug, Clone, Default)]
pub struct ResolveOutcome {
    /// Records carrying canonical codes, one per canonical key
    pub resolved: Vec<TradeRecord>,
    /// All unmapped records under `KeepWithNullCanonical`; a sample of at most
    /// `sample_size` records under `Drop`. Unmapped records never appear in
    /// `resolved`, whatever the policy; "keep" means returned here in full.
    pub unmapped: Vec<UnmappedRecord>,
    /// Constituent records discarded to avoid double counting
    pub discarded: Vec<TradeRecord>,
    pub report: ResolveReport,
}

/// Record mapped to canonical codes, before collapsing
struct Candidate {
    record: TradeRecord,
    /// The reporter source code is an aggregate
    reporter_aggregate: bool,
    /// The partner source code is an aggregate
    partner_aggregate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CanonicalKey {
    source: String,
    reporter_code: i64,
    partner_code: Option<i64>,
    product_code: String,
    element: String,
    period: i32,
    unit: String,
}

impl CanonicalKey {
    fn of(record: &TradeRecord) -> Self {
        Self {
            source: record.source.clone(),
            reporter_code: record.reporter_code,
            partner_code: record.partner_code,
            product_code: record.product_code.clone(),
            element: record.element.clone(),
            period: record.period,
            unit: record.unit.clone(),
        }
    }
}

/// Resolves records against immutable crosswalk tables
#[derive(Debug, Clone)]
pub struct Resolver<'a> {
    tables: &'a CrosswalkTables,
    config: ResolverConfig,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over the given tables
    #[must_use]
    pub const fn new(tables: &'a CrosswalkTables, config: ResolverConfig) -> Self {
        Self { tables, config }
    }

    /// Resolve a batch of records
    ///
    /// # Errors
    /// Returns `CrosswalkIntegrity` if the policy is `Fail` and any record is
    /// unmapped, or `DuplicateRecord` if the duplicate policy is `Reject` and
    /// a key repeats
    pub fn resolve(&self, records: Vec<TradeRecord>) -> Result<ResolveOutcome> {
        let start = Instant::now();
        log_operation_start("Resolving crosswalk codes", records.len());

        let mut report = ResolveReport {
            input_rows: records.len(),
            ..ResolveReport::default()
        };

        let (records, replaced) = self.deduplicate(records)?;
        report.duplicates_replaced = replaced;

        let mut candidates = Vec::with_capacity(records.len());
        let mut unmapped = Vec::new();
        for record in records {
            match self.map_record(record) {
                Ok(candidate) => candidates.push(candidate),
                Err(failed) => unmapped.push(failed),
            }
        }
        report.unmapped_rows = unmapped.len();

        if !unmapped.is_empty() {
            match self.config.on_unmapped {
                UnmappedPolicy::Fail => {
                    let sample: Vec<String> = unmapped
                        .iter()
                        .take(self.config.sample_size.max(1))
                        .flat_map(|u| u.reasons.iter().map(ToString::to_string))
                        .collect();
                    return Err(HarmonizeError::crosswalk(format!(
                        "{} record(s) could not be mapped: {}",
                        unmapped.len(),
                        sample.join("; ")
                    )));
                }
                UnmappedPolicy::Drop => {
                    report.dropped_rows = unmapped.len();
                    log_rows_removed("Crosswalk resolution", unmapped.len(), "unmapped codes");
                    unmapped.truncate(self.config.sample_size);
                }
                UnmappedPolicy::KeepWithNullCanonical => {
                    warn!(
                        "Crosswalk resolution: keeping {} record(s) with null canonical codes",
                        unmapped.len()
                    );
                }
            }
        }

        let (resolved, discarded, collapsed) = collapse(candidates);
        if !discarded.is_empty() {
            log_rows_removed(
                "Crosswalk resolution",
                discarded.len(),
                "constituents already covered by an aggregate row",
            );
        }
        report.resolved_rows = resolved.len();
        report.discarded_rows = discarded.len();
        report.collapsed_rows = collapsed;

        log_operation_complete("resolved", resolved.len(), Some(start.elapsed()));
        Ok(ResolveOutcome {
            resolved,
            unmapped,
            discarded,
            report,
        })
    }

    /// Enforce at most one record per full key
    fn deduplicate(&self, records: Vec<TradeRecord>) -> Result<(Vec<TradeRecord>, usize)> {
        let mut positions: FxHashMap<RecordKey, usize> = FxHashMap::default();
        let mut unique: Vec<TradeRecord> = Vec::with_capacity(records.len());
        let mut replaced = 0;

        for record in records {
            let key = record.key();
            if let Some(&pos) = positions.get(&key) {
                match self.config.on_duplicate {
                    DuplicatePolicy::Reject => {
                        return Err(HarmonizeError::DuplicateRecord(format!(
                            "{} reporter {} partner {:?} product '{}' element '{}' period {} \
                             unit '{}' appears more than once",
                            key.source,
                            key.reporter_code,
                            key.partner_code,
                            key.product_code,
                            key.element,
                            key.period,
                            key.unit
                        )));
                    }
                    DuplicatePolicy::LastWriteWins => {
                        unique[pos] = record;
                        replaced += 1;
                    }
                }
            } else {
                positions.insert(key, unique.len());
                unique.push(record);
            }
        }

        if replaced > 0 {
            warn!("Crosswalk resolution: {replaced} duplicate record(s) replaced by later ones");
        }
        Ok((unique, replaced))
    }

    fn map_record(&self, record: TradeRecord) -> std::result::Result<Candidate, UnmappedRecord> {
        if record.harmonized {
            return Ok(Candidate {
                record,
                reporter_aggregate: false,
                partner_aggregate: false,
            });
        }

        let countries = &self.tables.countries;
        let products = &self.tables.products;
        let mut reasons = Vec::new();

        let reporter = match countries.lookup(&record.source, record.reporter_code) {
            Ok(found) => Some(found),
            Err(kind) => {
                reasons.push(UnmappedReason {
                    field: MappedField::Reporter,
                    kind,
                    code: record.reporter_code.to_string(),
                });
                None
            }
        };

        let partner = match record.partner_code {
            Some(code) => match countries.lookup(&record.source, code) {
                Ok(found) => Some(found),
                Err(kind) => {
                    reasons.push(UnmappedReason {
                        field: MappedField::Partner,
                        kind,
                        code: code.to_string(),
                    });
                    None
                }
            },
            None => None,
        };

        let product = match products.lookup(&record.source, &record.product_code) {
            Ok(code) => Some(code),
            Err(kind) => {
                reasons.push(UnmappedReason {
                    field: MappedField::Product,
                    kind,
                    code: record.product_code.clone(),
                });
                None
            }
        };

        match (reporter, product) {
            (Some(reporter), Some(product)) if reasons.is_empty() => {
                Ok(self.canonicalize(record, reporter, partner, product))
            }
            (reporter, product) => {
                debug!(
                    "Unmapped {} record: {}",
                    record.source,
                    reasons.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
                );
                Err(UnmappedRecord {
                    reporter_canonical: reporter.map(|m| m.canonical_code),
                    partner_canonical: partner.map(|m| m.canonical_code),
                    product_canonical: product.map(str::to_string),
                    reasons,
                    record,
                })
            }
        }
    }

    fn canonicalize(
        &self,
        mut record: TradeRecord,
        reporter: CountryMatch<'_>,
        partner: Option<CountryMatch<'_>>,
        product: &str,
    ) -> Candidate {
        let reporter_aggregate = reporter.status == CountryStatus::Agg;
        let partner_aggregate = partner.is_some_and(|p| p.status == CountryStatus::Agg);

        record.reporter_code = reporter.canonical_code;
        if let Some(name) = reporter.info.and_then(|info| info.name.clone()) {
            record.reporter = name;
        }
        if let Some(partner) = partner {
            record.partner_code = Some(partner.canonical_code);
            if let Some(name) = partner.info.and_then(|info| info.name.clone()) {
                record.partner = Some(name);
            }
        }
        record.product_code = product.to_string();
        if let Some(name) = self.tables.products.canonical_name(product) {
            record.product = Some(name.to_string());
        }
        record.harmonized = true;

        Candidate {
            record,
            reporter_aggregate,
            partner_aggregate,
        }
    }
}

/// Sum candidates sharing a canonical key, discarding constituents of keys
/// that are also covered by an aggregate row on the same side. Output keeps
/// first-appearance order of the keys.
fn collapse(candidates: Vec<Candidate>) -> (Vec<TradeRecord>, Vec<TradeRecord>, usize) {
    let mut positions: FxHashMap<CanonicalKey, usize> = FxHashMap::default();
    let mut groups: Vec<Vec<Candidate>> = Vec::new();
    for candidate in candidates {
        let key = CanonicalKey::of(&candidate.record);
        let pos = *positions.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[pos].push(candidate);
    }

    let mut resolved = Vec::with_capacity(groups.len());
    let mut discarded = Vec::new();
    let mut collapsed = 0;

    for group in groups {
        let kept = retain_aggregates(group, |c| c.reporter_aggregate, &mut discarded);
        let kept = retain_aggregates(kept, |c| c.partner_aggregate, &mut discarded);

        collapsed += kept.len().saturating_sub(1);
        let summed = kept.into_iter().map(|c| c.record).reduce(|mut acc, record| {
            acc.value += record.value;
            if acc.flag != record.flag {
                acc.flag = None;
            }
            acc
        });
        if let Some(record) = summed {
            resolved.push(record);
        }
    }

    (resolved, discarded, collapsed)
}

/// Keep only the aggregate rows of a group when it mixes aggregate and
/// constituent rows on one side, moving the constituents to `discarded`
fn retain_aggregates(
    group: Vec<Candidate>,
    is_aggregate: impl Fn(&Candidate) -> bool,
    discarded: &mut Vec<TradeRecord>,
) -> Vec<Candidate> {
    let has_aggregate = group.iter().any(&is_aggregate);
    let has_constituent = group.iter().any(|c| !is_aggregate(c));
    if !(has_aggregate && has_constituent) {
        return group;
    }
    let (aggregates, constituents): (Vec<_>, Vec<_>) = group.into_iter().partition(is_aggregate);
    discarded.extend(constituents.into_iter().map(|c| c.record));
    aggregates
}

/// Resolve records with the default configuration and the given unmapped policy
///
/// # Errors
/// See [`Resolver::resolve`]
pub fn resolve(
    records: Vec<TradeRecord>,
    tables: &CrosswalkTables,
    on_unmapped: UnmappedPolicy,
) -> Result<ResolveOutcome> {
    let config = ResolverConfig::default().with_unmapped_policy(on_unmapped);
    Resolver::new(tables, config).resolve(records)
}
