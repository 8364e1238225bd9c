//! Validated, indexed crosswalk tables
//!
//! The tables are loaded once, validated for uniqueness of the source-code
//! column and then treated as immutable for the duration of every resolution,
//! aggregation and comparison call. They are `Send + Sync` and can be shared
//! by reference across worker threads.

use std::fmt;

use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{HarmonizeError, Result};
use crate::models::{CountryCrosswalkRow, CountryStatus, ProductCrosswalkRow};

/// Source whose codes define the canonical identifier space by default
pub const DEFAULT_CANONICAL_SOURCE: &str = "faostat";

/// Allowed lengths of Harmonized System product codes
const HS_CODE_LENGTHS: [usize; 3] = [2, 4, 6];

/// Why a source code could not be mapped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnmappedKind {
    /// The code does not appear in the crosswalk table for this source
    MissingFromCrosswalk,
    /// The crosswalk explicitly marks the code as having no canonical equivalent
    NoCanonical,
    /// A historical entity with no defined successor
    HistoricalWithoutSuccessor,
}

impl fmt::Display for UnmappedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFromCrosswalk => f.write_str("missing from crosswalk"),
            Self::NoCanonical => f.write_str("no canonical equivalent"),
            Self::HistoricalWithoutSuccessor => f.write_str("historical entity without successor"),
        }
    }
}

/// Attributes of a canonical country entity
#[derive(Debug, Clone, PartialEq)]
pub struct CountryInfo {
    pub canonical_code: i64,
    pub name: Option<String>,
    pub iso3_code: Option<String>,
    pub continent: Option<String>,
    pub sub_continent: Option<String>,
    pub eu27: bool,
    /// Only aggregate source codes (e.g. World, regions) map to this entity
    pub is_aggregate: bool,
}

/// Result of looking up one source country code
#[derive(Debug, Clone, Copy)]
pub struct CountryMatch<'a> {
    pub canonical_code: i64,
    /// Status of the source code that was looked up
    pub status: CountryStatus,
    pub info: Option<&'a CountryInfo>,
}

/// Country crosswalk indexed by `(source, source_code)` and by canonical code
#[derive(Debug, Clone)]
pub struct CountryCrosswalk {
    rows: FxHashMap<(String, i64), CountryCrosswalkRow>,
    canonical: FxHashMap<i64, CountryInfo>,
    canonical_source: String,
}

impl CountryCrosswalk {
    /// Build the crosswalk using the default canonical source
    ///
    /// # Errors
    /// Returns `CrosswalkIntegrity` if a source code maps to more than one
    /// canonical identifier
    pub fn from_rows(rows: Vec<CountryCrosswalkRow>) -> Result<Self> {
        Self::with_canonical_source(rows, DEFAULT_CANONICAL_SOURCE)
    }

    /// Build the crosswalk; names of canonical entities are taken from the
    /// rows of `canonical_source` whose source code equals the canonical code
    pub fn with_canonical_source(
        rows: Vec<CountryCrosswalkRow>,
        canonical_source: &str,
    ) -> Result<Self> {
        let mut index: FxHashMap<(String, i64), CountryCrosswalkRow> = FxHashMap::default();
        let mut ambiguous = Vec::new();

        for row in rows {
            let key = (row.source.clone(), row.source_code);
            match index.get(&key) {
                Some(existing) if existing.canonical_code != row.canonical_code => {
                    ambiguous.push(format!(
                        "{} code {} maps to {:?} and {:?}",
                        row.source, row.source_code, existing.canonical_code, row.canonical_code
                    ));
                }
                Some(_) => {
                    debug!(
                        "Ignoring repeated country crosswalk row {} {}",
                        row.source, row.source_code
                    );
                }
                None => {
                    index.insert(key, row);
                }
            }
        }

        if !ambiguous.is_empty() {
            ambiguous.sort();
            return Err(HarmonizeError::crosswalk(format!(
                "ambiguous country crosswalk, {} source code(s) map to more than one \
                 canonical identifier: {}",
                ambiguous.len(),
                ambiguous.join("; ")
            )));
        }

        let canonical = build_canonical_index(&index, canonical_source);

        Ok(Self {
            rows: index,
            canonical,
            canonical_source: canonical_source.to_string(),
        })
    }

    /// Look up a source country code
    ///
    /// # Errors
    /// Returns the reason the code cannot be mapped
    pub fn lookup(
        &self,
        source: &str,
        code: i64,
    ) -> std::result::Result<CountryMatch<'_>, UnmappedKind> {
        let row = self
            .rows
            .get(&(source.to_string(), code))
            .ok_or(UnmappedKind::MissingFromCrosswalk)?;

        match (row.canonical_code, row.status) {
            (Some(canonical_code), status) => Ok(CountryMatch {
                canonical_code,
                status,
                info: self.canonical.get(&canonical_code),
            }),
            (None, CountryStatus::Old) => Err(UnmappedKind::HistoricalWithoutSuccessor),
            (None, _) => Err(UnmappedKind::NoCanonical),
        }
    }

    /// Attributes of a canonical entity
    #[must_use]
    pub fn info(&self, canonical_code: i64) -> Option<&CountryInfo> {
        self.canonical.get(&canonical_code)
    }

    /// Whether a canonical entity is an EU27 member; unknown codes are not
    #[must_use]
    pub fn is_eu27(&self, canonical_code: i64) -> bool {
        self.canonical.get(&canonical_code).is_some_and(|info| info.eu27)
    }

    /// Whether a canonical entity is an aggregate of other countries
    #[must_use]
    pub fn is_aggregate(&self, canonical_code: i64) -> bool {
        self.canonical.get(&canonical_code).is_some_and(|info| info.is_aggregate)
    }

    /// Canonical codes of all EU27 members, sorted
    #[must_use]
    pub fn eu27_members(&self) -> Vec<i64> {
        let mut members: Vec<i64> = self
            .canonical
            .values()
            .filter(|info| info.eu27)
            .map(|info| info.canonical_code)
            .collect();
        members.sort_unstable();
        members
    }

    /// Source whose names label canonical entities
    #[must_use]
    pub fn canonical_source(&self) -> &str {
        &self.canonical_source
    }

    /// Number of source rows in the table
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Collapse the source rows onto one attribute record per canonical entity.
/// Attributes come from current-country rows first; an entity is an aggregate
/// only when every row mapping to it is an aggregate.
fn build_canonical_index(
    rows: &FxHashMap<(String, i64), CountryCrosswalkRow>,
    canonical_source: &str,
) -> FxHashMap<i64, CountryInfo> {
    // Deterministic iteration regardless of hash order
    let mut ordered: Vec<&CountryCrosswalkRow> = rows.values().collect();
    ordered.sort_by(|a, b| {
        let rank = |r: &CountryCrosswalkRow| match r.status {
            CountryStatus::Iso3 => 0,
            CountryStatus::Agg => 1,
            CountryStatus::Old => 2,
        };
        rank(a)
            .cmp(&rank(b))
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.source_code.cmp(&b.source_code))
    });

    let mut canonical: FxHashMap<i64, CountryInfo> = FxHashMap::default();
    for row in ordered {
        let Some(code) = row.canonical_code else { continue };
        let is_aggregate_row = row.status == CountryStatus::Agg;
        let names_entity = row.source == canonical_source && row.source_code == code;

        let info = canonical.entry(code).or_insert_with(|| CountryInfo {
            canonical_code: code,
            name: None,
            iso3_code: row.iso3_code.clone(),
            continent: row.continent.clone(),
            sub_continent: row.sub_continent.clone(),
            eu27: row.eu27,
            is_aggregate: is_aggregate_row,
        });

        if names_entity || (info.name.is_none() && row.status != CountryStatus::Old) {
            info.name = Some(row.source_name.clone());
        }
        if !is_aggregate_row {
            info.is_aggregate = false;
        }
        if info.continent.is_none() {
            info.continent.clone_from(&row.continent);
            info.sub_continent.clone_from(&row.sub_continent);
        }
        if info.iso3_code.is_none() {
            info.iso3_code.clone_from(&row.iso3_code);
        }
        if row.eu27 != info.eu27 && row.status == CountryStatus::Iso3 {
            warn!(
                "Conflicting EU27 flags for canonical country {code} ({} code {}), keeping {}",
                row.source, row.source_code, info.eu27
            );
        }
    }
    canonical
}

/// Product crosswalk indexed by `(source, source_code)`
#[derive(Debug, Clone)]
pub struct ProductCrosswalk {
    rows: FxHashMap<(String, String), ProductCrosswalkRow>,
    canonical_names: FxHashMap<String, String>,
    partial: FxHashSet<String>,
}

impl ProductCrosswalk {
    /// Build and validate the product crosswalk
    ///
    /// # Errors
    /// Returns `CrosswalkIntegrity` if a source code maps to more than one
    /// canonical code, or if an HS code is not a 2, 4 or 6 digit string
    pub fn from_rows(rows: Vec<ProductCrosswalkRow>) -> Result<Self> {
        let malformed: Vec<String> = rows
            .iter()
            .filter(|r| r.classification_family.eq_ignore_ascii_case("hs"))
            .filter(|r| !is_valid_hs_code(&r.source_code))
            .map(|r| format!("{} '{}'", r.source, r.source_code))
            .collect();
        if !malformed.is_empty() {
            return Err(HarmonizeError::crosswalk(format!(
                "an HS product code can only have 2, 4 or 6 digits, \
                 the following codes do not comply: {}",
                malformed.join(", ")
            )));
        }

        let mut index: FxHashMap<(String, String), ProductCrosswalkRow> = FxHashMap::default();
        let mut ambiguous = Vec::new();
        for row in rows {
            let key = (row.source.clone(), row.source_code.clone());
            match index.get(&key) {
                Some(existing) if existing.canonical_code != row.canonical_code => {
                    ambiguous.push(format!(
                        "{} code '{}' maps to {:?} and {:?}",
                        row.source, row.source_code, existing.canonical_code, row.canonical_code
                    ));
                }
                Some(_) => {}
                None => {
                    index.insert(key, row);
                }
            }
        }
        if !ambiguous.is_empty() {
            ambiguous.sort();
            return Err(HarmonizeError::crosswalk(format!(
                "product codes are not unique in the crosswalk table: {}",
                ambiguous.join("; ")
            )));
        }

        let mut canonical_names = FxHashMap::default();
        for row in index.values() {
            if let (Some(code), Some(name)) = (&row.canonical_code, &row.canonical_name) {
                canonical_names.entry(code.clone()).or_insert_with(|| name.clone());
            }
        }

        let partial = find_partial_mappings(&index);
        if !partial.is_empty() {
            debug!("{} canonical product code(s) are only partially mapped", partial.len());
        }

        Ok(Self {
            rows: index,
            canonical_names,
            partial,
        })
    }

    /// Look up a source product code
    ///
    /// # Errors
    /// Returns the reason the code cannot be mapped
    pub fn lookup(&self, source: &str, code: &str) -> std::result::Result<&str, UnmappedKind> {
        let row = self
            .rows
            .get(&(source.to_string(), code.to_string()))
            .ok_or(UnmappedKind::MissingFromCrosswalk)?;
        row.canonical_code.as_deref().ok_or(UnmappedKind::NoCanonical)
    }

    /// Canonical product name
    #[must_use]
    pub fn canonical_name(&self, canonical_code: &str) -> Option<&str> {
        self.canonical_names.get(canonical_code).map(String::as_str)
    }

    /// Whether every source code feeding `canonical_code` is unambiguous and
    /// no sibling code under the same heading is left unmapped
    #[must_use]
    pub fn is_complete(&self, canonical_code: &str) -> bool {
        !self.partial.contains(canonical_code)
    }

    /// Number of source rows in the table
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn is_valid_hs_code(code: &str) -> bool {
    HS_CODE_LENGTHS.contains(&code.len()) && code.bytes().all(|b| b.is_ascii_digit())
}

/// Canonical codes that are only partially covered by their source codes.
///
/// A canonical code is partial when one of its source codes shares a parent
/// heading with an explicitly unmapped sibling, or when it is fed by two codes
/// of the same source where one is a prefix of the other (the coarser code
/// already contains the finer one).
fn find_partial_mappings(
    index: &FxHashMap<(String, String), ProductCrosswalkRow>,
) -> FxHashSet<String> {
    let mut headings: FxHashMap<(String, String), (Vec<String>, bool)> = FxHashMap::default();
    let mut by_canonical: FxHashMap<(String, String), Vec<String>> = FxHashMap::default();

    for row in index.values() {
        let parent = row
            .source_code
            .len()
            .checked_sub(2)
            .filter(|len| *len > 0)
            .and_then(|len| row.source_code.get(..len));
        if let Some(parent) = parent {
            let entry = headings.entry((row.source.clone(), parent.to_string())).or_default();
            match &row.canonical_code {
                Some(code) => entry.0.push(code.clone()),
                None => entry.1 = true,
            }
        }
        if let Some(code) = &row.canonical_code {
            by_canonical
                .entry((row.source.clone(), code.clone()))
                .or_default()
                .push(row.source_code.clone());
        }
    }

    let mut partial: FxHashSet<String> = headings
        .into_values()
        .filter(|(_, has_unmapped)| *has_unmapped)
        .flat_map(|(mapped, _)| mapped)
        .collect();

    for ((_, canonical_code), codes) in by_canonical {
        let nested = codes
            .iter()
            .any(|a| codes.iter().any(|b| a != b && b.starts_with(a.as_str())));
        if nested {
            partial.insert(canonical_code);
        }
    }
    partial
}
