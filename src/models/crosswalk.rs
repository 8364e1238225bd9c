//! Rows of the country and product crosswalk tables
//!
//! These are the static configuration tables supplied by the surrounding
//! system. They are validated and indexed by [`crate::crosswalk`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HarmonizeError;

/// Status of a source country code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CountryStatus {
    /// A current country with an ISO3 code
    Iso3,
    /// A historical entity; maps to its successor when one is defined
    Old,
    /// An aggregate of several countries or territories
    Agg,
}

impl FromStr for CountryStatus {
    type Err = HarmonizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iso3" => Ok(Self::Iso3),
            "old" => Ok(Self::Old),
            "agg" => Ok(Self::Agg),
            other => Err(HarmonizeError::crosswalk(format!(
                "unknown country status '{other}', expected one of iso3, old, agg"
            ))),
        }
    }
}

impl TryFrom<String> for CountryStatus {
    type Error = HarmonizeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CountryStatus> for String {
    fn from(value: CountryStatus) -> Self {
        value.to_string()
    }
}

impl fmt::Display for CountryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iso3 => f.write_str("iso3"),
            Self::Old => f.write_str("old"),
            Self::Agg => f.write_str("agg"),
        }
    }
}

/// One row of the country crosswalk table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryCrosswalkRow {
    /// Reporting body whose code space `source_code` belongs to
    pub source: String,
    /// Country code as published by the source
    pub source_code: i64,
    /// Country name as published by the source
    pub source_name: String,
    /// Canonical identifier; `None` marks the code as non-mappable
    #[serde(default)]
    pub canonical_code: Option<i64>,
    #[serde(default)]
    pub iso3_code: Option<String>,
    #[serde(default)]
    pub continent: Option<String>,
    #[serde(default)]
    pub sub_continent: Option<String>,
    /// Member of the European Union (27)
    #[serde(default)]
    pub eu27: bool,
    pub status: CountryStatus,
}

impl CountryCrosswalkRow {
    /// Convenience constructor for a current country that maps to itself
    #[must_use]
    pub fn identity(source: &str, code: i64, name: &str) -> Self {
        Self {
            source: source.to_string(),
            source_code: code,
            source_name: name.to_string(),
            canonical_code: Some(code),
            iso3_code: None,
            continent: None,
            sub_continent: None,
            eu27: false,
            status: CountryStatus::Iso3,
        }
    }

    /// Set the continent and sub-continent
    #[must_use]
    pub fn with_continent(mut self, continent: &str, sub_continent: &str) -> Self {
        self.continent = Some(continent.to_string());
        self.sub_continent = Some(sub_continent.to_string());
        self
    }

    /// Flag the country as an EU27 member
    #[must_use]
    pub const fn in_eu27(mut self) -> Self {
        self.eu27 = true;
        self
    }

    /// Set the status
    #[must_use]
    pub const fn with_status(mut self, status: CountryStatus) -> Self {
        self.status = status;
        self
    }

    /// Map the source code onto another canonical identifier (or none)
    #[must_use]
    pub const fn mapped_to(mut self, canonical_code: Option<i64>) -> Self {
        self.canonical_code = canonical_code;
        self
    }

    /// Set the ISO3 code
    #[must_use]
    pub fn with_iso3(mut self, iso3: &str) -> Self {
        self.iso3_code = Some(iso3.to_string());
        self
    }
}

/// One row of the product crosswalk table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCrosswalkRow {
    /// Reporting body whose code space `source_code` belongs to
    pub source: String,
    /// Product code as published by the source (kept as text: HS codes
    /// carry leading zeros)
    pub source_code: String,
    #[serde(default)]
    pub source_name: Option<String>,
    /// Canonical product code; `None` explicitly marks the code as unmapped
    #[serde(default)]
    pub canonical_code: Option<String>,
    #[serde(default)]
    pub canonical_name: Option<String>,
    /// Nomenclature the source code belongs to, e.g. "hs" or "fcl"
    pub classification_family: String,
}

impl ProductCrosswalkRow {
    /// Create a row mapping `source_code` to `canonical_code`
    #[must_use]
    pub fn new(
        source: &str,
        source_code: &str,
        canonical_code: Option<&str>,
        family: &str,
    ) -> Self {
        Self {
            source: source.to_string(),
            source_code: source_code.to_string(),
            source_name: None,
            canonical_code: canonical_code.map(str::to_string),
            canonical_name: None,
            classification_family: family.to_string(),
        }
    }

    /// Set the canonical product name
    #[must_use]
    pub fn with_canonical_name(mut self, name: &str) -> Self {
        self.canonical_name = Some(name.to_string());
        self
    }
}
