//! Country and product crosswalk resolution
//!
//! This module maps heterogeneous source coding schemes onto the canonical
//! identifier space. It includes:
//!
//! 1. Validated, immutable crosswalk tables (`tables`)
//! 2. The resolver that attaches canonical codes to source records and
//!    collapses identities split across reporting systems (`resolver`)

pub mod resolver;
pub mod tables;

use crate::error::Result;
use crate::models::{CountryCrosswalkRow, ProductCrosswalkRow};

// Re-export key types
pub use resolver::{
    DuplicatePolicy, MappedField, ResolveOutcome, ResolveReport, Resolver, ResolverConfig,
    UnmappedPolicy, UnmappedReason, UnmappedRecord, resolve,
};
pub use tables::{CountryCrosswalk, CountryInfo, CountryMatch, ProductCrosswalk, UnmappedKind};

/// Both crosswalk tables, loaded once and passed by reference to every call
#[derive(Debug, Clone)]
pub struct CrosswalkTables {
    pub countries: CountryCrosswalk,
    pub products: ProductCrosswalk,
}

impl CrosswalkTables {
    /// Validate and index both tables
    ///
    /// # Errors
    /// Returns `CrosswalkIntegrity` if either table is ambiguous or malformed
    pub fn from_rows(
        countries: Vec<CountryCrosswalkRow>,
        products: Vec<ProductCrosswalkRow>,
    ) -> Result<Self> {
        Ok(Self {
            countries: CountryCrosswalk::from_rows(countries)?,
            products: ProductCrosswalk::from_rows(products)?,
        })
    }
}
