//! Grouping, aggregation and ranking of harmonized records
//!
//! This module includes:
//!
//! 1. Country group substitution with value summation (`grouping`)
//! 2. Top-n ranking within slice groups (`ranking`)
//! 3. Aggregate-versus-constituents consistency checks (`quality`)
//!
//! All operations are pure functions over their inputs and the immutable
//! country crosswalk.

pub mod grouping;
pub mod quality;
pub mod ranking;

pub use grouping::{
    CountryGrouping, EU27_LABEL, GroupKey, GroupedRecord, GroupingSide, ROW_LABEL,
    UNASSIGNED_LABEL, aggregate_by_group, eu_row_aggregate, regroup, retain_individual_countries,
};
pub use quality::{AggregateCheck, compare_aggregate_to_constituents};
pub use ranking::{RankedRow, RankingSpec, nlargest};
