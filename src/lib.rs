//! A Rust library for harmonizing international trade and production
//! statistics from several reporting bodies into one canonical record space,
//! comparing mirror flows and independent sources, ranking and grouping
//! records, and detecting structural change in the resulting time series.

pub mod algorithm;
pub mod crosswalk;
pub mod error;
pub mod models;
pub mod schema;
pub mod utils;

// Re-export the most common types for easier use
// Core types
pub use error::{HarmonizeError, Result};
pub use models::{
    Column, CountryCrosswalkRow, CountryStatus, FlowDirection, KeyValue, ProductCrosswalkRow,
    RecordKey, Tabular, TradeRecord, ValueColumn,
};

// Crosswalk resolution
pub use crosswalk::{
    CountryCrosswalk, CrosswalkTables, DuplicatePolicy, ProductCrosswalk, ResolveOutcome,
    Resolver, ResolverConfig, UnmappedPolicy, UnmappedRecord, resolve,
};

// Aggregation and ranking
pub use algorithm::aggregation::{
    CountryGrouping, GroupedRecord, GroupingSide, RankedRow, RankingSpec, aggregate_by_group,
    eu_row_aggregate, nlargest,
};

// Mirror flows
pub use algorithm::mirror::{
    MirrorComparator, MirrorConfig, MirroredRecord, merge_sources, pair_mirrors,
};

// Trend detection
pub use algorithm::trend::{
    ObjectiveFunction, Segment, TrendConfig, TrendDetector, TrendResult, TrendStatus,
};

// Arrow types
pub use arrow::record_batch::RecordBatch;

// Logging
pub use utils::logging::init_logging;
