//! Domain models for harmonized trade and production statistics
//!
//! This module contains the value types that flow between the crosswalk
//! resolver, the aggregation engine, the mirror-flow comparator and the
//! trend detector. All of them are plain owned values; none holds a
//! reference back to the table it was read from.

pub mod column;
pub mod crosswalk;
pub mod record;

// Re-export commonly used types
pub use column::{Column, KeyValue, Tabular, ValueColumn};
pub use crosswalk::{CountryCrosswalkRow, CountryStatus, ProductCrosswalkRow};
pub use record::{FlowDirection, RecordKey, TradeRecord, TradeRecordBuilder};
