//! Algorithms over harmonized records
//!
//! This module contains the three engines that consume resolved records:
//! grouping and ranking, mirror flow comparison, and trend detection.

pub mod aggregation;
pub mod mirror;
pub mod trend;
