//! Logging utilities
//!
//! This module provides standardized logging functions for operations.

use std::time::Duration;

/// Log an operation start with consistent format
///
/// # Arguments
/// * `operation` - Description of the operation
/// * `rows` - Number of input rows
pub fn log_operation_start(operation: &str, rows: usize) {
    log::info!("{operation}: {rows} input rows");
}

/// Log an operation completion with consistent format
///
/// # Arguments
/// * `operation` - Past-tense description of the operation
/// * `items` - Number of items produced
/// * `elapsed` - Optional elapsed time
pub fn log_operation_complete(operation: &str, items: usize, elapsed: Option<Duration>) {
    if let Some(duration) = elapsed {
        log::info!("Successfully {operation} {items} items in {duration:?}");
    } else {
        log::info!("Successfully {operation} {items} items");
    }
}

/// Log an operation warning with consistent format
///
/// # Arguments
/// * `message` - Warning message
/// * `context` - Optional context, e.g. the offending key
pub fn log_warning(message: &str, context: Option<&str>) {
    if let Some(context) = context {
        log::warn!("{message}: {context}");
    } else {
        log::warn!("{message}");
    }
}

/// Log rows removed from an operation's output
///
/// Rows are never dropped silently; every removal goes through here.
pub fn log_rows_removed(operation: &str, count: usize, reason: &str) {
    if count > 0 {
        log::warn!("{operation}: removed {count} rows ({reason})");
    }
}
