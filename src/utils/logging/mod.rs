//! Logging utilities for output and progress tracking
//!
//! This module provides utilities for logging and progress tracking.

pub mod log;
pub mod progress;

// Re-export commonly used functions for convenience
pub use log::{log_operation_complete, log_operation_start, log_rows_removed, log_warning};
pub use progress::{create_main_progress_bar, finish_progress_bar};

/// Initialize the global logger with an `info` default filter
///
/// The `RUST_LOG` environment variable overrides the default. Calling this
/// more than once is harmless: later calls leave the installed logger alone.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
