//! Segmented-regression trend detection
//!
//! This module characterizes recent shifts in yearly time series. It includes:
//!
//! 1. Configuration and objective function selection (`config`)
//! 2. Least squares line fitting (`ols`)
//! 3. Breakpoint search under a minimum segment length (`segmentation`)
//! 4. The Mann-Kendall trend test with Sen's slope (`mann_kendall`)
//! 5. Change against a reference window (`change`)
//! 6. Per-series detection and parallel batch processing (`detector`)

pub mod change;
pub mod config;
pub mod detector;
pub mod mann_kendall;
pub mod ols;
pub mod segmentation;

pub use change::{ChangeSummary, change_summaries};
pub use config::{ChangeWindow, ObjectiveFunction, TrendConfig, TrendConfigBuilder};
pub use detector::{Segment, SeriesKey, TrendDetector, TrendResult, TrendStatus, build_series};
pub use mann_kendall::{MannKendall, TrendDirection, mann_kendall, normal_cdf};
pub use ols::{LinearFit, fit_line};
pub use segmentation::{Segmentation, best_segmentation};
