//! Trend detection configuration

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HarmonizeError, Result};

/// Criterion used to choose between candidate segmentations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ObjectiveFunction {
    /// Minimize the total residual sum of squares over all segments
    #[default]
    Rss,
    /// Maximize the coefficient of determination of the most recent segment
    R2,
}

impl FromStr for ObjectiveFunction {
    type Err = HarmonizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RSS" => Ok(Self::Rss),
            "R2" => Ok(Self::R2),
            other => Err(HarmonizeError::config(format!(
                "unknown objective function '{other}', expected RSS or R2"
            ))),
        }
    }
}

impl TryFrom<String> for ObjectiveFunction {
    type Error = HarmonizeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ObjectiveFunction> for String {
    fn from(value: ObjectiveFunction) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ObjectiveFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rss => f.write_str("RSS"),
            Self::R2 => f.write_str("R2"),
        }
    }
}

/// Reference window for the change summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeWindow {
    /// Mean of the N years preceding the evaluated year
    PrecedingYears(u32),
    /// Mean of an explicit, inclusive year range
    YearRange { start: i32, end: i32 },
}

impl Default for ChangeWindow {
    fn default() -> Self {
        Self::PrecedingYears(5)
    }
}

impl fmt::Display for ChangeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrecedingYears(n) => write!(f, "preceding {n} years"),
            Self::YearRange { start, end } => write!(f, "{start}-{end}"),
        }
    }
}

/// Configuration for segmented regression trend detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub objective: ObjectiveFunction,
    /// Minimum number of observations in every segment
    pub min_data_points: usize,
    /// Significance level of the Mann-Kendall test
    pub alpha: f64,
    pub change_window: ChangeWindow,
    /// Report the change summary for the most recent year only
    pub last_value: bool,
    /// Process series on a worker pool
    pub multi_process: bool,
    /// Worker count; defaults to the number of CPUs
    pub num_threads: Option<usize>,
    pub show_progress: bool,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            objective: ObjectiveFunction::Rss,
            min_data_points: 7,
            alpha: 0.05,
            change_window: ChangeWindow::default(),
            last_value: true,
            multi_process: false,
            num_threads: None,
            show_progress: false,
        }
    }
}

impl TrendConfig {
    /// Create a new builder
    #[must_use]
    pub fn builder() -> TrendConfigBuilder {
        TrendConfigBuilder::default()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns `Configuration` for a segment minimum below 2, an `alpha`
    /// outside `(0, 1)`, an empty change window or zero worker threads
    pub fn validate(&self) -> Result<()> {
        if self.min_data_points < 2 {
            return Err(HarmonizeError::config(format!(
                "min_data_points must be at least 2, got {}",
                self.min_data_points
            )));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(HarmonizeError::config(format!(
                "alpha must lie in (0, 1), got {}",
                self.alpha
            )));
        }
        match self.change_window {
            ChangeWindow::PrecedingYears(0) => {
                return Err(HarmonizeError::config("change window must span at least one year"));
            }
            ChangeWindow::YearRange { start, end } if start > end => {
                return Err(HarmonizeError::config(format!(
                    "change window start {start} is after its end {end}"
                )));
            }
            _ => {}
        }
        if self.num_threads == Some(0) {
            return Err(HarmonizeError::config("num_threads must be positive"));
        }
        Ok(())
    }

    /// Load a configuration from JSON; absent fields take their defaults
    ///
    /// # Errors
    /// Returns `Configuration` if the JSON is malformed or the resulting
    /// configuration is invalid
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| HarmonizeError::config(format!("invalid trend configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Number of worker threads to use when `multi_process` is set
    #[must_use]
    pub fn effective_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(num_cpus::get)
    }
}

impl fmt::Display for TrendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Trend Configuration:")?;
        writeln!(f, "  Objective: {}", self.objective)?;
        writeln!(f, "  Minimum Data Points: {}", self.min_data_points)?;
        writeln!(f, "  Alpha: {}", self.alpha)?;
        writeln!(f, "  Change Window: {}", self.change_window)?;
        writeln!(f, "  Last Value Only: {}", self.last_value)?;
        writeln!(f, "  Multi Process: {}", self.multi_process)?;
        if self.multi_process {
            writeln!(f, "  Threads: {}", self.effective_threads())?;
        }
        Ok(())
    }
}

/// Builder for [`TrendConfig`]
#[derive(Debug, Clone, Default)]
pub struct TrendConfigBuilder {
    config: TrendConfig,
}

impl TrendConfigBuilder {
    /// Set the objective function
    #[must_use]
    pub const fn objective(mut self, objective: ObjectiveFunction) -> Self {
        self.config.objective = objective;
        self
    }

    /// Set the minimum number of points per segment
    #[must_use]
    pub const fn min_data_points(mut self, min_data_points: usize) -> Self {
        self.config.min_data_points = min_data_points;
        self
    }

    /// Set the significance level
    #[must_use]
    pub const fn alpha(mut self, alpha: f64) -> Self {
        self.config.alpha = alpha;
        self
    }

    /// Use the mean of the preceding `years` as reference
    #[must_use]
    pub const fn preceding_years(mut self, years: u32) -> Self {
        self.config.change_window = ChangeWindow::PrecedingYears(years);
        self
    }

    /// Use the mean of an inclusive year range as reference
    #[must_use]
    pub const fn year_range(mut self, start: i32, end: i32) -> Self {
        self.config.change_window = ChangeWindow::YearRange { start, end };
        self
    }

    /// Report changes for the most recent year only
    #[must_use]
    pub const fn last_value(mut self, last_value: bool) -> Self {
        self.config.last_value = last_value;
        self
    }

    /// Process series in parallel
    #[must_use]
    pub const fn multi_process(mut self, multi_process: bool) -> Self {
        self.config.multi_process = multi_process;
        self
    }

    /// Set the worker count
    #[must_use]
    pub const fn num_threads(mut self, num_threads: usize) -> Self {
        self.config.num_threads = Some(num_threads);
        self
    }

    /// Show a progress bar during batch detection
    #[must_use]
    pub const fn show_progress(mut self, show_progress: bool) -> Self {
        self.config.show_progress = show_progress;
        self
    }

    /// Validate and build the configuration
    ///
    /// # Errors
    /// See [`TrendConfig::validate`]
    pub fn build(self) -> Result<TrendConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
