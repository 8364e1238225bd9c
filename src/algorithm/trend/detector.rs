//! Per-series trend detection and batch fan-out
//!
//! Each `(source, reporter, partner, product, element, unit)` series is
//! processed independently: segmented regression, a Mann-Kendall test on the
//! most recent segment, and a change summary. With `multi_process` the series
//! are spread over a dedicated rayon pool; results are always returned sorted
//! by series key, so both modes produce identical output.

use std::collections::BTreeMap;
use std::time::Instant;

use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;

use crate::algorithm::trend::change::{ChangeSummary, change_summaries};
use crate::algorithm::trend::config::TrendConfig;
use crate::algorithm::trend::mann_kendall::{MannKendall, mann_kendall};
use crate::algorithm::trend::segmentation::best_segmentation;
use crate::error::Result;
use crate::models::TradeRecord;
use crate::utils::logging::{
    create_main_progress_bar, finish_progress_bar, log_operation_complete, log_operation_start,
};

/// Identity of one time series
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SeriesKey {
    pub source: String,
    pub reporter_code: i64,
    pub partner_code: Option<i64>,
    pub product_code: String,
    pub element: String,
    pub unit: String,
}

impl SeriesKey {
    /// Key of the series a record belongs to
    #[must_use]
    pub fn of(record: &TradeRecord) -> Self {
        Self {
            source: record.source.clone(),
            reporter_code: record.reporter_code,
            partner_code: record.partner_code,
            product_code: record.product_code.clone(),
            element: record.element.clone(),
            unit: record.unit.clone(),
        }
    }
}

/// Whether a series could be modelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStatus {
    Ok,
    /// Fewer observations than the minimum segment length
    InsufficientData { points: usize, required: usize },
}

/// One linear piece of a segmented fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    pub start_year: i32,
    pub end_year: i32,
    /// Change per year
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination of the piece
    pub fit_score: f64,
    pub rss: f64,
    pub stderr_slope: Option<f64>,
    pub n_points: usize,
}

/// Trend characterization of one series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendResult {
    pub key: SeriesKey,
    pub status: TrendStatus,
    pub n_points: usize,
    pub segments: Vec<Segment>,
    pub most_recent_segment: Option<Segment>,
    pub mann_kendall: Option<MannKendall>,
    /// Sen's slope of the most recent segment
    pub mk_slope: Option<f64>,
    pub mk_significant: bool,
    /// Change of the most recent value, in percent of the reference mean
    pub relative_change: Option<f64>,
    pub absolute_change: Option<f64>,
    /// Change summaries: the most recent year only, or every year
    pub changes: Vec<ChangeSummary>,
}

impl TrendResult {
    /// Whether the series was too short to model
    #[must_use]
    pub const fn is_insufficient(&self) -> bool {
        matches!(self.status, TrendStatus::InsufficientData { .. })
    }
}

/// Collect records into yearly series, summing values of the same year
///
/// Non-finite values are ignored. Points are sorted by year.
#[must_use]
pub fn build_series(records: &[TradeRecord]) -> BTreeMap<SeriesKey, Vec<(i32, f64)>> {
    let mut yearly: BTreeMap<SeriesKey, BTreeMap<i32, f64>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.value.is_finite()) {
        *yearly
            .entry(SeriesKey::of(record))
            .or_default()
            .entry(record.year)
            .or_insert(0.0) += record.value;
    }
    yearly
        .into_iter()
        .map(|(key, points)| (key, points.into_iter().collect()))
        .collect()
}

/// Segmented regression trend detector
#[derive(Debug, Clone)]
pub struct TrendDetector {
    config: TrendConfig,
}

impl TrendDetector {
    /// Create a detector
    ///
    /// # Errors
    /// Returns `Configuration` if the configuration is invalid
    pub fn new(config: TrendConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The detector configuration
    #[must_use]
    pub const fn config(&self) -> &TrendConfig {
        &self.config
    }

    /// Characterize one series given as `(year, value)` points sorted by year
    ///
    /// Never fails: non-finite values are skipped, a series with fewer than
    /// `min_data_points` remaining points is reported as
    /// [`TrendStatus::InsufficientData`], and a constant series yields one
    /// flat, non-significant segment.
    #[must_use]
    pub fn detect_series(&self, key: SeriesKey, points: &[(i32, f64)]) -> TrendResult {
        let finite: Vec<(i32, f64)> = points
            .iter()
            .copied()
            .filter(|(_, value)| value.is_finite())
            .collect();
        let points = finite.as_slice();
        let changes = change_summaries(points, self.config.change_window, self.config.last_value);
        let (relative_change, absolute_change) = changes
            .last()
            .map_or((None, None), |c| (c.relative_change, c.absolute_change));
        let mut result = TrendResult {
            key,
            status: TrendStatus::Ok,
            n_points: points.len(),
            segments: Vec::new(),
            most_recent_segment: None,
            mann_kendall: None,
            mk_slope: None,
            mk_significant: false,
            relative_change,
            absolute_change,
            changes,
        };

        if points.len() < self.config.min_data_points {
            debug!(
                "Series {:?} has {} points, {} required",
                result.key,
                points.len(),
                self.config.min_data_points
            );
            result.status = TrendStatus::InsufficientData {
                points: points.len(),
                required: self.config.min_data_points,
            };
            return result;
        }

        let x: Vec<f64> = points.iter().map(|(year, _)| f64::from(*year)).collect();
        let y: Vec<f64> = points.iter().map(|(_, value)| *value).collect();

        if is_constant(&y) {
            let flat = Segment {
                start_year: points[0].0,
                end_year: points[points.len() - 1].0,
                slope: 0.0,
                intercept: y[0],
                fit_score: 1.0,
                rss: 0.0,
                stderr_slope: Some(0.0),
                n_points: points.len(),
            };
            let mk = mann_kendall(&x, &y, self.config.alpha);
            result.segments = vec![flat];
            result.most_recent_segment = Some(flat);
            result.mk_slope = Some(0.0);
            result.mann_kendall = Some(mk);
            return result;
        }

        let Some(segmentation) =
            best_segmentation(&x, &y, self.config.min_data_points, self.config.objective)
        else {
            result.status = TrendStatus::InsufficientData {
                points: points.len(),
                required: self.config.min_data_points,
            };
            return result;
        };

        result.segments = segmentation
            .ranges
            .iter()
            .zip(&segmentation.fits)
            .map(|(&(start, end), fit)| Segment {
                start_year: points[start].0,
                end_year: points[end - 1].0,
                slope: fit.slope,
                intercept: fit.intercept,
                fit_score: fit.r_squared,
                rss: fit.rss,
                stderr_slope: fit.stderr_slope,
                n_points: fit.n,
            })
            .collect();
        result.most_recent_segment = result.segments.last().copied();

        if let Some(&(start, end)) = segmentation.ranges.last() {
            let mk = mann_kendall(&x[start..end], &y[start..end], self.config.alpha);
            result.mk_slope = Some(mk.sen_slope);
            result.mk_significant = mk.significant;
            result.mann_kendall = Some(mk);
        }
        result
    }

    /// Characterize every series found in `records`
    ///
    /// # Returns
    /// One result per series, sorted by [`SeriesKey`]
    ///
    /// # Errors
    /// Returns `WorkerPool` if the worker pool cannot be created
    pub fn detect_all(&self, records: &[TradeRecord]) -> Result<Vec<TrendResult>> {
        let start = Instant::now();
        log_operation_start("Detecting trends", records.len());

        let series: Vec<(SeriesKey, Vec<(i32, f64)>)> = build_series(records).into_iter().collect();
        let pb = self
            .config
            .show_progress
            .then(|| create_main_progress_bar(series.len() as u64, Some("Detecting trends")));

        let detect = |(key, points): &(SeriesKey, Vec<(i32, f64)>)| {
            let result = self.detect_series(key.clone(), points);
            if let Some(pb) = &pb {
                pb.inc(1);
            }
            result
        };

        let results: Vec<TrendResult> = if self.config.multi_process {
            let num_threads = self.config.effective_threads();
            info!("Using parallel processing with {num_threads} threads");
            let pool = rayon::ThreadPoolBuilder::new().num_threads(num_threads).build()?;
            pool.install(|| series.par_iter().map(detect).collect())
        } else {
            series.iter().map(detect).collect()
        };

        if let Some(pb) = &pb {
            finish_progress_bar(pb, Some("Trend detection complete"));
        }
        let insufficient = results.iter().filter(|r| r.is_insufficient()).count();
        if insufficient > 0 {
            info!("{insufficient} of {} series have insufficient data", results.len());
        }
        log_operation_complete("analyzed", results.len(), Some(start.elapsed()));
        Ok(results)
    }
}

fn is_constant(y: &[f64]) -> bool {
    y.windows(2).all(|w| w[0] == w[1])
}
