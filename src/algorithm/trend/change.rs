//! Change of a value against the mean of a reference window

use serde::{Deserialize, Serialize};

use crate::algorithm::trend::config::ChangeWindow;

/// Change of one year's value against its reference mean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub year: i32,
    pub value: f64,
    /// Mean of the values present in the reference window; `None` if the
    /// window holds no observation
    pub reference_mean: Option<f64>,
    /// `(value - mean) / mean * 100`; `None` without a mean or when it is zero
    pub relative_change: Option<f64>,
    /// `value - mean`
    pub absolute_change: Option<f64>,
    pub reference_start: i32,
    pub reference_end: i32,
}

/// Compute change summaries for a yearly series sorted by year
///
/// With `last_value` only the most recent year is evaluated, otherwise every
/// year. Years missing inside the window are gaps: the mean is taken over the
/// years present.
#[must_use]
pub fn change_summaries(
    points: &[(i32, f64)],
    window: ChangeWindow,
    last_value: bool,
) -> Vec<ChangeSummary> {
    let evaluated = if last_value {
        points.last().map_or(&points[..0], std::slice::from_ref)
    } else {
        points
    };
    evaluated
        .iter()
        .map(|&(year, value)| summarize(points, year, value, window))
        .collect()
}

fn summarize(points: &[(i32, f64)], year: i32, value: f64, window: ChangeWindow) -> ChangeSummary {
    let (reference_start, reference_end) = match window {
        ChangeWindow::PrecedingYears(n) => {
            let span = i32::try_from(n).unwrap_or(i32::MAX);
            (year.saturating_sub(span), year - 1)
        }
        ChangeWindow::YearRange { start, end } => (start, end),
    };

    let (sum, count) = points
        .iter()
        .filter(|(y, _)| (reference_start..=reference_end).contains(y))
        .fold((0.0, 0usize), |(sum, count), (_, v)| (sum + v, count + 1));
    let reference_mean = (count > 0).then(|| sum / count as f64);

    let absolute_change = reference_mean.map(|mean| value - mean);
    let relative_change = reference_mean
        .filter(|mean| *mean != 0.0)
        .map(|mean| (value - mean) / mean * 100.0);

    ChangeSummary {
        year,
        value,
        reference_mean,
        relative_change,
        absolute_change,
        reference_start,
        reference_end,
    }
}
