//! Breakpoint search for piecewise linear fits
//!
//! A segmentation splits the ordered series into contiguous pieces of at
//! least `min_points` observations each, with an independent least squares
//! line per piece. Under the RSS objective the search covers every admissible
//! segmentation with 1..=n/min_points pieces; it is carried out by dynamic
//! programming over the end index of the last piece, which returns the same
//! optimum as enumerating all breakpoint combinations.

use log::debug;

use crate::algorithm::trend::config::ObjectiveFunction;
use crate::algorithm::trend::ols::{LinearFit, fit_line};

/// Best segmentation found for a series
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    /// Half-open index ranges `[start, end)` of the pieces, in order
    pub ranges: Vec<(usize, usize)>,
    pub fits: Vec<LinearFit>,
    /// Total RSS under the RSS objective; R² of the last piece under R2
    pub score: f64,
}

impl Segmentation {
    /// Fit of the most recent piece
    #[must_use]
    pub fn last_fit(&self) -> Option<&LinearFit> {
        self.fits.last()
    }
}

/// Search the best segmentation of `(x, y)` under `objective`
///
/// Ties are broken toward fewer pieces. Returns `None` when the series has
/// fewer than `min_points` observations.
#[must_use]
pub fn best_segmentation(
    x: &[f64],
    y: &[f64],
    min_points: usize,
    objective: ObjectiveFunction,
) -> Option<Segmentation> {
    let n = x.len().min(y.len());
    let min_points = min_points.max(2);
    if n < min_points {
        return None;
    }

    let ranges = match objective {
        ObjectiveFunction::Rss => min_rss_ranges(x, y, n, min_points)?,
        ObjectiveFunction::R2 => max_recent_r2_ranges(x, y, n, min_points)?,
    };

    let fits: Vec<LinearFit> = ranges
        .iter()
        .map(|&(start, end)| fit_line(&x[start..end], &y[start..end]))
        .collect::<Option<_>>()?;
    let score = match objective {
        ObjectiveFunction::Rss => fits.iter().map(|f| f.rss).sum(),
        ObjectiveFunction::R2 => fits.last().map_or(f64::NAN, |f| f.r_squared),
    };

    debug!("Selected {} segment(s) with {objective} score {score}", ranges.len());
    Some(Segmentation { ranges, fits, score })
}

/// Tolerance below which two scores count as equal
fn tolerance(y: &[f64]) -> f64 {
    let n = y.len() as f64;
    let mean = y.iter().sum::<f64>() / n;
    let tss: f64 = y.iter().map(|v| (v - mean) * (v - mean)).sum();
    1e-9 * (tss + 1.0)
}

fn min_rss_ranges(
    x: &[f64],
    y: &[f64],
    n: usize,
    min_points: usize,
) -> Option<Vec<(usize, usize)>> {
    let max_pieces = n / min_points;

    // cost[i][j]: RSS of one line over [i, j), infinite when too short
    let mut cost = vec![vec![f64::INFINITY; n + 1]; n + 1];
    for i in 0..n {
        for j in (i + min_points)..=n {
            if let Some(fit) = fit_line(&x[i..j], &y[i..j]) {
                cost[i][j] = fit.rss;
            }
        }
    }

    // best[k][j]: minimal RSS covering [0, j) with k + 1 pieces
    let mut best = vec![vec![f64::INFINITY; n + 1]; max_pieces];
    let mut parent = vec![vec![0usize; n + 1]; max_pieces];
    best[0][..=n].copy_from_slice(&cost[0][..=n]);
    for k in 1..max_pieces {
        for j in ((k + 1) * min_points)..=n {
            for i in (k * min_points)..=(j - min_points) {
                let candidate = best[k - 1][i] + cost[i][j];
                if candidate < best[k][j] {
                    best[k][j] = candidate;
                    parent[k][j] = i;
                }
            }
        }
    }

    let tol = tolerance(&y[..n]);
    let mut pieces = 0;
    for k in 1..max_pieces {
        if best[k][n] < best[pieces][n] - tol {
            pieces = k;
        }
    }
    if !best[pieces][n].is_finite() {
        return None;
    }

    let mut ranges = Vec::with_capacity(pieces + 1);
    let mut end = n;
    for k in (0..=pieces).rev() {
        let start = if k == 0 { 0 } else { parent[k][end] };
        ranges.push((start, end));
        end = start;
    }
    ranges.reverse();
    Some(ranges)
}

fn max_recent_r2_ranges(
    x: &[f64],
    y: &[f64],
    n: usize,
    min_points: usize,
) -> Option<Vec<(usize, usize)>> {
    let whole = fit_line(&x[..n], &y[..n])?;
    let mut best_score = whole.r_squared;
    let mut best_break = None;

    // Only the last piece is scored, so one breakpoint spans every choice of it
    for b in min_points..=n.saturating_sub(min_points) {
        if let Some(fit) = fit_line(&x[b..n], &y[b..n]) {
            if fit.r_squared > best_score + 1e-12 {
                best_score = fit.r_squared;
                best_break = Some(b);
            }
        }
    }

    Some(match best_break {
        Some(b) => vec![(0, b), (b, n)],
        None => vec![(0, n)],
    })
}
