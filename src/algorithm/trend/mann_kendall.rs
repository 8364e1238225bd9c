//! Mann-Kendall monotonic trend test with Sen's slope

use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction of a monotonic trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    NoTrend,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Increasing => f.write_str("increasing"),
            Self::Decreasing => f.write_str("decreasing"),
            Self::NoTrend => f.write_str("no trend"),
        }
    }
}

/// Outcome of the Mann-Kendall test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MannKendall {
    pub trend: TrendDirection,
    /// Whether `p_value < alpha`
    pub significant: bool,
    pub p_value: f64,
    /// Normalized test statistic with continuity correction
    pub z: f64,
    /// Kendall's tau
    pub tau: f64,
    /// Sum of the signs of all pairwise differences
    pub s: f64,
    /// Variance of `s`, corrected for ties
    pub var_s: f64,
    /// Median of pairwise slopes, per unit of `x`
    pub sen_slope: f64,
    /// `median(y) - median(x) * sen_slope`
    pub intercept: f64,
}

/// Run the test on `y` observed at `x` (strictly increasing)
#[must_use]
pub fn mann_kendall(x: &[f64], y: &[f64], alpha: f64) -> MannKendall {
    let n = x.len().min(y.len());
    let x = &x[..n];
    let y = &y[..n];

    let mut s = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            s += sign(y[j] - y[i]);
        }
    }

    let var_s = variance_of_s(y);
    let z = if var_s <= 0.0 {
        0.0
    } else if s > 0.0 {
        (s - 1.0) / var_s.sqrt()
    } else if s < 0.0 {
        (s + 1.0) / var_s.sqrt()
    } else {
        0.0
    };
    let p_value = 2.0 * (1.0 - normal_cdf(z.abs()));
    let significant = p_value < alpha;
    let trend = match (significant, z > 0.0) {
        (false, _) => TrendDirection::NoTrend,
        (true, true) => TrendDirection::Increasing,
        (true, false) => TrendDirection::Decreasing,
    };
    let pairs = n.saturating_sub(1) as f64 * n as f64 / 2.0;
    let tau = if pairs > 0.0 { s / pairs } else { 0.0 };

    let sen_slope = sens_slope(x, y);
    let intercept = median(y.to_vec()) - median(x.to_vec()) * sen_slope;

    MannKendall {
        trend,
        significant,
        p_value,
        z,
        tau,
        s,
        var_s,
        sen_slope,
        intercept,
    }
}

fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn variance_of_s(y: &[f64]) -> f64 {
    let n = y.len() as f64;
    let mut sorted = y.to_vec();
    sorted.sort_by(f64::total_cmp);
    let ties: f64 = sorted
        .chunk_by(|a, b| a == b)
        .map(|group| group.len() as f64)
        .filter(|&t| t > 1.0)
        .map(|t| t * (t - 1.0) * (2.0 * t + 5.0))
        .sum();
    (n * (n - 1.0) * (2.0 * n + 5.0) - ties) / 18.0
}

fn sens_slope(x: &[f64], y: &[f64]) -> f64 {
    let mut slopes = Vec::with_capacity(x.len() * x.len().saturating_sub(1) / 2);
    for i in 0..x.len() {
        for j in (i + 1)..x.len() {
            let dx = x[j] - x[i];
            if dx != 0.0 {
                slopes.push((y[j] - y[i]) / dx);
            }
        }
    }
    if slopes.is_empty() { 0.0 } else { median(slopes) }
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Standard normal cumulative distribution function
#[must_use]
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / std::f64::consts::SQRT_2)
}

/// Complementary error function, fractional error below 1.2e-7
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let r = t * poly.exp();
    if x >= 0.0 { r } else { 2.0 - r }
}
