//! Ordinary least squares fit of a straight line

/// Least squares line through a set of points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination; 1 for a constant series, which the
    /// horizontal line fits exactly
    pub r_squared: f64,
    /// Residual sum of squares
    pub rss: f64,
    /// Total sum of squares around the mean
    pub tss: f64,
    /// Standard error of the slope; `None` with fewer than three points
    pub stderr_slope: Option<f64>,
    pub stderr_intercept: Option<f64>,
    pub n: usize,
}

impl LinearFit {
    /// Fitted value at `x`
    #[must_use]
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Fit `y = intercept + slope * x`
///
/// Returns `None` with fewer than two points or when all `x` are equal.
#[must_use]
pub fn fit_line(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let x = &x[..n];
    let y = &y[..n];
    let nf = n as f64;
    let mean_x = x.iter().sum::<f64>() / nf;
    let mean_y = y.iter().sum::<f64>() / nf;

    let (sxx, sxy, syy) = x.iter().zip(y).fold((0.0, 0.0, 0.0), |(sxx, sxy, syy), (xi, yi)| {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        (sxx + dx * dx, sxy + dx * dy, syy + dy * dy)
    });
    if sxx <= 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let rss = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| {
            let r = yi - (intercept + slope * xi);
            r * r
        })
        .sum::<f64>();
    let r_squared = if syy > 0.0 { 1.0 - rss / syy } else { 1.0 };

    let (stderr_slope, stderr_intercept) = if n > 2 {
        let sigma2 = rss / (nf - 2.0);
        (
            Some((sigma2 / sxx).sqrt()),
            Some((sigma2 * (1.0 / nf + mean_x * mean_x / sxx)).sqrt()),
        )
    } else {
        (None, None)
    };

    Some(LinearFit {
        slope,
        intercept,
        r_squared,
        rss,
        tss: syy,
        stderr_slope,
        stderr_intercept,
        n,
    })
}
