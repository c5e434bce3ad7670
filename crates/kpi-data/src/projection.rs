//! Linear trend projection of the next period.

use kpi_core::period::Period;
use serde::{Deserialize, Serialize};

use crate::aggregator::AggregateIndex;

/// Least-squares projection of one series one month past its last period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub metric: String,
    pub brand: String,
    pub idh: String,
    /// The projected month.
    pub period: Period,
    /// Projected value, floored at zero.
    pub value: f64,
    /// Change per month of the fitted line.
    pub slope: f64,
    /// Number of observed periods in the fit.
    pub points: usize,
}

/// Fit `y = a + b·x` by ordinary least squares, with `x` the month offset
/// from the first observation so that gaps keep their width.
///
/// Returns `(intercept, slope)`; `None` with fewer than two points.
fn fit_line(series: &[(Period, f64)]) -> Option<(f64, f64)> {
    let (first, _) = *series.first()?;
    if series.len() < 2 {
        return None;
    }
    let n = series.len() as f64;
    let xs: Vec<f64> = series
        .iter()
        .map(|(p, _)| f64::from(first.months_until(p)))
        .collect();
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = series.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (x, (_, y)) in xs.iter().zip(series) {
        sxy += (x - mean_x) * (y - mean_y);
        sxx += (x - mean_x) * (x - mean_x);
    }
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some((mean_y - slope * mean_x, slope))
}

/// Project the month after the last observation of `(brand, idh, metric)`.
///
/// Use `ALL` for `brand`/`idh` to project roll-ups.
pub fn project_next_period(
    index: &AggregateIndex,
    metric: &str,
    brand: &str,
    idh: &str,
) -> Option<Projection> {
    let series = index.series(brand, idh, metric);
    let (intercept, slope) = fit_line(&series)?;
    let (first, _) = *series.first()?;
    let (last, _) = *series.last()?;
    let period = last.next()?;
    let x = f64::from(first.months_until(&period));

    Some(Projection {
        metric: metric.to_string(),
        brand: brand.to_string(),
        idh: idh.to_string(),
        period,
        value: (intercept + slope * x).max(0.0),
        slope,
        points: series.len(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
