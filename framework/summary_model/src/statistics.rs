use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::statistics::Statistics as _;

/// Descriptive statistics over one sample's measured values, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
    /// Sample (n - 1) standard deviation, 0 for a single value.
    pub standard_deviation: f64,
}

impl Statistics {
    /// Returns `None` when there are no values to describe.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        Some(Self {
            count,
            min: *sorted.first()?,
            max: *sorted.last()?,
            mean: sorted.iter().mean(),
            median: percentile(&sorted, 50.0)?,
            p90: percentile(&sorted, 90.0)?,
            standard_deviation: if count > 1 { sorted.iter().std_dev() } else { 0.0 },
        })
    }
}

/// Estimates the `p`th percentile of ascending `sorted` values, interpolating at position
/// `p * (n + 1) / 100` and clamping to the extremes.
///
/// `None` when there are no values or `p` is not a finite number.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let (first, last) = (*sorted.first()?, *sorted.last()?);
    if !p.is_finite() {
        return None;
    }
    let n = sorted.len();
    let pos = p * (n as f64 + 1.0) / 100.0;
    if pos < 1.0 {
        return Some(first);
    }
    if pos >= n as f64 {
        return Some(last);
    }
    let index = pos.floor() as usize;
    let (lower, upper) = (sorted[index - 1], sorted[index]);
    Some(lower + pos.fract() * (upper - lower))
}

/// Confidence, in percent, that `measured` and `baseline` come from different distributions.
///
/// Based on the two sided Mann-Whitney U test using the normal approximation. `None` when either
/// side is empty.
pub fn confidence_percent(baseline: &[f64], measured: &[f64]) -> Option<f64> {
    if baseline.is_empty() || measured.is_empty() {
        return None;
    }
    Some((1.0 - mann_whitney_p_value(baseline, measured)) * 100.0)
}

fn mann_whitney_p_value(x: &[f64], y: &[f64]) -> f64 {
    let n1 = x.len() as f64;
    let n2 = y.len() as f64;

    let mut combined: Vec<(f64, bool)> = x
        .iter()
        .map(|v| (*v, true))
        .chain(y.iter().map(|v| (*v, false)))
        .collect();
    combined.sort_by(|a, b| a.0.total_cmp(&b.0));

    // Tied values share the average of their ranks.
    let mut rank_sum_x = 0.0;
    let mut i = 0;
    while i < combined.len() {
        let mut j = i;
        while j + 1 < combined.len() && combined[j + 1].0 == combined[i].0 {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        rank_sum_x += combined[i..=j].iter().filter(|(_, in_x)| *in_x).count() as f64 * rank;
        i = j + 1;
    }

    let u1 = rank_sum_x - n1 * (n1 + 1.0) / 2.0;
    let u_min = u1.min(n1 * n2 - u1);
    let expected = n1 * n2 / 2.0;
    let variance = n1 * n2 * (n1 + n2 + 1.0) / 12.0;
    if variance == 0.0 {
        return 1.0;
    }
    let z = (u_min - expected) / variance.sqrt();
    (2.0 * Normal::standard().cdf(z)).min(1.0)
}
