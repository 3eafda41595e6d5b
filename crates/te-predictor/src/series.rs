//! Series helpers: windowing, splitting and synthetic traffic

use rand::Rng;
use statrs::distribution::Normal;
use std::f64::consts::PI;
use te_common::{TeError, TeResult};

/// `(window, next)` pairs for every offset with a following value
pub fn sliding_windows(series: &[f64], window: usize) -> Vec<(&[f64], f64)> {
    if window == 0 || series.len() <= window {
        return Vec::new();
    }
    series
        .windows(window + 1)
        .map(|w| (&w[..window], w[window]))
        .collect()
}

/// Chronological split at `train_ratio` of the series
pub fn split_train_test(series: &[f64], train_ratio: f64) -> TeResult<(&[f64], &[f64])> {
    if !(0.0..=1.0).contains(&train_ratio) {
        return Err(TeError::InvalidInput(format!(
            "train ratio must be in [0, 1], got {train_ratio}"
        )));
    }
    let cut = (series.len() as f64 * train_ratio) as usize;
    Ok(series.split_at(cut))
}

/// Synthetic utilization trace in percent
///
/// `30 + 20 sin(2πt) + 15 sin(10πt) + N(0, 5)` sampled at `n` evenly spaced
/// points on `[0, 10]`, clipped to `[0, 100]`.
pub fn generate_sample_traffic<R: Rng + ?Sized>(n: usize, rng: &mut R) -> TeResult<Vec<f64>> {
    let noise = Normal::new(0.0, 5.0).map_err(|e| TeError::Config(e.to_string()))?;
    let step = if n > 1 { 10.0 / (n - 1) as f64 } else { 0.0 };

    Ok((0..n)
        .map(|i| {
            let t = i as f64 * step;
            let value = 30.0
                + 20.0 * (2.0 * PI * t).sin()
                + 15.0 * (10.0 * PI * t).sin()
                + rng.sample(noise);
            value.clamp(0.0, 100.0)
        })
        .collect())
}
