//! Min-max scaling

use serde::{Deserialize, Serialize};
use te_common::{TeError, TeResult};

/// `(min, max)` fit on a series; maps it onto `[0, 1]`
///
/// A degenerate range (`max == min`) leaves values untouched in both
/// directions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationRange {
    /// Smallest fitted value
    pub min: f64,
    /// Largest fitted value
    pub max: f64,
}

impl NormalizationRange {
    /// Fit on a non-empty series of finite values
    pub fn fit(series: &[f64]) -> TeResult<Self> {
        if series.is_empty() {
            return Err(TeError::InvalidInput("cannot fit normalization on an empty series".into()));
        }
        if let Some(idx) = series.iter().position(|v| !v.is_finite()) {
            return Err(TeError::InvalidInput(format!("series[{idx}] is not finite")));
        }
        let (min, max) = series
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Ok(Self { min, max })
    }

    /// `max - min`
    #[inline]
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Whether scaling is the identity
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.span() == 0.0
    }

    /// Scale one value
    #[inline]
    pub fn normalize(&self, value: f64) -> f64 {
        if self.is_degenerate() {
            value
        } else {
            (value - self.min) / self.span()
        }
    }

    /// Undo [`NormalizationRange::normalize`]
    #[inline]
    pub fn denormalize(&self, value: f64) -> f64 {
        if self.is_degenerate() {
            value
        } else {
            value * self.span() + self.min
        }
    }

    /// Scale a whole series
    pub fn normalize_all(&self, series: &[f64]) -> Vec<f64> {
        series.iter().map(|&v| self.normalize(v)).collect()
    }
}
