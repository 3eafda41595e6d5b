//! opente Predictor - Utilization forecasting
//!
//! Fits a stacked LSTM on a min-max normalised utilization series and rolls
//! it forward autoregressively. [`CongestionDetector`] turns a short
//! forecast into a yes/no congestion verdict.
//!
//! ```text
//! series ─► NormalizationRange::fit ─► sliding windows ─► LSTM (full batch)
//! window ─► predict_future(5) ─► any(p > threshold) ─► CongestionReport
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod congestion;
pub mod normalize;
pub mod predictor;
pub mod series;

pub use congestion::{CongestionDetector, CongestionReport, Forecaster, DEFAULT_HORIZON};
pub use normalize::NormalizationRange;
pub use predictor::{SequencePredictor, TrainingReport};
pub use series::{generate_sample_traffic, sliding_windows, split_train_test};
