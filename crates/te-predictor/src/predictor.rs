//! LSTM sequence predictor
//!
//! `train` fits the normalization range on the training series, builds
//! every `(window, next)` pair and runs full-batch Adam for the requested
//! epochs. Inference normalises the window with the stored range, runs the
//! model with dropout off and maps the output back.

use crate::congestion::{CongestionDetector, CongestionReport, Forecaster};
use crate::normalize::NormalizationRange;
use crate::series::sliding_windows;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::Path;
use te_common::{PredictorConfig, RingBuffer, TeError, TeResult, ValidationScaling};
use te_nn::{
    Adam, AdamParams, BundleKind, Device, LstmRegressor, ParamSet, Tensor, TensorBundle,
};
use tracing::{debug, info, warn};

/// Loss summary of one `train` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    /// Epochs run
    pub epochs: usize,
    /// Training windows per epoch
    pub samples: usize,
    /// Last training loss (normalised scale)
    pub final_train_loss: Option<f64>,
    /// Last validation loss, if validation data was given
    pub final_val_loss: Option<f64>,
}

/// Windowed LSTM forecaster with fit-time normalization
#[derive(Debug)]
pub struct SequencePredictor {
    config: PredictorConfig,
    model: LstmRegressor,
    optimizer: Adam,
    range: Option<NormalizationRange>,
    recent: RingBuffer<f64>,
    train_losses: Vec<f64>,
    val_losses: Vec<f64>,
    rng: StdRng,
    device: Device,
}

impl SequencePredictor {
    /// Untrained predictor
    pub fn new(config: PredictorConfig) -> TeResult<Self> {
        config.validate()?;
        let device = te_nn::device();
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let model = LstmRegressor::new(
            1,
            config.hidden_size,
            config.num_layers,
            config.dropout,
            &mut rng,
            &device,
        )?;
        let optimizer = Adam::new(model.vars(), AdamParams::with_lr(config.learning_rate))?;

        info!(
            sequence_length = config.sequence_length,
            hidden_size = config.hidden_size,
            num_layers = config.num_layers,
            parameters = model.num_parameters(),
            "Sequence predictor initialized"
        );

        Ok(Self {
            recent: RingBuffer::new(config.sequence_length)?,
            config,
            model,
            optimizer,
            range: None,
            train_losses: Vec::new(),
            val_losses: Vec::new(),
            rng,
            device,
        })
    }

    /// Create a predictor and restore it from a checkpoint
    pub fn from_checkpoint(config: PredictorConfig, path: impl AsRef<Path>) -> TeResult<Self> {
        let mut predictor = Self::new(config)?;
        predictor.load(path)?;
        Ok(predictor)
    }

    /// Fit on `series`, optionally scoring `validation` after every epoch.
    ///
    /// `epochs` defaults to the configured count. Needs at least
    /// `sequence_length + 1` points in each series.
    pub fn train(
        &mut self,
        series: &[f64],
        validation: Option<&[f64]>,
        epochs: Option<usize>,
    ) -> TeResult<TrainingReport> {
        let epochs = epochs.unwrap_or(self.config.epochs);
        let range = NormalizationRange::fit(series)?;
        let (inputs, targets) = self.window_batch(series, &range)?;
        let samples = targets.dims()[0];

        let validation = match validation {
            Some(values) => {
                let val_range = match self.config.validation_scaling {
                    ValidationScaling::Independent => {
                        warn!("Validation series normalized with its own bounds");
                        NormalizationRange::fit(values)?
                    }
                    ValidationScaling::TrainingBounds => range,
                };
                Some(self.window_batch(values, &val_range)?)
            }
            None => None,
        };

        self.range = Some(range);
        self.recent.clear();

        let mut final_train_loss = None;
        let mut final_val_loss = None;
        for epoch in 1..=epochs {
            let output = self.model.forward_train(&inputs, &mut self.rng)?;
            let loss = candle_nn::loss::mse(&output, &targets)?;
            let train_loss = loss.to_scalar::<f64>()?;
            self.optimizer.backward_step(&loss, None)?;
            self.train_losses.push(train_loss);
            final_train_loss = Some(train_loss);

            if let Some((val_inputs, val_targets)) = &validation {
                let output = self.model.forward(val_inputs)?;
                let val_loss = candle_nn::loss::mse(&output, val_targets)?.to_scalar::<f64>()?;
                self.val_losses.push(val_loss);
                final_val_loss = Some(val_loss);
            }

            debug!(epoch, epochs, train_loss, val_loss = ?final_val_loss, "Predictor epoch");
        }

        info!(
            epochs,
            samples,
            train_loss = ?final_train_loss,
            val_loss = ?final_val_loss,
            min = range.min,
            max = range.max,
            "Predictor training completed"
        );

        Ok(TrainingReport {
            epochs,
            samples,
            final_train_loss,
            final_val_loss,
        })
    }

    fn window_batch(
        &self,
        series: &[f64],
        range: &NormalizationRange,
    ) -> TeResult<(Tensor, Tensor)> {
        let length = self.config.sequence_length;
        let required = length + 1;
        if series.len() < required {
            return Err(TeError::InsufficientData {
                available: series.len(),
                required,
            });
        }

        let normalized = range.normalize_all(series);
        let windows = sliding_windows(&normalized, length);
        let n = windows.len();
        let mut inputs = Vec::with_capacity(n * length);
        let mut targets = Vec::with_capacity(n);
        for (window, next) in windows {
            inputs.extend_from_slice(window);
            targets.push(next);
        }

        Ok((
            Tensor::from_vec(inputs, (n, length, 1), &self.device)?,
            Tensor::from_vec(targets, (n, 1), &self.device)?,
        ))
    }

    /// One-step forecast after `window`
    pub fn predict(&self, window: &[f64]) -> TeResult<f64> {
        let range = self.range.ok_or(TeError::UntrainedModel)?;
        if window.is_empty() {
            return Err(TeError::InvalidInput("prediction window is empty".into()));
        }
        if let Some(idx) = window.iter().position(|v| !v.is_finite()) {
            return Err(TeError::InvalidInput(format!("window[{idx}] is not finite")));
        }

        let input = Tensor::from_vec(range.normalize_all(window), (1, window.len(), 1), &self.device)?;
        let output = self.model.forward(&input)?.reshape(())?.to_scalar::<f64>()?;
        Ok(range.denormalize(output))
    }

    /// Autoregressive `steps`-long forecast: each prediction is appended to
    /// the window and the oldest value dropped
    pub fn predict_future(&self, window: &[f64], steps: usize) -> TeResult<Vec<f64>> {
        let mut current = window.to_vec();
        let mut predictions = Vec::with_capacity(steps);
        for _ in 0..steps {
            let next = self.predict(&current)?;
            predictions.push(next);
            current.rotate_left(1);
            if let Some(last) = current.last_mut() {
                *last = next;
            }
        }
        Ok(predictions)
    }

    /// Feed one live sample; echoes it until a full window is buffered,
    /// then returns the one-step forecast
    pub fn predict_next_step(&mut self, value: f64) -> TeResult<f64> {
        self.recent.push(value);
        if !self.recent.is_full() {
            return Ok(value);
        }
        self.predict(&self.recent.to_vec())
    }

    /// Five-step forecast compared against `threshold`
    pub fn detect_congestion(&self, window: &[f64], threshold: f64) -> TeResult<CongestionReport> {
        CongestionDetector::new(threshold).detect(self, window)
    }

    /// Write model, optimizer state, range and loss history
    pub fn save(&self, path: impl AsRef<Path>) -> TeResult<()> {
        let mut bundle = TensorBundle::new(BundleKind::Predictor, &self.device)?;
        for (name, var) in self.model.named_vars() {
            bundle.insert(format!("model.{name}"), var.as_tensor().copy()?);
        }
        self.optimizer.export(&mut bundle, "optim")?;
        bundle.insert_scalar("meta.sequence_length", self.config.sequence_length as f64)?;
        bundle.insert_scalar("meta.batch_size", self.config.batch_size as f64)?;
        if let Some(range) = self.range {
            bundle.insert_scalar("norm.min", range.min)?;
            bundle.insert_scalar("norm.max", range.max)?;
        }
        bundle.insert_series("history.train_losses", &self.train_losses)?;
        bundle.insert_series("history.val_losses", &self.val_losses)?;
        bundle.save(path.as_ref())?;

        info!(path = %path.as_ref().display(), "Predictor saved");
        Ok(())
    }

    /// Restore a checkpoint written by [`SequencePredictor::save`].
    ///
    /// On error the predictor is left as it was.
    pub fn load(&mut self, path: impl AsRef<Path>) -> TeResult<()> {
        let mut bundle = TensorBundle::load(path.as_ref(), BundleKind::Predictor, &self.device)?;

        let stored_length = bundle.scalar("meta.sequence_length")?;
        if stored_length != self.config.sequence_length as f64 {
            return Err(TeError::Persistence(format!(
                "checkpoint uses sequence length {stored_length}, configured {}",
                self.config.sequence_length
            )));
        }
        bundle.scalar("meta.batch_size")?;

        let mut restored = Vec::new();
        for (name, var) in self.model.named_vars() {
            let tensor = bundle.take(&format!("model.{name}"), var.as_tensor().dims())?;
            restored.push((var, tensor));
        }
        let range = if bundle.contains("norm.min") {
            let min = bundle.scalar("norm.min")?;
            let max = bundle.scalar("norm.max")?;
            if !(min.is_finite() && max.is_finite() && min <= max) {
                return Err(TeError::Persistence(format!("invalid normalization range [{min}, {max}]")));
            }
            Some(NormalizationRange { min, max })
        } else {
            None
        };
        let train_losses = bundle.series("history.train_losses")?;
        let val_losses = bundle.series("history.val_losses")?;
        self.optimizer.import(&mut bundle, "optim")?;

        for (var, tensor) in restored {
            var.set(&tensor)?;
        }
        self.range = range;
        self.train_losses = train_losses;
        self.val_losses = val_losses;
        self.recent.clear();

        info!(path = %path.as_ref().display(), fitted = range.is_some(), "Predictor loaded");
        Ok(())
    }

    /// Fitted range, `None` before training
    pub fn normalization(&self) -> Option<NormalizationRange> {
        self.range
    }

    /// Whether predictions are available
    pub fn is_trained(&self) -> bool {
        self.range.is_some()
    }

    /// Training loss of every epoch so far
    pub fn train_losses(&self) -> &[f64] {
        &self.train_losses
    }

    /// Validation loss of every epoch that had validation data
    pub fn val_losses(&self) -> &[f64] {
        &self.val_losses
    }

    /// Construction-time configuration
    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }
}

impl Forecaster for SequencePredictor {
    fn predict_future(&self, window: &[f64], steps: usize) -> TeResult<Vec<f64>> {
        SequencePredictor::predict_future(self, window, steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> PredictorConfig {
        PredictorConfig {
            sequence_length: 10,
            hidden_size: 16,
            num_layers: 1,
            dropout: 0.0,
            learning_rate: 0.01,
            seed: Some(seed),
            ..Default::default()
        }
    }

    fn wave(n: usize, base: f64, amplitude: f64) -> Vec<f64> {
        (0..n).map(|i| base + amplitude * (i as f64 * 0.3).sin()).collect()
    }

    #[test]
    fn test_untrained_fails_fast() {
        let predictor = SequencePredictor::new(config(0)).unwrap();
        assert!(matches!(predictor.predict(&[1.0; 10]), Err(TeError::UntrainedModel)));
        assert!(matches!(
            predictor.predict_future(&[1.0; 10], 3),
            Err(TeError::UntrainedModel)
        ));
    }

    #[test]
    fn test_train_needs_a_full_window() {
        let mut predictor = SequencePredictor::new(config(1)).unwrap();
        let err = predictor.train(&[1.0; 10], None, Some(1)).unwrap_err();
        assert!(matches!(err, TeError::InsufficientData { available: 10, required: 11 }));
        assert!(!predictor.is_trained());
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut predictor = SequencePredictor::new(config(2)).unwrap();
        let series = wave(120, 50.0, 20.0);
        let report = predictor.train(&series, None, Some(60)).unwrap();

        assert_eq!(report.epochs, 60);
        assert_eq!(report.samples, 110);
        let losses = predictor.train_losses();
        assert_eq!(losses.len(), 60);
        assert!(losses[59] < losses[0], "first {} last {}", losses[0], losses[59]);
        assert_eq!(predictor.normalization().unwrap().min, series.iter().copied().fold(f64::INFINITY, f64::min));
    }

    #[test]
    fn test_validation_scaling() {
        let series = wave(80, 50.0, 20.0);
        let validation = wave(40, 10.0, 5.0);

        let mut independent = SequencePredictor::new(config(3)).unwrap();
        independent.train(&series, Some(&validation), Some(5)).unwrap();

        let mut shared = SequencePredictor::new(PredictorConfig {
            validation_scaling: ValidationScaling::TrainingBounds,
            ..config(3)
        })
        .unwrap();
        shared.train(&series, Some(&validation), Some(5)).unwrap();

        assert_eq!(independent.val_losses().len(), 5);
        assert_eq!(shared.val_losses().len(), 5);
        assert_eq!(independent.train_losses(), shared.train_losses());
        assert_ne!(independent.val_losses(), shared.val_losses());
        // stored bounds always come from the training series
        assert_eq!(independent.normalization(), shared.normalization());
    }

    #[test]
    fn test_predict_future_shape() {
        let mut predictor = SequencePredictor::new(config(4)).unwrap();
        predictor.train(&wave(60, 40.0, 10.0), None, Some(10)).unwrap();

        let window = wave(10, 40.0, 10.0);
        let forecast = predictor.predict_future(&window, 7).unwrap();
        assert_eq!(forecast.len(), 7);
        assert_eq!(forecast[0], predictor.predict(&window).unwrap());
        assert!(forecast.iter().all(|v| v.is_finite()));

        assert!(matches!(predictor.predict(&[]), Err(TeError::InvalidInput(_))));
        assert!(matches!(
            predictor.predict(&[1.0, f64::NAN]),
            Err(TeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_congestion_on_rising_window() {
        let mut predictor = SequencePredictor::new(config(5)).unwrap();
        let busy = wave(200, 90.0, 8.0);
        predictor.train(&busy, None, Some(100)).unwrap();

        let window = [70.0, 72.0, 75.0, 78.0, 80.0, 82.0, 84.0, 85.0, 87.0, 88.0];
        let report = predictor.detect_congestion(&window, 80.0).unwrap();
        assert!(report.congestion_detected, "report = {report:?}");
        assert_eq!(report.predictions.len(), 5);
        assert_eq!(report.current_utilization, 88.0);
    }

    #[test]
    fn test_online_buffer() {
        let mut predictor = SequencePredictor::new(config(6)).unwrap();
        predictor.train(&wave(40, 30.0, 5.0), None, Some(3)).unwrap();

        for i in 0..9 {
            let value = 30.0 + i as f64;
            assert_eq!(predictor.predict_next_step(value).unwrap(), value);
        }
        let window: Vec<f64> = (0..10).map(|i| 30.0 + i as f64).collect();
        let expected = predictor.predict(&window).unwrap();
        assert_eq!(predictor.predict_next_step(39.0).unwrap(), expected);
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictor.safetensors");

        let mut predictor = SequencePredictor::new(PredictorConfig {
            num_layers: 2,
            dropout: 0.2,
            ..config(7)
        })
        .unwrap();
        predictor.train(&wave(50, 60.0, 15.0), None, Some(5)).unwrap();
        predictor.save(&path).unwrap();

        let restored = SequencePredictor::from_checkpoint(
            PredictorConfig {
                num_layers: 2,
                dropout: 0.2,
                ..config(8)
            },
            &path,
        )
        .unwrap();
        let probe = wave(10, 55.0, 12.0);
        assert_eq!(
            predictor.predict_future(&probe, 5).unwrap(),
            restored.predict_future(&probe, 5).unwrap()
        );
        assert_eq!(restored.normalization(), predictor.normalization());
        assert_eq!(restored.train_losses(), predictor.train_losses());
    }

    #[test]
    fn test_load_rejects_other_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictor.safetensors");
        SequencePredictor::new(config(9)).unwrap().save(&path).unwrap();

        let mut other = SequencePredictor::new(PredictorConfig {
            sequence_length: 12,
            ..config(9)
        })
        .unwrap();
        assert!(matches!(other.load(&path), Err(TeError::Persistence(_))));
        assert!(!other.is_trained());
    }
}
