//! Predictor and congestion commands

use super::{ensure_parent, read_json};
use crate::{output::OutputFormat, PredictorCommands};
use anyhow::Context;
use colored::Colorize;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::Path;
use te_common::TeConfig;
use te_predictor::{generate_sample_traffic, split_train_test, SequencePredictor, TrainingReport};

#[derive(Debug, Serialize)]
struct PredictorOutcome {
    report: TrainingReport,
    train_samples: usize,
    validation_samples: usize,
    normalization: Option<(f64, f64)>,
    /// One-step check on the first validation window
    sample_prediction: Option<SamplePrediction>,
    checkpoint: String,
}

#[derive(Debug, Serialize)]
struct SamplePrediction {
    predicted: f64,
    actual: f64,
    abs_error: f64,
}

#[derive(Debug, Serialize)]
struct Forecast {
    window: Vec<f64>,
    predictions: Vec<f64>,
}

pub fn handle(
    action: PredictorCommands,
    config: &TeConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match action {
        PredictorCommands::Train {
            input,
            samples,
            epochs,
            train_ratio,
            output,
        } => {
            let series: Vec<f64> = match &input {
                Some(path) => read_json(path)?,
                None => {
                    let mut rng = match config.predictor.seed {
                        Some(seed) => StdRng::seed_from_u64(seed),
                        None => StdRng::from_entropy(),
                    };
                    generate_sample_traffic(samples, &mut rng)?
                }
            };
            let (train, validation) = split_train_test(&series, train_ratio)?;

            let mut predictor = SequencePredictor::new(config.predictor.clone())?;
            let needed = config.predictor.sequence_length + 1;
            let validation_series = (validation.len() >= needed).then_some(validation);
            let report = predictor.train(train, validation_series, epochs)?;

            let length = config.predictor.sequence_length;
            let sample_prediction = match validation_series {
                Some(values) => {
                    let predicted = predictor.predict(&values[..length])?;
                    let actual = values[length];
                    Some(SamplePrediction {
                        predicted,
                        actual,
                        abs_error: (predicted - actual).abs(),
                    })
                }
                None => None,
            };

            ensure_parent(&output)?;
            predictor.save(&output)?;

            format.print(&PredictorOutcome {
                report,
                train_samples: train.len(),
                validation_samples: validation.len(),
                normalization: predictor.normalization().map(|r| (r.min, r.max)),
                sample_prediction,
                checkpoint: output.display().to_string(),
            })?;
        }
        PredictorCommands::Forecast {
            checkpoint,
            steps,
            window,
        } => {
            let predictor = load_predictor(&checkpoint, config)?;
            let predictions = predictor.predict_future(&window, steps)?;
            format.print(&Forecast {
                window,
                predictions,
            })?;
        }
    }
    Ok(())
}

pub fn detect(
    checkpoint: &Path,
    threshold: f64,
    window: &[f64],
    config: &TeConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let predictor = load_predictor(checkpoint, config)?;
    let report = predictor.detect_congestion(window, threshold)?;

    if format.is_table() {
        let verdict = if report.congestion_detected {
            "CONGESTION PREDICTED".red().bold()
        } else {
            "no congestion".green()
        };
        println!(
            "{verdict}  current {:.1}%  peak forecast {:.1}%  threshold {threshold:.1}%",
            report.current_utilization, report.max_predicted_utilization
        );
    }
    format.print(&report)
}

fn load_predictor(path: &Path, config: &TeConfig) -> anyhow::Result<SequencePredictor> {
    SequencePredictor::from_checkpoint(config.predictor.clone(), path)
        .with_context(|| format!("loading {}", path.display()))
}
