//! Error types for opente

use thiserror::Error;

/// opente error type
#[derive(Error, Debug)]
pub enum TeError {
    /// Invalid sizes or hyper-parameters
    #[error("config error: {0}")]
    Config(String),

    /// Not enough buffered samples for the requested operation
    #[error("insufficient data: {available} available, {required} required")]
    InsufficientData {
        /// Samples currently held
        available: usize,
        /// Samples needed
        required: usize,
    },

    /// Prediction requested before normalization bounds were fit
    #[error("model has not been trained")]
    UntrainedModel,

    /// Checkpoint schema mismatch or corrupted blob
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Caller-supplied value outside the accepted domain
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Tensor backend error
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for opente
pub type TeResult<T> = Result<T, TeError>;

impl TeError {
    /// Whether the error only signals that more samples are needed
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}
