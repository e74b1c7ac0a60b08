// Error types shared by the simulation core and the command layer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DustError {
    #[error("Invalid parameter `{name}`: {message}")]
    InvalidParameter { name: &'static str, message: String },

    #[error("No simulation results available")]
    EmptyResultSet,

    #[error("Simulation cancelled after {completed}/{requested} particles")]
    Cancelled { completed: usize, requested: usize },

    #[error("Invalid categorical weights: {0}")]
    InvalidWeights(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed result table: {0}")]
    Schema(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DustError {
    pub fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        DustError::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}

pub type DustResult<T> = Result<T, DustError>;
