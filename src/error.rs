use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::RecordFailure;
use crate::llm::client::ModelCallError;

/// Pipeline stage a per-record failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analysis,
    Evaluation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Analysis => write!(f, "analysis"),
            Stage::Evaluation => write!(f, "evaluation"),
        }
    }
}

#[derive(Error, Debug)]
pub enum NimbyError {
    #[error("Data format error: {0}")]
    DataFormat(String),

    #[error("Schema error on field '{field}': expected {expected}, got {got}")]
    Schema {
        field: String,
        expected: String,
        got: String,
    },

    #[error("Model call failed: {0}")]
    ModelCall(#[from] ModelCallError),

    #[error("Cannot aggregate an empty batch")]
    EmptyBatch,

    #[error("{stage} failed for record #{index}: {source}")]
    RecordFailed {
        stage: Stage,
        index: usize,
        #[source]
        source: Box<NimbyError>,
    },

    /// Every record in the batch was skipped, so there is nothing to aggregate.
    #[error(
        "All {} records failed; first was #{index} during {stage}: {message}",
        .failures.len()
    )]
    BatchFailed {
        stage: Stage,
        index: usize,
        message: String,
        failures: Vec<RecordFailure>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl NimbyError {
    pub(crate) fn schema(
        field: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        NimbyError::Schema {
            field: field.into(),
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// True for the failures a batch may skip over: model calls and malformed responses.
    pub fn is_per_record(&self) -> bool {
        matches!(self, NimbyError::ModelCall(_) | NimbyError::Schema { .. })
    }
}

pub type Result<T> = std::result::Result<T, NimbyError>;
