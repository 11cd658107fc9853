use thiserror::Error;
use serde_json::Error as JsonError;
use std::io::Error as IoError;
use toml::de::Error as TomlError;
use prometheus::Error as PrometheusError;

use crate::pipeline::stage::{StageKind, StageStatus};

#[derive(Error, Debug)]
pub enum RagCostError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Stage {stage} failed: {message}")]
    StageFailed { stage: StageKind, message: String },

    #[error("Invalid transition for stage {stage}: {from} -> {to}")]
    InvalidTransition {
        stage: StageKind,
        from: StageStatus,
        to: StageStatus,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] TomlError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] JsonError),

    #[error("IO error: {0}")]
    Io(#[from] IoError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] PrometheusError),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl RagCostError {
    /// Errors that reject a request before any session state is touched.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            RagCostError::UnknownModel(_) | RagCostError::InvalidArgument(_)
        )
    }
}

impl From<anyhow::Error> for RagCostError {
    fn from(err: anyhow::Error) -> Self {
        RagCostError::Unknown(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RagCostError>;
