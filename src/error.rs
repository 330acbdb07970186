use serde::{Deserialize, Serialize};

use crate::registry::JobStatus;

/// Broad failure class of a [`TtsError`], stable enough to hand to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Input,
    NotFound,
    Engine,
    Consistency,
    Conversion,
    Unavailable,
    Internal,
}

#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    #[error("Invalid input: {0}")]
    Input(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Engine error: {0}")]
    Engine(String),
    #[error("Inconsistent audio: {0}")]
    Consistency(String),
    #[error("Conversion failed: {0}")]
    Conversion(String),
    #[error("Synthesis queue is full ({0} jobs waiting)")]
    QueueFull(usize),
    #[error("Synthesis worker has stopped")]
    WorkerStopped,
    #[error("Task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("Record store error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TtsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TtsError::Input(_) | TtsError::Config(_) => ErrorKind::Input,
            TtsError::NotFound(_) => ErrorKind::NotFound,
            TtsError::Engine(_) => ErrorKind::Engine,
            TtsError::Consistency(_) => ErrorKind::Consistency,
            TtsError::Conversion(_) => ErrorKind::Conversion,
            TtsError::QueueFull(_) | TtsError::WorkerStopped => ErrorKind::Unavailable,
            TtsError::InvalidTransition { .. }
            | TtsError::Io(_)
            | TtsError::Wav(_)
            | TtsError::Json(_) => ErrorKind::Internal,
        }
    }
}

impl From<crate::config::ServiceConfigBuilderError> for TtsError {
    fn from(e: crate::config::ServiceConfigBuilderError) -> Self {
        TtsError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TtsError>;
