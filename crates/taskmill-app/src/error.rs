//! Errors for the headless batch path.

use taskmill_engine::EngineError;

/// Errors from invocation parsing and batch orchestration.
///
/// Task-internal failures are not errors here; they live in the reports
/// and only influence the exit code.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Unexpected argument: {0}")]
    UnexpectedToken(String),
    #[error("Parameter override '{0}' appears before any --task")]
    OverrideWithoutTask(String),
    #[error("Flag '{0}' is missing a value")]
    MissingValue(String),
    #[error("Unknown task: {0}")]
    UnknownTask(String),
    #[error("Failed to write results file: {0}")]
    Results(#[from] std::io::Error),
    #[error("Failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Orchestration error: {0}")]
    Engine(#[from] EngineError),
}
