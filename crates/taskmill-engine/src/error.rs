//! Error types for the task engine.

use taskmill_core::CoreError;

/// Errors from registry lookup and task execution.
///
/// Only `ExclusiveTaskRunning` and `UnknownTask` ever escape `execute`;
/// phase-local failures are folded into the Report instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Singleton task already running: {0}")]
    ExclusiveTaskRunning(String),
    #[error("Unknown task: {0}")]
    UnknownTask(String),
    #[error("Failed to bind parameter '{0}': {1}")]
    BindFailed(String, String),
    #[error("Hook dispatch failed: {0}")]
    HookFailed(String),
    #[error("Script execution failed: {0}")]
    Script(String),
    #[error("Task processing failed: {0}")]
    Process(String),
    #[error("Parameter store error: {0}")]
    Store(String),
    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::ExclusiveTaskRunning("Build/compile".to_string());
        assert_eq!(
            err.to_string(),
            "Singleton task already running: Build/compile"
        );

        let err = EngineError::UnknownTask("Nope/missing".to_string());
        assert_eq!(err.to_string(), "Unknown task: Nope/missing");

        let err = EngineError::BindFailed("env".to_string(), "empty value".to_string());
        assert_eq!(
            err.to_string(),
            "Failed to bind parameter 'env': empty value"
        );
    }

    #[test]
    fn test_engine_error_from_core() {
        let core = CoreError::Config("bad".to_string());
        let err: EngineError = core.into();
        assert!(matches!(err, EngineError::Core(_)));
        assert!(err.to_string().contains("bad"));
    }
}
