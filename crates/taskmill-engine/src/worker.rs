//! Worker trait and the generic script-invocation worker.
//!
//! A worker is the mutable implementation behind one catalog entry. The
//! engine drives it through preprocess/process/postprocess and binds
//! declared parameters into it during the Prepare phase.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use taskmill_core::Report;

use crate::error::EngineError;
use crate::meta::TaskMeta;

/// One task implementation instance, bound 1:1 to a catalog entry.
///
/// `preprocess` and `postprocess` default to no-ops; `process` is the main
/// work. All three receive the in-progress report and may stash output in
/// its extras. Errors are captured into the current phase by the engine,
/// never propagated out of an execution.
#[async_trait]
pub trait Worker: Send {
    /// Bind one resolved parameter value. Called during Prepare; a failure
    /// aborts the execution before any lifecycle phase runs.
    fn bind_param(&mut self, name: &str, value: &str) -> Result<(), EngineError>;

    async fn preprocess(&mut self, report: &mut Report) -> Result<(), EngineError> {
        let _ = report;
        Ok(())
    }

    async fn process(&mut self, report: &mut Report) -> Result<(), EngineError>;

    async fn postprocess(&mut self, report: &mut Report) -> Result<(), EngineError> {
        let _ = report;
        Ok(())
    }
}

/// A worker behind the lock that serializes executions against it.
pub type SharedWorker = Arc<tokio::sync::Mutex<Box<dyn Worker>>>;

/// Builds a worker for one declared identity. One factory may serve several
/// identities; it is called once per catalog entry.
pub type WorkerFactory = Arc<dyn Fn(&TaskMeta) -> Box<dyn Worker> + Send + Sync>;

/// Longest stdout tail kept in the report extras.
const MAX_OUTPUT_CHARS: usize = 2_000;

/// Generic worker for manifest-declared script tasks.
///
/// Bound parameters are exported as `TASKMILL_PARAM_<NAME>` environment
/// variables; the command runs through the platform shell. Exit status and
/// a stdout tail land in the report extras.
pub struct ScriptWorker {
    worker_id: String,
    command: String,
    params: BTreeMap<String, String>,
}

impl ScriptWorker {
    pub fn new(worker_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            command: command.into(),
            params: BTreeMap::new(),
        }
    }

    fn shell_command(&self) -> tokio::process::Command {
        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = tokio::process::Command::new("cmd");
            c.arg("/C").arg(&self.command);
            c
        } else {
            let mut c = tokio::process::Command::new("sh");
            c.arg("-c").arg(&self.command);
            c
        };
        for (name, value) in &self.params {
            cmd.env(format!("TASKMILL_PARAM_{}", name.to_uppercase()), value);
        }
        cmd
    }
}

#[async_trait]
impl Worker for ScriptWorker {
    fn bind_param(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        if name.is_empty() {
            return Err(EngineError::BindFailed(
                name.to_string(),
                "parameter name must not be empty".to_string(),
            ));
        }
        self.params.insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn process(&mut self, report: &mut Report) -> Result<(), EngineError> {
        info!(worker_id = %self.worker_id, command = %self.command, "Running script task");

        let output = self
            .shell_command()
            .output()
            .await
            .map_err(|e| EngineError::Script(format!("failed to spawn: {}", e)))?;

        let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.chars().count() > MAX_OUTPUT_CHARS {
            stdout = stdout.chars().take(MAX_OUTPUT_CHARS).collect();
        }
        report.set_extra("exit_code", serde_json::json!(output.status.code()));
        report.set_extra("stdout", serde_json::json!(stdout));

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(EngineError::Script(format!(
                "exit status {:?}: {}",
                output.status.code(),
                stderr.trim()
            )))
        }
    }
}
