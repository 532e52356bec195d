//! Headless batch execution.
//!
//! Resolves every requested task before running anything, executes them
//! through the engine honoring per-task async flags, awaits all completion
//! handles, and serializes the report map for downstream consumers.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use taskmill_core::{PhaseResult, Report};
use taskmill_engine::{ExecOptions, ExecutionEngine, MillContext};

use crate::cli::Invocation;
use crate::error::BatchError;

/// Aggregated outcome of one batch run.
#[derive(Debug)]
pub struct BatchSummary {
    pub reports: BTreeMap<String, Report>,
    pub succeeded: bool,
}

impl BatchSummary {
    /// Process exit code: 0 when every task succeeded, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.succeeded {
            0
        } else {
            1
        }
    }
}

/// Run all invocations and collect their reports.
///
/// Any unresolved task ID aborts the whole batch before anything executes.
/// Unlike the interactive submission path there is no sync-forcing merge
/// rule here; each task's explicit flag is trusted.
pub async fn run_batch(
    ctx: &Arc<MillContext>,
    invocations: Vec<Invocation>,
    results_path: Option<&Path>,
) -> Result<BatchSummary, BatchError> {
    for invocation in &invocations {
        if ctx.registry.resolve(&invocation.worker_id).is_none() {
            return Err(BatchError::UnknownTask(invocation.worker_id.clone()));
        }
    }

    let engine = ExecutionEngine::new(Arc::clone(ctx));
    let mut executions = Vec::with_capacity(invocations.len());
    for invocation in invocations {
        let execution = engine
            .execute(
                &invocation.worker_id,
                invocation.args,
                ExecOptions {
                    run_async: invocation.run_async,
                    batch_mode: true,
                },
            )
            .await?;
        executions.push(execution);
    }

    let mut reports = BTreeMap::new();
    let mut succeeded = true;
    for execution in executions {
        let worker_id = execution.worker_id().to_string();
        let report = execution.wait().await;
        if report.result() != PhaseResult::Succeeded {
            succeeded = false;
        }
        reports.insert(worker_id, report);
    }

    match results_path {
        Some(path) => {
            let content = serde_json::to_string_pretty(&reports)?;
            std::fs::write(path, content)?;
            info!(path = %path.display(), tasks = reports.len(), "Batch results written");
        }
        None => {
            warn!("No results path given; batch reports are not persisted");
        }
    }

    Ok(BatchSummary { reports, succeeded })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use taskmill_core::{MillConfig, Platform};
    use taskmill_engine::{
        EngineError, MemoryStore, TaskDecl, Worker, WorkerFactory,
    };

    struct StubWorker {
        fail: bool,
    }

    #[async_trait]
    impl Worker for StubWorker {
        fn bind_param(&mut self, _name: &str, _value: &str) -> Result<(), EngineError> {
            Ok(())
        }

        async fn process(&mut self, report: &mut Report) -> Result<(), EngineError> {
            report.set_extra("ran", serde_json::json!(true));
            if self.fail {
                Err(EngineError::Process("stub failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn context_with(tasks: &[(&str, bool)]) -> Arc<MillContext> {
        let ctx = MillContext::for_platform(
            MillConfig::default(),
            Arc::new(MemoryStore::new()),
            Platform::Linux,
        );
        for (name, fail) in tasks {
            let fail = *fail;
            let factory: WorkerFactory = Arc::new(move |_meta| Box::new(StubWorker { fail }));
            ctx.registry
                .declare(TaskDecl::new(*name).group("Batch").run_async(false), factory);
        }
        ctx
    }

    fn invocation(worker_id: &str) -> Invocation {
        Invocation {
            worker_id: worker_id.to_string(),
            args: BTreeMap::new(),
            run_async: None,
        }
    }

    #[tokio::test]
    async fn test_batch_all_succeed_exit_zero() {
        let ctx = context_with(&[("one", false), ("two", false)]);
        let summary = run_batch(
            &ctx,
            vec![invocation("Batch/one"), invocation("Batch/two")],
            None,
        )
        .await
        .unwrap();
        assert!(summary.succeeded);
        assert_eq!(summary.exit_code(), 0);
        assert_eq!(summary.reports.len(), 2);
        assert_eq!(
            summary.reports["Batch/one"].result(),
            PhaseResult::Succeeded
        );
    }

    #[tokio::test]
    async fn test_batch_one_failure_exit_one() {
        let ctx = context_with(&[("ok", false), ("bad", true)]);
        let summary = run_batch(
            &ctx,
            vec![invocation("Batch/ok"), invocation("Batch/bad")],
            None,
        )
        .await
        .unwrap();
        assert!(!summary.succeeded);
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(summary.reports["Batch/bad"].result(), PhaseResult::Failed);
        // The failing task still ran its full pipeline.
        assert_eq!(summary.reports["Batch/ok"].result(), PhaseResult::Succeeded);
    }

    #[tokio::test]
    async fn test_unresolved_id_aborts_whole_batch() {
        let ctx = context_with(&[("ok", false)]);
        let err = run_batch(
            &ctx,
            vec![invocation("Batch/ok"), invocation("Batch/missing")],
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BatchError::UnknownTask(_)));
    }

    #[tokio::test]
    async fn test_results_file_holds_report_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        let ctx = context_with(&[("one", false)]);
        run_batch(&ctx, vec![invocation("Batch/one")], Some(&path))
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let map: BTreeMap<String, Report> = serde_json::from_str(&content).unwrap();
        assert_eq!(map.len(), 1);
        let report = &map["Batch/one"];
        assert_eq!(report.result(), PhaseResult::Succeeded);
        assert_eq!(report.extras["ran"], serde_json::json!(true));
        assert!(!report.phases.is_empty());
    }

    #[tokio::test]
    async fn test_async_flag_is_honored_per_task() {
        let ctx = context_with(&[("one", false)]);
        let mut inv = invocation("Batch/one");
        inv.run_async = Some(true);

        let summary = run_batch(&ctx, vec![inv], None).await.unwrap();
        let report = &summary.reports["Batch/one"];
        assert_eq!(report.extras["run_async"], serde_json::json!(true));
        assert_eq!(report.result(), PhaseResult::Succeeded);
    }
}
