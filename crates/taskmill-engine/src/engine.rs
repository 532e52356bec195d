//! The task execution engine.
//!
//! Runs one worker through the fixed phase sequence:
//! Prepare -> Preprocess -> pre-hooks -> Process -> post-hooks -> Postprocess.
//! Phase errors are folded into the report; only the singleton-exclusivity
//! violation and an unknown worker ID surface as synchronous errors.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, warn};

use taskmill_core::{
    InterfaceKey, NotifyArgs, Phase, PhaseResult, ProgressClear, Report, TaskFinished,
    TaskStarted,
};

use crate::context::MillContext;
use crate::error::EngineError;
use crate::meta::TaskMeta;
use crate::worker::Worker;

/// Per-call execution options.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Override the task's declared run mode for this call.
    pub run_async: Option<bool>,
    /// Suppress the host progress-indicator clear on completion.
    pub batch_mode: bool,
}

/// One task invocation in a grouped submission.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub worker_id: String,
    pub args: BTreeMap<String, String>,
    pub run_async: Option<bool>,
}

impl ExecRequest {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            args: BTreeMap::new(),
            run_async: None,
        }
    }
}

#[derive(Debug)]
enum ExecHandle {
    Finished(Box<Report>),
    Pending(tokio::task::JoinHandle<Report>),
}

/// Uniform completion handle returned by `execute`, regardless of whether
/// the run happened inline or on a background task.
#[derive(Debug)]
pub struct Execution {
    worker_id: String,
    handle: ExecHandle,
}

impl Execution {
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn is_finished(&self) -> bool {
        match &self.handle {
            ExecHandle::Finished(_) => true,
            ExecHandle::Pending(handle) => handle.is_finished(),
        }
    }

    /// Await the final report.
    pub async fn wait(self) -> Report {
        match self.handle {
            ExecHandle::Finished(report) => *report,
            ExecHandle::Pending(handle) => match handle.await {
                Ok(report) => report,
                Err(e) => {
                    // Background task aborted or panicked; synthesize a
                    // failed report so callers still get phase records.
                    let mut report = Report::new(self.worker_id.clone());
                    let mut phase = Phase::new("Background");
                    phase.fail(format!("background execution aborted: {}", e));
                    report.push_phase(phase);
                    report
                }
            },
        }
    }
}

/// Releases singleton in-flight membership when the execution ends,
/// on every path including panics in the background task.
struct SingletonClaim {
    ctx: Arc<MillContext>,
    worker_id: String,
}

impl Drop for SingletonClaim {
    fn drop(&mut self) {
        self.ctx.release(&self.worker_id);
    }
}

pub struct ExecutionEngine {
    ctx: Arc<MillContext>,
}

impl ExecutionEngine {
    pub fn new(ctx: Arc<MillContext>) -> Self {
        Self { ctx }
    }

    /// Execute one task.
    ///
    /// Prepare always runs inline before this returns, so parameter binding
    /// is deterministic even for async tasks; the remaining phases run on a
    /// background task when the effective mode is async. The returned
    /// `Execution` is complete already for sync runs.
    pub async fn execute(
        &self,
        worker_id: &str,
        args: BTreeMap<String, String>,
        opts: ExecOptions,
    ) -> Result<Execution, EngineError> {
        let entry = self
            .ctx
            .registry
            .resolve(worker_id)
            .ok_or_else(|| EngineError::UnknownTask(worker_id.to_string()))?;
        let meta = entry.meta.clone();
        let wid = meta.worker_id();

        let claim = if meta.singleton {
            if !self.ctx.try_claim(&wid) {
                return Err(EngineError::ExclusiveTaskRunning(wid));
            }
            Some(SingletonClaim {
                ctx: Arc::clone(&self.ctx),
                worker_id: wid.clone(),
            })
        } else {
            None
        };

        let run_async = opts.run_async.unwrap_or(meta.run_async);

        self.ctx
            .bus
            .notify::<TaskStarted>(NotifyArgs::new().with(&wid))
            .await;

        let mut report = Report::new(wid.clone());
        report.set_extra("run_async", serde_json::json!(run_async));
        report.arguments.extend(args.clone());

        let mut worker = Arc::clone(&entry.worker).lock_owned().await;
        let prepare_ok = prepare(&self.ctx, &meta, &args, worker.as_mut(), &mut report);

        if !prepare_ok {
            drop(worker);
            let report = finish(&self.ctx, report, opts.batch_mode).await;
            drop(claim);
            return Ok(Execution {
                worker_id: wid,
                handle: ExecHandle::Finished(Box::new(report)),
            });
        }

        let ctx = Arc::clone(&self.ctx);
        let batch_mode = opts.batch_mode;
        if run_async {
            let handle = tokio::spawn(async move {
                let report = run_pipeline(&ctx, &meta, worker, report).await;
                let report = finish(&ctx, report, batch_mode).await;
                drop(claim);
                report
            });
            Ok(Execution {
                worker_id: wid,
                handle: ExecHandle::Pending(handle),
            })
        } else {
            let report = run_pipeline(&ctx, &meta, worker, report).await;
            let report = finish(&ctx, report, batch_mode).await;
            drop(claim);
            Ok(Execution {
                worker_id: wid,
                handle: ExecHandle::Finished(Box::new(report)),
            })
        }
    }

    /// Execute a grouped submission with the presentation-layer merge rule:
    /// if any task in the group is sync, every task runs sync, so a
    /// background run can never interleave with a main-context one.
    ///
    /// Every ID must resolve before anything runs.
    pub async fn execute_merged(
        &self,
        requests: Vec<ExecRequest>,
    ) -> Result<Vec<Execution>, EngineError> {
        let mut resolved = Vec::with_capacity(requests.len());
        for request in requests {
            let entry = self
                .ctx
                .registry
                .resolve(&request.worker_id)
                .ok_or_else(|| EngineError::UnknownTask(request.worker_id.clone()))?;
            let mode = request.run_async.unwrap_or(entry.meta.run_async);
            resolved.push((request, mode));
        }

        let force_sync = resolved.iter().any(|(_, mode)| !mode);
        let mut executions = Vec::with_capacity(resolved.len());
        for (request, mode) in resolved {
            let effective = if force_sync { false } else { mode };
            let execution = self
                .execute(
                    &request.worker_id,
                    request.args,
                    ExecOptions {
                        run_async: Some(effective),
                        batch_mode: false,
                    },
                )
                .await?;
            executions.push(execution);
        }
        Ok(executions)
    }
}

/// Bind declared parameters into the worker: explicit argument, then the
/// persisted value (when the param persists), then the declared default.
/// Any binding failure fails the Prepare phase and nothing later runs.
fn prepare(
    ctx: &MillContext,
    meta: &TaskMeta,
    args: &BTreeMap<String, String>,
    worker: &mut dyn Worker,
    report: &mut Report,
) -> bool {
    let start = Instant::now();
    let mut phase = Phase::new("Prepare");

    for param in &meta.params {
        let storage_id = param.storage_id(ctx.platform, &report.worker_id);
        let value = args
            .get(&param.name)
            .cloned()
            .or_else(|| {
                if param.persist {
                    ctx.store.get(&storage_id)
                } else {
                    None
                }
            })
            .unwrap_or_else(|| param.default.clone());

        report.arguments.insert(param.name.clone(), value.clone());
        if let Err(e) = worker.bind_param(&param.name, &value) {
            phase.fail(e.to_string());
            break;
        }
    }

    phase.elapsed_secs = start.elapsed().as_secs_f64();
    let ok = phase.error.is_none();
    report.push_phase(phase);
    ok
}

fn hook_args(report: &Report) -> NotifyArgs {
    NotifyArgs::new()
        .with(&report.worker_id)
        .with(&report.arguments)
}

/// Deduplicate hook references, preserving declared order.
fn dedup_hooks(keys: &[InterfaceKey], worker_id: &str) -> Vec<InterfaceKey> {
    let mut seen = HashSet::new();
    let mut result = Vec::with_capacity(keys.len());
    for key in keys {
        if seen.insert(*key) {
            result.push(*key);
        } else {
            warn!(worker_id = %worker_id, hook = key.name, "Duplicate handler reference ignored");
        }
    }
    result
}

/// Phases 3-7: Preprocess, pre-hooks, Process, post-hooks, Postprocess.
///
/// The first failing pre-hook skips the remaining pre-hooks and Process.
/// Post-hooks are all attempted independently and Postprocess always runs
/// last, so cleanup happens even when the main work was skipped.
async fn run_pipeline(
    ctx: &MillContext,
    meta: &TaskMeta,
    mut worker: OwnedMutexGuard<Box<dyn Worker>>,
    mut report: Report,
) -> Report {
    let wid = report.worker_id.clone();

    let start = Instant::now();
    let mut phase = Phase::new("Preprocess");
    if let Err(e) = worker.preprocess(&mut report).await {
        phase.fail(e.to_string());
    }
    phase.elapsed_secs = start.elapsed().as_secs_f64();
    let preprocess_ok = phase.error.is_none();
    report.push_phase(phase);

    let mut process_allowed = preprocess_ok;
    if preprocess_ok {
        for key in dedup_hooks(&meta.pre_hooks, &wid) {
            let start = Instant::now();
            let mut phase = Phase::new(format!("{}/{}", wid, key.name));
            let outcome = ctx.bus.notify_key(key, hook_args(&report)).await;
            if let Some(message) = outcome.error_message() {
                phase.fail(message);
            }
            phase.elapsed_secs = start.elapsed().as_secs_f64();
            let ok = phase.error.is_none();
            report.push_phase(phase);
            if !ok {
                process_allowed = false;
                break;
            }
        }
    }

    if process_allowed {
        let start = Instant::now();
        let mut phase = Phase::new("Process");
        if let Err(e) = worker.process(&mut report).await {
            phase.fail(e.to_string());
        }
        phase.elapsed_secs = start.elapsed().as_secs_f64();
        report.push_phase(phase);
    }

    for key in dedup_hooks(&meta.post_hooks, &wid) {
        let start = Instant::now();
        let mut phase = Phase::new(format!("{}/{}", wid, key.name));
        let outcome = ctx.bus.notify_key(key, hook_args(&report)).await;
        if let Some(message) = outcome.error_message() {
            phase.fail(message);
        }
        phase.elapsed_secs = start.elapsed().as_secs_f64();
        report.push_phase(phase);
    }

    let start = Instant::now();
    let mut phase = Phase::new("Postprocess");
    if let Err(e) = worker.postprocess(&mut report).await {
        phase.fail(e.to_string());
    }
    phase.elapsed_secs = start.elapsed().as_secs_f64();
    report.push_phase(phase);

    report
}

/// Final bookkeeping: per-phase summary log, completion notifications, and
/// the progress-indicator clear outside batch mode.
async fn finish(ctx: &MillContext, report: Report, batch_mode: bool) -> Report {
    let failed = report.result() == PhaseResult::Failed;
    for phase in &report.phases {
        if failed {
            error!(
                worker_id = %report.worker_id,
                phase = %phase.name,
                elapsed_secs = phase.elapsed_secs,
                error = phase.error.as_deref().unwrap_or(""),
                "Phase summary"
            );
        } else {
            debug!(
                worker_id = %report.worker_id,
                phase = %phase.name,
                elapsed_secs = phase.elapsed_secs,
                "Phase summary"
            );
        }
    }

    ctx.bus
        .notify::<TaskFinished>(
            NotifyArgs::new()
                .with(&report.worker_id)
                .with(report.result().to_string()),
        )
        .await;
    if !batch_mode {
        ctx.bus.notify::<ProgressClear>(NotifyArgs::new()).await;
    }
    report
}
