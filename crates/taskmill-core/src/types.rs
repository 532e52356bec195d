//! Shared execution types: platforms, phases, and reports.
//!
//! A `Report` is the accumulated record of one `Execute` call. It is created
//! when execution starts, appended to phase by phase, and never reused.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform affinity for tasks and parameters.
///
/// `Any` matches every platform; anything else must equal the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Any,
    Windows,
    #[serde(rename = "macos")]
    MacOs,
    Linux,
}

impl Platform {
    /// The platform this process is running on.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Whether an item with this affinity is usable on `current`.
    pub fn accepts(self, current: Platform) -> bool {
        self == Platform::Any || self == current
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Platform::Any => "any",
            Platform::Windows => "windows",
            Platform::MacOs => "macos",
            Platform::Linux => "linux",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one phase (or a whole report).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PhaseResult {
    #[default]
    Unknown,
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for PhaseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhaseResult::Unknown => "unknown",
            PhaseResult::Succeeded => "succeeded",
            PhaseResult::Failed => "failed",
            PhaseResult::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// One named execution step with its own timing, result, and error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    pub result: PhaseResult,
    pub error: Option<String>,
    pub elapsed_secs: f64,
}

impl Phase {
    /// Create a phase with no result yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            result: PhaseResult::Unknown,
            error: None,
            elapsed_secs: 0.0,
        }
    }

    /// Resolve an `Unknown` result from error presence. Explicit results
    /// are left untouched.
    pub fn finalize(&mut self) {
        if self.result == PhaseResult::Unknown {
            self.result = if self.error.is_some() {
                PhaseResult::Failed
            } else {
                PhaseResult::Succeeded
            };
        }
    }

    /// Mark the phase failed with the given message.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.result = PhaseResult::Failed;
    }

    pub fn succeeded(&self) -> bool {
        self.result == PhaseResult::Succeeded
    }
}

/// Accumulated record of all phases for one execution.
///
/// Result, error, and elapsed time are derived from the phases rather than
/// stored, so they can never drift out of sync with them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub run_id: Uuid,
    pub worker_id: String,
    pub started_at: DateTime<Utc>,
    pub phases: Vec<Phase>,
    /// Resolved arguments the run was executed with.
    pub arguments: BTreeMap<String, String>,
    /// Opaque payload for workers and hooks to stash extra output.
    pub extras: serde_json::Value,
}

impl Report {
    /// Create an empty report for the given worker.
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            worker_id: worker_id.into(),
            started_at: Utc::now(),
            phases: Vec::new(),
            arguments: BTreeMap::new(),
            extras: serde_json::Value::Null,
        }
    }

    /// Append a finalized phase.
    pub fn push_phase(&mut self, mut phase: Phase) {
        phase.finalize();
        self.phases.push(phase);
    }

    /// Failed if any phase failed, Succeeded otherwise (Unknown while empty).
    pub fn result(&self) -> PhaseResult {
        if self.phases.is_empty() {
            return PhaseResult::Unknown;
        }
        if self.phases.iter().any(|p| p.result == PhaseResult::Failed) {
            PhaseResult::Failed
        } else {
            PhaseResult::Succeeded
        }
    }

    /// Concatenated messages of all failed phases, or `None` on success.
    pub fn error(&self) -> Option<String> {
        let messages: Vec<&str> = self
            .phases
            .iter()
            .filter(|p| p.result == PhaseResult::Failed)
            .filter_map(|p| p.error.as_deref())
            .collect();
        if messages.is_empty() {
            None
        } else {
            Some(messages.join("; "))
        }
    }

    /// Total elapsed seconds across all phases.
    pub fn elapsed_secs(&self) -> f64 {
        self.phases.iter().map(|p| p.elapsed_secs).sum()
    }

    /// Set a key in `extras`, promoting it to an object if needed.
    pub fn set_extra(&mut self, key: &str, value: serde_json::Value) {
        if !self.extras.is_object() {
            self.extras = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(map) = self.extras.as_object_mut() {
            map.insert(key.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Platform
    // =========================================================================

    #[test]
    fn test_platform_any_accepts_everything() {
        for p in [Platform::Windows, Platform::MacOs, Platform::Linux] {
            assert!(Platform::Any.accepts(p));
        }
    }

    #[test]
    fn test_platform_specific_accepts_only_itself() {
        assert!(Platform::Linux.accepts(Platform::Linux));
        assert!(!Platform::Linux.accepts(Platform::Windows));
        assert!(!Platform::Windows.accepts(Platform::MacOs));
    }

    #[test]
    fn test_platform_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Platform::MacOs).unwrap(), "\"macos\"");
        assert_eq!(serde_json::to_string(&Platform::Any).unwrap(), "\"any\"");
        let p: Platform = serde_json::from_str("\"windows\"").unwrap();
        assert_eq!(p, Platform::Windows);
    }

    #[test]
    fn test_platform_display() {
        assert_eq!(Platform::Linux.to_string(), "linux");
        assert_eq!(Platform::Any.to_string(), "any");
    }

    // =========================================================================
    // Phase
    // =========================================================================

    #[test]
    fn test_phase_finalize_without_error_succeeds() {
        let mut phase = Phase::new("Process");
        phase.finalize();
        assert_eq!(phase.result, PhaseResult::Succeeded);
    }

    #[test]
    fn test_phase_finalize_with_error_fails() {
        let mut phase = Phase::new("Process");
        phase.error = Some("boom".to_string());
        phase.finalize();
        assert_eq!(phase.result, PhaseResult::Failed);
    }

    #[test]
    fn test_phase_finalize_keeps_explicit_result() {
        let mut phase = Phase::new("Process");
        phase.result = PhaseResult::Cancelled;
        phase.finalize();
        assert_eq!(phase.result, PhaseResult::Cancelled);
    }

    #[test]
    fn test_phase_fail_sets_both_fields() {
        let mut phase = Phase::new("Prepare");
        phase.fail("bad value");
        assert_eq!(phase.result, PhaseResult::Failed);
        assert_eq!(phase.error.as_deref(), Some("bad value"));
    }

    // =========================================================================
    // Report
    // =========================================================================

    fn phase_ok(name: &str, secs: f64) -> Phase {
        let mut p = Phase::new(name);
        p.result = PhaseResult::Succeeded;
        p.elapsed_secs = secs;
        p
    }

    fn phase_failed(name: &str, msg: &str) -> Phase {
        let mut p = Phase::new(name);
        p.fail(msg);
        p
    }

    #[test]
    fn test_report_empty_result_unknown() {
        let report = Report::new("Build/compile");
        assert_eq!(report.result(), PhaseResult::Unknown);
        assert!(report.error().is_none());
    }

    #[test]
    fn test_report_all_ok_succeeds() {
        let mut report = Report::new("Build/compile");
        report.push_phase(phase_ok("Prepare", 0.1));
        report.push_phase(phase_ok("Process", 1.5));
        assert_eq!(report.result(), PhaseResult::Succeeded);
        assert!(report.error().is_none());
    }

    #[test]
    fn test_report_one_failed_phase_fails_whole_report() {
        let mut report = Report::new("Build/compile");
        report.push_phase(phase_ok("Prepare", 0.1));
        report.push_phase(phase_failed("Process", "compiler exploded"));
        report.push_phase(phase_ok("Postprocess", 0.2));
        assert_eq!(report.result(), PhaseResult::Failed);
        assert_eq!(report.error().as_deref(), Some("compiler exploded"));
    }

    #[test]
    fn test_report_error_concatenates_failed_messages() {
        let mut report = Report::new("Build/compile");
        report.push_phase(phase_failed("Preprocess", "first"));
        report.push_phase(phase_failed("Postprocess", "second"));
        assert_eq!(report.error().as_deref(), Some("first; second"));
    }

    #[test]
    fn test_report_elapsed_is_sum_of_phases() {
        let mut report = Report::new("Build/compile");
        report.push_phase(phase_ok("Prepare", 0.5));
        report.push_phase(phase_ok("Process", 1.25));
        assert!((report.elapsed_secs() - 1.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_report_push_phase_finalizes_unknown() {
        let mut report = Report::new("Build/compile");
        report.push_phase(Phase::new("Prepare"));
        assert_eq!(report.phases[0].result, PhaseResult::Succeeded);
    }

    #[test]
    fn test_report_set_extra_promotes_to_object() {
        let mut report = Report::new("Build/compile");
        report.set_extra("run_async", serde_json::json!(false));
        assert_eq!(report.extras["run_async"], serde_json::json!(false));
    }

    #[test]
    fn test_report_serializes_round_trip() {
        let mut report = Report::new("Build/compile");
        report.arguments.insert("env".to_string(), "prod".to_string());
        report.push_phase(phase_ok("Prepare", 0.1));
        let json = serde_json::to_string(&report).unwrap();
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back.worker_id, "Build/compile");
        assert_eq!(back.arguments["env"], "prod");
        assert_eq!(back.phases.len(), 1);
    }
}
