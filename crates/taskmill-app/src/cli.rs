//! CLI argument definitions and task-invocation parsing.
//!
//! Uses `clap` with derive macros for the outer surface; the trailing
//! task-invocation grammar (repeatable `--task` blocks with overrides) is
//! parsed by hand because its keys are arbitrary.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;

use crate::error::BatchError;

/// Taskmill — embedded task orchestration with a headless batch mode.
#[derive(Parser, Debug)]
#[command(name = "taskmill", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Path to the JSON task manifest (overrides the config file).
    #[arg(long = "manifest")]
    pub manifest: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Run the requested tasks without the interactive host, then exit.
    #[arg(long = "headless")]
    pub headless: bool,

    /// File receiving the worker-ID -> report map as JSON.
    #[arg(long = "results")]
    pub results: Option<PathBuf>,

    /// Task invocations: `--task Group/Name [--async] [--key=value ...]`,
    /// repeatable.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub invocations: Vec<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > TASKMILL_CONFIG env var > ./taskmill.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("TASKMILL_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("taskmill.toml")
    }

    /// Resolve the log level. Priority: --log-level flag > "info".
    pub fn resolve_log_level(&self) -> String {
        self.log_level.clone().unwrap_or_else(|| "info".to_string())
    }
}

/// One requested task run from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub worker_id: String,
    pub args: BTreeMap<String, String>,
    /// `Some(true)` when `--async` followed this task's flag; `None` keeps
    /// the task's declared run mode.
    pub run_async: Option<bool>,
}

impl Invocation {
    fn new(worker_id: String) -> Self {
        Self {
            worker_id,
            args: BTreeMap::new(),
            run_async: None,
        }
    }
}

/// Parse the trailing tokens into task-invocation blocks.
///
/// `--task <Group/Name>` opens a block; every following `--key=value` or
/// `--key value` pair belongs to it until the next `--task`. `--async`
/// marks the block's task async for this run.
pub fn parse_invocations(tokens: &[String]) -> Result<Vec<Invocation>, BatchError> {
    let mut invocations: Vec<Invocation> = Vec::new();
    let mut iter = tokens.iter();

    while let Some(token) = iter.next() {
        match token.as_str() {
            "--task" => {
                let id = iter
                    .next()
                    .ok_or_else(|| BatchError::MissingValue("--task".to_string()))?;
                invocations.push(Invocation::new(id.clone()));
            }
            "--async" => {
                let current = invocations
                    .last_mut()
                    .ok_or_else(|| BatchError::OverrideWithoutTask("--async".to_string()))?;
                current.run_async = Some(true);
            }
            flag if flag.starts_with("--") => {
                let (key, value) = match flag.split_once('=') {
                    Some((key, value)) => (key.to_string(), value.to_string()),
                    None => {
                        let value = iter
                            .next()
                            .filter(|v| v.as_str() != "--task" && v.as_str() != "--async")
                            .ok_or_else(|| BatchError::MissingValue(flag.to_string()))?;
                        (flag.to_string(), value.clone())
                    }
                };
                let key = key.trim_start_matches('-').to_string();
                if key.is_empty() {
                    return Err(BatchError::UnexpectedToken(flag.to_string()));
                }
                let current = invocations
                    .last_mut()
                    .ok_or_else(|| BatchError::OverrideWithoutTask(flag.to_string()))?;
                current.args.insert(key, value);
            }
            other => {
                return Err(BatchError::UnexpectedToken(other.to_string()));
            }
        }
    }

    Ok(invocations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_task_no_overrides() {
        let parsed = parse_invocations(&tokens(&["--task", "Build/build"])).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].worker_id, "Build/build");
        assert!(parsed[0].args.is_empty());
        assert_eq!(parsed[0].run_async, None);
    }

    #[test]
    fn test_key_value_equals_form() {
        let parsed =
            parse_invocations(&tokens(&["--task", "Build/build", "--env=prod"])).unwrap();
        assert_eq!(parsed[0].args["env"], "prod");
    }

    #[test]
    fn test_key_value_space_form() {
        let parsed =
            parse_invocations(&tokens(&["--task", "Build/build", "--env", "prod"])).unwrap();
        assert_eq!(parsed[0].args["env"], "prod");
    }

    #[test]
    fn test_overrides_attach_to_most_recent_task() {
        let parsed = parse_invocations(&tokens(&[
            "--task",
            "Build/build",
            "--env=dev",
            "--task",
            "Deploy/upload",
            "--bucket=staging",
        ]))
        .unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].args["env"], "dev");
        assert!(!parsed[0].args.contains_key("bucket"));
        assert_eq!(parsed[1].args["bucket"], "staging");
    }

    #[test]
    fn test_async_flag_applies_to_preceding_task() {
        let parsed = parse_invocations(&tokens(&[
            "--task",
            "Build/build",
            "--task",
            "Deploy/upload",
            "--async",
        ]))
        .unwrap();
        assert_eq!(parsed[0].run_async, None);
        assert_eq!(parsed[1].run_async, Some(true));
    }

    #[test]
    fn test_override_before_any_task_errors() {
        let err = parse_invocations(&tokens(&["--env=prod"])).unwrap_err();
        assert!(matches!(err, BatchError::OverrideWithoutTask(_)));

        let err = parse_invocations(&tokens(&["--async"])).unwrap_err();
        assert!(matches!(err, BatchError::OverrideWithoutTask(_)));
    }

    #[test]
    fn test_task_flag_without_value_errors() {
        let err = parse_invocations(&tokens(&["--task"])).unwrap_err();
        assert!(matches!(err, BatchError::MissingValue(_)));
    }

    #[test]
    fn test_key_without_value_errors() {
        let err =
            parse_invocations(&tokens(&["--task", "Build/build", "--env"])).unwrap_err();
        assert!(matches!(err, BatchError::MissingValue(_)));
    }

    #[test]
    fn test_bare_token_errors() {
        let err = parse_invocations(&tokens(&["Build/build"])).unwrap_err();
        assert!(matches!(err, BatchError::UnexpectedToken(_)));
    }

    #[test]
    fn test_empty_tokens_no_invocations() {
        assert!(parse_invocations(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_clap_surface_with_trailing_invocations() {
        let args = CliArgs::try_parse_from([
            "taskmill",
            "--headless",
            "--results",
            "out.json",
            "--task",
            "Build/build",
            "--env=prod",
        ])
        .unwrap();
        assert!(args.headless);
        assert_eq!(args.results.as_deref(), Some(std::path::Path::new("out.json")));
        let parsed = parse_invocations(&args.invocations).unwrap();
        assert_eq!(parsed[0].worker_id, "Build/build");
        assert_eq!(parsed[0].args["env"], "prod");
    }

    #[test]
    fn test_resolve_log_level_default() {
        let args = CliArgs::try_parse_from(["taskmill"]).unwrap();
        assert_eq!(args.resolve_log_level(), "info");
        let args = CliArgs::try_parse_from(["taskmill", "-l", "debug"]).unwrap();
        assert_eq!(args.resolve_log_level(), "debug");
    }
}
