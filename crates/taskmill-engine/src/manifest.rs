//! JSON task manifest parsing.
//!
//! The manifest declares script-backed tasks: a `scripts` map of name to
//! shell command, and a `scriptsMeta` map of per-script metadata. Every
//! field is optional except each parameter's name. Bad entries are logged
//! and skipped; the rest of the file still loads.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::Deserialize;
use tracing::warn;

use taskmill_core::{Platform, Result};

use crate::meta::{Origin, ParamSpec, TaskMeta};

/// One parsed manifest task: catalog metadata plus the shell command the
/// generic script worker will run.
#[derive(Debug, Clone)]
pub struct ManifestTask {
    pub meta: TaskMeta,
    pub command: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawManifest {
    #[serde(default)]
    scripts: BTreeMap<String, String>,
    #[serde(default, rename = "scriptsMeta")]
    scripts_meta: BTreeMap<String, serde_json::Value>,
}

fn default_runasync() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawMeta {
    name: Option<String>,
    group: Option<String>,
    tooltip: String,
    priority: i32,
    singleton: bool,
    #[serde(rename = "runasync")]
    run_async: bool,
    platform: Platform,
    params: Vec<serde_json::Value>,
}

impl Default for RawMeta {
    fn default() -> Self {
        Self {
            name: None,
            group: None,
            tooltip: String::new(),
            priority: 0,
            singleton: false,
            run_async: default_runasync(),
            platform: Platform::Any,
            params: Vec::new(),
        }
    }
}

/// Content fingerprint used to skip reparsing an unchanged manifest.
pub fn fingerprint(content: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

/// Parse manifest JSON into tasks.
///
/// Top-level syntax errors fail the whole load; a malformed entry or
/// parameter only drops that entry with a warning. Scripts without a
/// metadata record get defaulted metadata; metadata without a script
/// command is unusable and skipped.
pub fn parse(content: &str, default_group: &str) -> Result<Vec<ManifestTask>> {
    let raw: RawManifest = serde_json::from_str(content)?;
    let mut tasks = Vec::new();

    for (script_name, command) in &raw.scripts {
        let meta = match raw.scripts_meta.get(script_name) {
            Some(value) => match serde_json::from_value::<RawMeta>(value.clone()) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(script = %script_name, "Skipping bad manifest entry: {}", e);
                    continue;
                }
            },
            None => RawMeta::default(),
        };
        tasks.push(build_task(script_name, command, meta, default_group));
    }

    for script_name in raw.scripts_meta.keys() {
        if !raw.scripts.contains_key(script_name) {
            warn!(
                script = %script_name,
                "Manifest metadata has no matching script command, skipping"
            );
        }
    }

    Ok(tasks)
}

fn build_task(
    script_name: &str,
    command: &str,
    raw: RawMeta,
    default_group: &str,
) -> ManifestTask {
    let mut params = Vec::new();
    for value in raw.params {
        match serde_json::from_value::<ParamSpec>(value) {
            Ok(param) if !param.name.is_empty() => params.push(param),
            Ok(_) => {
                warn!(script = %script_name, "Skipping manifest param with empty name");
            }
            Err(e) => {
                warn!(script = %script_name, "Skipping bad manifest param: {}", e);
            }
        }
    }

    let meta = TaskMeta {
        name: raw.name.unwrap_or_else(|| script_name.to_string()),
        group: raw.group.unwrap_or_else(|| default_group.to_string()),
        tooltip: raw.tooltip,
        priority: raw.priority,
        singleton: raw.singleton,
        run_async: raw.run_async,
        platform: raw.platform,
        params,
        pre_hooks: Vec::new(),
        post_hooks: Vec::new(),
        origin: Origin::Manifest,
    };

    ManifestTask {
        meta,
        command: command.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::DEFAULT_GROUP;

    const FULL: &str = r#"{
        "scripts": { "build": "cargo build --release" },
        "scriptsMeta": {
            "build": {
                "name": "build",
                "group": "Build",
                "tooltip": "Release build",
                "priority": 2,
                "singleton": true,
                "runasync": false,
                "platform": "any",
                "params": [
                    { "name": "env", "default": "dev", "persist": true }
                ]
            }
        }
    }"#;

    #[test]
    fn test_parse_full_entry() {
        let tasks = parse(FULL, DEFAULT_GROUP).unwrap();
        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert_eq!(task.meta.worker_id(), "Build/build");
        assert_eq!(task.meta.priority, 2);
        assert!(task.meta.singleton);
        assert!(!task.meta.run_async);
        assert_eq!(task.command, "cargo build --release");
        assert_eq!(task.meta.params.len(), 1);
        assert_eq!(task.meta.params[0].default, "dev");
        assert!(task.meta.params[0].persist);
        assert_eq!(task.meta.origin, Origin::Manifest);
    }

    #[test]
    fn test_parse_script_without_meta_gets_defaults() {
        let json = r#"{ "scripts": { "lint": "cargo clippy" } }"#;
        let tasks = parse(json, DEFAULT_GROUP).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].meta.worker_id(), "Default/lint");
        assert_eq!(tasks[0].meta.priority, 0);
        assert!(tasks[0].meta.run_async);
        assert!(!tasks[0].meta.singleton);
    }

    #[test]
    fn test_parse_meta_without_script_is_skipped() {
        let json = r#"{
            "scripts": {},
            "scriptsMeta": { "ghost": { "name": "ghost" } }
        }"#;
        let tasks = parse(json, DEFAULT_GROUP).unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_parse_bad_entry_skipped_rest_survive() {
        let json = r#"{
            "scripts": { "good": "true", "bad": "true" },
            "scriptsMeta": {
                "good": { "group": "Ok" },
                "bad": { "priority": "not a number" }
            }
        }"#;
        let tasks = parse(json, DEFAULT_GROUP).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].meta.worker_id(), "Ok/good");
    }

    #[test]
    fn test_parse_param_without_name_skipped() {
        let json = r#"{
            "scripts": { "build": "true" },
            "scriptsMeta": {
                "build": { "params": [ { "default": "x" }, { "name": "env" } ] }
            }
        }"#;
        let tasks = parse(json, DEFAULT_GROUP).unwrap();
        assert_eq!(tasks[0].meta.params.len(), 1);
        assert_eq!(tasks[0].meta.params[0].name, "env");
    }

    #[test]
    fn test_parse_invalid_json_errors() {
        assert!(parse("{ not json", DEFAULT_GROUP).is_err());
    }

    #[test]
    fn test_parse_empty_manifest() {
        let tasks = parse("{}", DEFAULT_GROUP).unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_fingerprint_stable_and_sensitive() {
        assert_eq!(fingerprint(FULL), fingerprint(FULL));
        assert_ne!(fingerprint(FULL), fingerprint("{}"));
    }
}
