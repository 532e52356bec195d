//! Declarative task metadata.
//!
//! A `TaskMeta` describes one catalog identity: name, group, ordering,
//! execution mode, platform affinity, parameters, and hook references.
//! Several identities may share one worker implementation.

use serde::{Deserialize, Serialize};
use taskmill_core::{InterfaceKey, Platform};

/// Group assigned to tasks that declare none.
pub const DEFAULT_GROUP: &str = "Default";

/// Where a catalog entry came from. Manifest entries are replaced wholesale
/// on reload; compiled ones are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Compiled,
    Manifest,
}

/// One declared task parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(default)]
    pub tooltip: String,
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub persist: bool,
    #[serde(default)]
    pub platform: Platform,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tooltip: String::new(),
            default: String::new(),
            persist: false,
            platform: Platform::Any,
        }
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = value.into();
        self
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Deterministic storage key for the persisted value of this parameter.
    pub fn storage_id(&self, platform: Platform, worker_id: &str) -> String {
        format!("{}:{}:{}", platform, worker_id, self.name)
    }
}

/// Full metadata for one catalog identity.
#[derive(Debug, Clone)]
pub struct TaskMeta {
    pub name: String,
    pub group: String,
    pub tooltip: String,
    pub priority: i32,
    pub singleton: bool,
    pub run_async: bool,
    pub platform: Platform,
    pub params: Vec<ParamSpec>,
    pub pre_hooks: Vec<InterfaceKey>,
    pub post_hooks: Vec<InterfaceKey>,
    pub origin: Origin,
}

impl TaskMeta {
    /// The worker ID: globally unique, `Group/Name`.
    pub fn worker_id(&self) -> String {
        format!("{}/{}", self.group, self.name)
    }
}

/// A compiled task declaration, registered at process start.
///
/// Carries the same fields as `TaskMeta` but is built fluently by task
/// authors; the registry turns it into catalog entries.
#[derive(Clone)]
pub struct TaskDecl {
    pub name: String,
    pub group: String,
    pub tooltip: String,
    pub priority: i32,
    pub singleton: bool,
    pub run_async: bool,
    pub platform: Platform,
    pub params: Vec<ParamSpec>,
    pub pre_hooks: Vec<InterfaceKey>,
    pub post_hooks: Vec<InterfaceKey>,
}

impl TaskDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: DEFAULT_GROUP.to_string(),
            tooltip: String::new(),
            priority: 0,
            singleton: false,
            run_async: true,
            platform: Platform::Any,
            params: Vec::new(),
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = tooltip.into();
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn singleton(mut self, singleton: bool) -> Self {
        self.singleton = singleton;
        self
    }

    pub fn run_async(mut self, run_async: bool) -> Self {
        self.run_async = run_async;
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn pre_hook(mut self, key: InterfaceKey) -> Self {
        self.pre_hooks.push(key);
        self
    }

    pub fn post_hook(mut self, key: InterfaceKey) -> Self {
        self.post_hooks.push(key);
        self
    }

    pub(crate) fn into_meta(self) -> TaskMeta {
        TaskMeta {
            name: self.name,
            group: self.group,
            tooltip: self.tooltip,
            priority: self.priority,
            singleton: self.singleton,
            run_async: self.run_async,
            platform: self.platform,
            params: self.params,
            pre_hooks: self.pre_hooks,
            post_hooks: self.post_hooks,
            origin: Origin::Compiled,
        }
    }
}
