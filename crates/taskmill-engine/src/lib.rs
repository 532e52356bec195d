//! Task engine for Taskmill.
//!
//! Builds the task catalog from compiled declarations and the JSON
//! manifest, and runs workers through the fixed multi-phase lifecycle with
//! singleton exclusivity, hook dispatch, and per-phase error capture.

pub mod context;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod meta;
pub mod registry;
pub mod store;
pub mod worker;

pub use context::MillContext;
pub use engine::{ExecOptions, ExecRequest, Execution, ExecutionEngine};
pub use error::EngineError;
pub use manifest::ManifestTask;
pub use meta::{Origin, ParamSpec, TaskDecl, TaskMeta, DEFAULT_GROUP};
pub use registry::{CatalogEntry, TaskRegistry};
pub use store::{JsonFileStore, MemoryStore, ParamStore};
pub use worker::{ScriptWorker, SharedWorker, Worker, WorkerFactory};
