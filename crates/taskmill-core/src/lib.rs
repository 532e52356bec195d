//! Core types for the Taskmill task-orchestration engine.
//!
//! Defines the notification/callback bus, the phase/report execution record,
//! platform affinity, and workspace-wide configuration and errors.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::MillConfig;
pub use error::{CallbackError, CoreError, Result};
pub use events::{
    Callback, CallbackBus, CallbackFactory, CatalogReloaded, HostInit, HostLoad, HostQuit,
    HostUpdate, InterfaceKey, Notification, NotifyArgs, NotifyOutcome, ProgressClear,
    TaskFinished, TaskStarted,
};
pub use types::{Phase, PhaseResult, Platform, Report};
