//! Process-wide engine context.
//!
//! One explicitly constructed object owns the callback bus, the task
//! registry, the parameter store, and the singleton in-flight set. It is
//! passed to the execution engine and the batch runner rather than living
//! in ambient statics, which keeps isolated tests trivial.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use taskmill_core::{
    CallbackBus, HostInit, HostLoad, HostQuit, MillConfig, NotifyArgs, Platform,
};

use crate::registry::TaskRegistry;
use crate::store::ParamStore;

pub struct MillContext {
    pub config: MillConfig,
    pub platform: Platform,
    pub bus: Arc<CallbackBus>,
    pub registry: Arc<TaskRegistry>,
    pub store: Arc<dyn ParamStore>,
    inflight: Mutex<HashSet<String>>,
}

impl MillContext {
    /// Build a context for the current platform.
    pub fn new(config: MillConfig, store: Arc<dyn ParamStore>) -> Arc<Self> {
        Self::for_platform(config, store, Platform::current())
    }

    /// Build a context pinned to an explicit platform.
    pub fn for_platform(
        config: MillConfig,
        store: Arc<dyn ParamStore>,
        platform: Platform,
    ) -> Arc<Self> {
        let bus = Arc::new(CallbackBus::new());
        let registry = Arc::new(TaskRegistry::new(
            platform,
            config.engine.default_group.clone(),
            Arc::clone(&bus),
        ));
        Arc::new(Self {
            config,
            platform,
            bus,
            registry,
            store,
            inflight: Mutex::new(HashSet::new()),
        })
    }

    /// Fire the host startup notifications, in order.
    pub async fn init(&self) {
        self.bus.notify::<HostInit>(NotifyArgs::new()).await;
        self.bus.notify::<HostLoad>(NotifyArgs::new()).await;
    }

    /// Stop the manifest watcher and fire the shutdown notification.
    pub async fn shutdown(&self) {
        self.registry.stop_watching();
        self.bus.notify::<HostQuit>(NotifyArgs::new()).await;
    }

    /// Atomically claim singleton membership for a worker ID.
    ///
    /// Returns false when the worker is already in flight.
    pub(crate) fn try_claim(&self, worker_id: &str) -> bool {
        match self.inflight.lock() {
            Ok(mut set) => set.insert(worker_id.to_string()),
            Err(_) => false,
        }
    }

    /// Release singleton membership.
    pub(crate) fn release(&self, worker_id: &str) {
        if let Ok(mut set) = self.inflight.lock() {
            set.remove(worker_id);
        }
    }

    /// Whether a singleton worker currently has an execution in flight.
    pub fn in_flight(&self, worker_id: &str) -> bool {
        self.inflight
            .lock()
            .map(|set| set.contains(worker_id))
            .unwrap_or(false)
    }
}
