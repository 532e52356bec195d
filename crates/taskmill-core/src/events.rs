//! Notification interfaces and the callback bus.
//!
//! A `Notification` is a typed event channel; a `Callback` is a prioritized
//! handler registered under one or more channels. `notify` fans an argument
//! list out to every registered callback in priority order. Task hooks and
//! host lifecycle events share this one dispatch path.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::CallbackError;

/// Marker trait for one event kind. Implementors are empty types; the
/// associated name is used for phase naming and logging.
pub trait Notification: 'static {
    const NAME: &'static str;
}

/// Runtime identity of a notification interface.
///
/// Lets task metadata carry hook references declaratively while dispatch
/// stays keyed on the concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceKey {
    id: TypeId,
    pub name: &'static str,
}

impl InterfaceKey {
    pub fn of<N: Notification>() -> Self {
        Self {
            id: TypeId::of::<N>(),
            name: N::NAME,
        }
    }
}

/// Positional notification arguments.
///
/// Values are carried as JSON so callbacks can decode them into whatever
/// concrete types they expect, defaulting on absence or mismatch.
#[derive(Debug, Clone, Default)]
pub struct NotifyArgs {
    values: Vec<serde_json::Value>,
}

impl NotifyArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one positional argument.
    pub fn with(mut self, value: impl Serialize) -> Self {
        self.values
            .push(serde_json::to_value(value).unwrap_or(serde_json::Value::Null));
        self
    }

    fn slot<T: DeserializeOwned + Default>(&self, index: usize) -> T {
        self.values
            .get(index)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// Unpack the first argument, defaulting when absent.
    pub fn decode1<A>(&self) -> A
    where
        A: DeserializeOwned + Default,
    {
        self.slot(0)
    }

    /// Unpack the first two arguments, defaulting when absent.
    pub fn decode2<A, B>(&self) -> (A, B)
    where
        A: DeserializeOwned + Default,
        B: DeserializeOwned + Default,
    {
        (self.slot(0), self.slot(1))
    }

    /// Unpack the first three arguments, defaulting when absent.
    pub fn decode3<A, B, C>(&self) -> (A, B, C)
    where
        A: DeserializeOwned + Default,
        B: DeserializeOwned + Default,
        C: DeserializeOwned + Default,
    {
        (self.slot(0), self.slot(1), self.slot(2))
    }
}

/// A prioritized handler attached to one or more notification interfaces.
///
/// Lower priority runs first. Singleton vs. transient is decided at
/// registration time, not on the trait.
#[async_trait]
pub trait Callback: Send + Sync {
    fn priority(&self) -> i32 {
        0
    }

    async fn process(&self, args: &NotifyArgs) -> Result<(), CallbackError>;
}

/// Factory for transient callbacks, invoked once per notification.
pub type CallbackFactory =
    Box<dyn Fn() -> Result<Arc<dyn Callback>, CallbackError> + Send + Sync>;

enum Resolver {
    /// One shared instance, reused across notifications.
    Shared(Arc<dyn Callback>),
    /// Instantiated per notification; pruned if it ever fails to resolve.
    Factory(CallbackFactory),
}

struct Registration {
    priority: i32,
    seq: u64,
    resolver: Resolver,
}

/// Outcome of one notify cycle.
///
/// A failing callback never stops the remaining ones; its error is
/// collected here and handling is the caller's responsibility.
#[derive(Debug, Default)]
pub struct NotifyOutcome {
    pub delivered: usize,
    pub errors: Vec<String>,
}

impl NotifyOutcome {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Joined error messages, or `None` when every callback succeeded.
    pub fn error_message(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("; "))
        }
    }
}

/// Priority-ordered publish/subscribe dispatcher.
///
/// Equal priorities are ordered by registration sequence, so dispatch order
/// is fully deterministic rather than an artifact of the sort used.
pub struct CallbackBus {
    index: RwLock<HashMap<InterfaceKey, Vec<Registration>>>,
    seq: AtomicU64,
}

impl CallbackBus {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    fn insert(&self, key: InterfaceKey, priority: i32, resolver: Resolver) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut index = match self.index.write() {
            Ok(guard) => guard,
            Err(e) => {
                warn!(interface = key.name, "Callback index poisoned: {}", e);
                return;
            }
        };
        let entries = index.entry(key).or_default();
        entries.push(Registration {
            priority,
            seq,
            resolver,
        });
        entries.sort_by_key(|r| (r.priority, r.seq));
    }

    /// Register a shared (singleton) callback under interface `N`.
    ///
    /// Priority is read from the instance once, at registration time.
    pub fn register<N: Notification>(&self, callback: Arc<dyn Callback>) {
        let priority = callback.priority();
        self.insert(InterfaceKey::of::<N>(), priority, Resolver::Shared(callback));
    }

    /// Register a transient callback under interface `N`; the factory is
    /// invoked for every notification.
    pub fn register_factory<N: Notification>(&self, priority: i32, factory: CallbackFactory) {
        self.insert(InterfaceKey::of::<N>(), priority, Resolver::Factory(factory));
    }

    /// Number of registrations currently held for `key`.
    pub fn registered(&self, key: InterfaceKey) -> usize {
        self.index
            .read()
            .map(|index| index.get(&key).map_or(0, |v| v.len()))
            .unwrap_or(0)
    }

    /// Dispatch to every callback registered under `N`.
    pub async fn notify<N: Notification>(&self, args: NotifyArgs) -> NotifyOutcome {
        self.notify_key(InterfaceKey::of::<N>(), args).await
    }

    /// Dispatch to every callback registered under a runtime interface key.
    ///
    /// Resolution happens up front under the lock; a factory that fails to
    /// resolve is pruned from the index so it never blocks later cycles.
    pub async fn notify_key(&self, key: InterfaceKey, args: NotifyArgs) -> NotifyOutcome {
        let batch = self.resolve_batch(key);
        let mut outcome = NotifyOutcome::default();
        for callback in batch {
            match callback.process(&args).await {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    outcome.delivered += 1;
                    outcome.errors.push(e.to_string());
                }
            }
        }
        outcome
    }

    fn resolve_batch(&self, key: InterfaceKey) -> Vec<Arc<dyn Callback>> {
        let mut index = match self.index.write() {
            Ok(guard) => guard,
            Err(e) => {
                warn!(interface = key.name, "Callback index poisoned: {}", e);
                return Vec::new();
            }
        };
        let Some(entries) = index.get_mut(&key) else {
            return Vec::new();
        };

        let mut batch = Vec::with_capacity(entries.len());
        let mut pruned = Vec::new();
        for entry in entries.iter() {
            match &entry.resolver {
                Resolver::Shared(instance) => batch.push(Arc::clone(instance)),
                Resolver::Factory(factory) => match factory() {
                    Ok(instance) => batch.push(instance),
                    Err(e) => {
                        warn!(
                            interface = key.name,
                            "Pruning callback that failed to resolve: {}", e
                        );
                        pruned.push(entry.seq);
                    }
                },
            }
        }
        if !pruned.is_empty() {
            entries.retain(|r| !pruned.contains(&r.seq));
        }
        batch
    }
}

impl Default for CallbackBus {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Built-in host lifecycle notifications
// =============================================================================

/// Host process started; fired once before anything else.
pub struct HostInit;
impl Notification for HostInit {
    const NAME: &'static str = "HostInit";
}

/// Catalog and collaborators are loaded and ready.
pub struct HostLoad;
impl Notification for HostLoad {
    const NAME: &'static str = "HostLoad";
}

/// Periodic host tick.
pub struct HostUpdate;
impl Notification for HostUpdate {
    const NAME: &'static str = "HostUpdate";
}

/// Host is shutting down.
pub struct HostQuit;
impl Notification for HostQuit {
    const NAME: &'static str = "HostQuit";
}

/// The task catalog was rebuilt; presentation layers should refresh.
pub struct CatalogReloaded;
impl Notification for CatalogReloaded {
    const NAME: &'static str = "CatalogReloaded";
}

/// A task execution started. Args: worker ID.
pub struct TaskStarted;
impl Notification for TaskStarted {
    const NAME: &'static str = "TaskStarted";
}

/// A task execution finished. Args: worker ID, final result.
pub struct TaskFinished;
impl Notification for TaskFinished {
    const NAME: &'static str = "TaskFinished";
}

/// Any host-side progress indicator should be cleared.
pub struct ProgressClear;
impl Notification for ProgressClear {
    const NAME: &'static str = "ProgressClear";
}
