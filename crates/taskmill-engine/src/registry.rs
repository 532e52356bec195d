//! The in-memory task catalog.
//!
//! Merges two metadata sources: compiled declarations registered at process
//! start, and the JSON manifest, which can be reloaded live. The catalog is
//! read-mostly after load; a reload rebuilds the manifest-origin slice
//! wholesale so readers never see a partially rebuilt catalog.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use taskmill_core::{CallbackBus, CatalogReloaded, CoreError, NotifyArgs, Platform};

use crate::manifest;
use crate::meta::{Origin, TaskDecl, TaskMeta};
use crate::worker::{ScriptWorker, SharedWorker, Worker, WorkerFactory};

/// One catalog slot: metadata plus the worker instance bound to it.
#[derive(Clone)]
pub struct CatalogEntry {
    pub meta: TaskMeta,
    pub worker: SharedWorker,
}

/// Catalog of all known tasks, keyed by worker ID (`Group/Name`).
pub struct TaskRegistry {
    platform: Platform,
    default_group: String,
    bus: Arc<CallbackBus>,
    entries: RwLock<Vec<CatalogEntry>>,
    manifest_path: Mutex<Option<PathBuf>>,
    manifest_fingerprint: Mutex<Option<u64>>,
    shutdown: tokio::sync::Notify,
}

impl TaskRegistry {
    pub fn new(platform: Platform, default_group: impl Into<String>, bus: Arc<CallbackBus>) -> Self {
        Self {
            platform,
            default_group: default_group.into(),
            bus,
            entries: RwLock::new(Vec::new()),
            manifest_path: Mutex::new(None),
            manifest_fingerprint: Mutex::new(None),
            shutdown: tokio::sync::Notify::new(),
        }
    }

    /// Register one compiled task declaration.
    pub fn declare(&self, decl: TaskDecl, factory: WorkerFactory) {
        self.declare_all(vec![decl], factory);
    }

    /// Register several declared identities sharing one worker factory.
    ///
    /// The factory runs once per surviving identity. Declarations whose
    /// platform affinity mismatches the current platform are dropped, as
    /// are duplicates of an already-registered worker ID.
    pub fn declare_all(&self, decls: Vec<TaskDecl>, factory: WorkerFactory) {
        for decl in decls {
            let meta = self.localize(decl.into_meta());
            let Some(meta) = meta else { continue };
            let worker = factory(&meta);
            self.insert(meta, worker);
        }
        self.sort();
    }

    /// Platform-filter a meta record; returns None when it does not apply
    /// to the current platform.
    fn localize(&self, mut meta: TaskMeta) -> Option<TaskMeta> {
        if !meta.platform.accepts(self.platform) {
            debug!(
                worker_id = %meta.worker_id(),
                platform = %meta.platform,
                "Dropping task for other platform"
            );
            return None;
        }
        meta.params.retain(|p| p.platform.accepts(self.platform));
        Some(meta)
    }

    fn insert(&self, meta: TaskMeta, worker: Box<dyn Worker>) {
        let worker_id = meta.worker_id();
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(e) => {
                warn!("Catalog lock poisoned: {}", e);
                return;
            }
        };
        if entries.iter().any(|e| e.meta.worker_id() == worker_id) {
            warn!(worker_id = %worker_id, "Duplicate worker ID, skipping registration");
            return;
        }
        entries.push(CatalogEntry {
            meta,
            worker: Arc::new(tokio::sync::Mutex::new(worker)),
        });
    }

    /// Re-sort the catalog by ascending priority (stable).
    fn sort(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.sort_by_key(|e| e.meta.priority);
        }
    }

    /// Look up an entry by worker ID.
    pub fn resolve(&self, worker_id: &str) -> Option<CatalogEntry> {
        self.entries
            .read()
            .ok()?
            .iter()
            .find(|e| e.meta.worker_id() == worker_id)
            .cloned()
    }

    /// Snapshot of all catalog metadata, in priority order.
    pub fn metas(&self) -> Vec<TaskMeta> {
        self.entries
            .read()
            .map(|entries| entries.iter().map(|e| e.meta.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point the registry at a manifest file. Does not load it; call
    /// `reload_manifest` (or start the watcher) for that.
    pub fn set_manifest_path(&self, path: impl Into<PathBuf>) {
        if let Ok(mut slot) = self.manifest_path.lock() {
            *slot = Some(path.into());
        }
    }

    /// Reload the manifest if its content changed.
    ///
    /// Returns `Ok(true)` when the catalog was rebuilt. An unchanged
    /// fingerprint reparses nothing and mutates nothing. On change, only
    /// manifest-origin entries are replaced; compiled ones stay put.
    pub async fn reload_manifest(&self) -> Result<bool, CoreError> {
        let Some(path) = self.manifest_path.lock().ok().and_then(|p| p.clone()) else {
            return Ok(false);
        };
        let content = std::fs::read_to_string(&path)?;

        let print = manifest::fingerprint(&content);
        {
            let mut last = match self.manifest_fingerprint.lock() {
                Ok(guard) => guard,
                Err(_) => return Ok(false),
            };
            if *last == Some(print) {
                return Ok(false);
            }
            *last = Some(print);
        }

        let tasks = manifest::parse(&content, &self.default_group)?;

        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|e| e.meta.origin != Origin::Manifest);
        }
        let mut inserted = 0usize;
        for task in tasks {
            let Some(meta) = self.localize(task.meta) else {
                continue;
            };
            let worker = ScriptWorker::new(meta.worker_id(), task.command);
            self.insert(meta, Box::new(worker));
            inserted += 1;
        }
        self.sort();

        info!(path = %path.display(), tasks = inserted, "Manifest reloaded");
        self.bus.notify::<CatalogReloaded>(NotifyArgs::new()).await;
        Ok(true)
    }

    /// Poll the manifest on a fixed interval until `stop_watching` is
    /// called. Read or parse failures are logged and retried next tick.
    pub async fn watch_manifest(&self, poll: Duration) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(poll) => {
                    if let Err(e) = self.reload_manifest().await {
                        warn!("Manifest reload failed: {}", e);
                    }
                }
                _ = self.shutdown.notified() => {
                    return;
                }
            }
        }
    }

    /// Signal the manifest watcher to stop.
    pub fn stop_watching(&self) {
        self.shutdown.notify_one();
    }
}
