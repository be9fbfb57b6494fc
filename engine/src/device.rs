//! The device: one store, one router, one busy flag.
//!
//! A [`Device`] is the session object everything else goes through. Single
//! operations are dispatched straight against durable storage; batches run
//! in an [`Overlay`] that is deployed once the last operation is done.

use crate::command::{Failure, Operation, Response};
use crate::config::DeviceConfig;
use crate::error::{Error, Result};
use crate::journal::{Journal, JournalEntry};
use crate::resource::{Resource, COLLECTION_REL, PARENT_REL};
use crate::router::Router;
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::store::{DurableStore, KeyValueBackend, Overlay, ResourceStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What a finished batch reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Error envelopes, in operation order.
    pub errors: Vec<Failure>,
    /// Number of operations in the batch.
    pub total: usize,
}

impl BatchReport {
    /// Operations that did not fail. Never underflows on a hand-built report.
    pub fn succeeded(&self) -> usize {
        self.total.saturating_sub(self.errors.len())
    }

    /// Whether every operation succeeded.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

type StartHook = Arc<dyn Fn(usize) + Send + Sync>;
type CompleteHook = Arc<dyn Fn(&BatchReport) + Send + Sync>;

/// Callbacks fired around every batch.
#[derive(Clone, Default)]
pub struct BatchHooks {
    on_start: Option<StartHook>,
    on_complete: Option<CompleteHook>,
}

impl BatchHooks {
    /// Hooks that do nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the number of operations before the first one runs.
    pub fn on_start(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(hook));
        self
    }

    /// Called with the report after the batch has been deployed.
    pub fn on_complete(mut self, hook: impl Fn(&BatchReport) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for BatchHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchHooks")
            .field("on_start", &self.on_start.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// Links to set on a resource before it is written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkOptions {
    pub collection: Option<String>,
    pub parent: Option<String>,
}

impl LinkOptions {
    /// No links.
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the collection at `href`.
    pub fn collection(mut self, href: impl Into<String>) -> Self {
        self.collection = Some(href.into());
        self
    }

    /// Embed under the resource at `href`.
    pub fn parent(mut self, href: impl Into<String>) -> Self {
        self.parent = Some(href.into());
        self
    }

    fn apply(&self, payload: Value) -> Result<Value> {
        let mut resource = Resource::from_value(payload)?;
        if let Some(href) = &self.collection {
            resource.set_link(COLLECTION_REL, href);
        }
        if let Some(href) = &self.parent {
            resource.set_link(PARENT_REL, href);
        }
        Ok(resource.into_value())
    }
}

/// Holds one of the device's flags raised for as long as it lives.
pub(crate) struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

fn raise(flag: &AtomicBool) -> Result<BusyGuard<'_>> {
    flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .map(|_| BusyGuard { flag })
        .map_err(|_| Error::DeviceBusy)
}

pub struct Device {
    store: Mutex<DurableStore>,
    router: Router,
    busy: AtomicBool,
    syncing: AtomicBool,
    scheduler: Arc<dyn Scheduler>,
    config: DeviceConfig,
    hooks: BatchHooks,
}

impl Device {
    /// Open a device over `backend` with the default router and the tokio
    /// scheduler.
    pub fn new(backend: Arc<dyn KeyValueBackend>, config: DeviceConfig) -> Self {
        let store = match &config.namespace {
            Some(namespace) => DurableStore::with_namespace(backend, namespace.clone()),
            None => DurableStore::new(backend),
        };
        Self {
            store: Mutex::new(store),
            router: Router::new(),
            busy: AtomicBool::new(false),
            syncing: AtomicBool::new(false),
            scheduler: Arc::new(TokioScheduler),
            config,
            hooks: BatchHooks::default(),
        }
    }

    /// Replace the handler table.
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Replace the scheduler that paces batches.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Install batch callbacks.
    pub fn with_hooks(mut self, hooks: BatchHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// The configuration this device was opened with.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// The handler table commands dispatch through.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Whether a batch or sync currently holds the device.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Whether a sync request is outstanding, whichever endpoint sent it.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub(crate) fn try_acquire(&self) -> Result<BusyGuard<'_>> {
        raise(&self.busy)
    }

    /// Claim the device's single sync slot.
    pub(crate) fn try_begin_sync(&self) -> Result<BusyGuard<'_>> {
        if self.is_busy() {
            return Err(Error::DeviceBusy);
        }
        raise(&self.syncing)
    }

    /// Dispatch against durable storage without journaling.
    pub fn route(&self, operation: &Operation) -> Response {
        let mut store = self.store.lock();
        if self.is_busy() {
            return Response::busy();
        }
        self.router.dispatch(&mut *store, operation)
    }

    /// Dispatch against durable storage and journal the resulting command.
    pub fn command(&self, operation: &Operation) -> Response {
        let mut store = self.store.lock();
        if self.is_busy() {
            return Response::busy();
        }
        let response = self.router.dispatch(&mut *store, operation);
        if let Some(command) = response.command() {
            if let Err(err) = Journal::new(&store).push(command) {
                tracing::warn!(error = %err, "command applied but not journaled");
                return Response::error(&err, Some(operation));
            }
        }
        response
    }

    /// `POST` a new resource of `resource_type`.
    pub fn post(&self, resource_type: &str, payload: Value, links: &LinkOptions) -> Response {
        match links.apply(payload) {
            Ok(payload) => self.command(&Operation::post(resource_type, payload)),
            Err(err) => Response::error(&err, None),
        }
    }

    /// `PUT` a full replacement of `id`.
    pub fn put(&self, id: &str, payload: Value, links: &LinkOptions) -> Response {
        match links.apply(payload) {
            Ok(payload) => self.command(&Operation::put(id, payload)),
            Err(err) => Response::error(&err, None),
        }
    }

    /// `PATCH` fields on `id`.
    pub fn patch(&self, id: &str, payload: Value) -> Response {
        self.command(&Operation::patch(id, payload))
    }

    /// `DELETE` the resource at `id`.
    pub fn delete(&self, id: &str) -> Response {
        self.command(&Operation::delete(id))
    }

    /// Read a resource from durable storage.
    pub fn get_item(&self, key: &str) -> Result<Option<Resource>> {
        self.store.lock().get_item(key)
    }

    /// Run `f` with exclusive access to durable storage.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut DurableStore) -> R) -> R {
        f(&mut *self.store.lock())
    }

    /// The journal, oldest entry first.
    pub fn log(&self) -> Result<Vec<JournalEntry>> {
        Journal::new(&self.store.lock()).log()
    }

    /// Remove and return the first `n` journal entries.
    pub fn take_log(&self, n: usize) -> Result<Vec<JournalEntry>> {
        Journal::new(&self.store.lock()).take(n)
    }

    /// The peer position last acknowledged. `0` before the first sync.
    pub fn sync_point(&self) -> Result<Number> {
        Journal::new(&self.store.lock()).sync_point()
    }

    /// Record the peer position after a sync.
    pub fn set_sync_point(&self, sync_point: &Number) -> Result<()> {
        Journal::new(&self.store.lock()).set_sync_point(sync_point)
    }

    /// Apply `operations` in order as one batch.
    ///
    /// Fails with [`Error::DeviceBusy`] if another batch or sync holds the
    /// device. Individual failures are collected in the report and do not
    /// stop the batch; the resulting state is always deployed.
    pub async fn batch_run<F>(&self, operations: Vec<Operation>, on_progress: F) -> Result<BatchReport>
    where
        F: FnMut(usize, usize) + Send,
    {
        let guard = self.try_acquire()?;
        self.run_batch(&guard, operations, on_progress).await
    }

    pub(crate) async fn run_batch<F>(
        &self,
        _guard: &BusyGuard<'_>,
        operations: Vec<Operation>,
        mut on_progress: F,
    ) -> Result<BatchReport>
    where
        F: FnMut(usize, usize) + Send,
    {
        let total = operations.len();
        tracing::info!(total, isolate = self.config.isolate, "batch started");
        if let Some(hook) = &self.hooks.on_start {
            hook(total);
        }

        let mut overlay = if self.config.isolate {
            Some(Overlay::snapshot(&self.store.lock())?)
        } else {
            None
        };

        let mut errors = Vec::new();
        for (step, operation) in operations.iter().enumerate() {
            if step > 0 {
                self.scheduler.pause(self.config.interval).await;
            }

            let response = match overlay.as_mut() {
                Some(overlay) => self.router.dispatch(overlay, operation),
                None => {
                    let mut store = self.store.lock();
                    self.router.dispatch(&mut *store, operation)
                }
            };
            tracing::debug!(step = step + 1, total, path = %operation.route_path(), "batch step");

            if let Response::Error(failure) = response {
                tracing::warn!(
                    step = step + 1,
                    error = ?failure.error,
                    path = %operation.route_path(),
                    "batch step failed"
                );
                errors.push(failure);
            }
            on_progress(step + 1, total);
        }

        if let Some(overlay) = overlay {
            overlay.deploy(&mut self.store.lock())?;
        }

        let report = BatchReport { errors, total };
        tracing::info!(total, failed = report.errors.len(), "batch finished");
        if let Some(hook) = &self.hooks.on_complete {
            hook(&report);
        }
        Ok(report)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("config", &self.config)
            .field("router", &self.router)
            .field("busy", &self.is_busy())
            .field("syncing", &self.is_syncing())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}
