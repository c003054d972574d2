//! Fetch manager: the coordinator callers talk to.
//!
//! Owns the pending registry and decides when it is flushed. Fetches
//! requested during one synchronous burst are collected and dispatched
//! together by a single deferred flush; saves are dispatched immediately.

use crate::backend::Backends;
use crate::cache::{EntityCache, Normalized};
use crate::deferred::Promise;
use crate::dispatch::{fetch_group, fetch_individual, reject_all};
use crate::error::{FetchError, FetchResult};
use crate::intent::{FetchIntent, SaveIntent};
use crate::options::{FetchOptions, SaveOperation, SaveOptions};
use crate::registry::PendingFetchRegistry;
use crate::save::dispatch_save;
use crate::scheduler::{plan_kind, Dispatch};
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use stowage_types::EntityIdentity;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Configuration for the fetch manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// How long to wait for more requests before flushing (ms).
    /// `0` flushes as soon as the current burst of calls yields.
    pub coalesce_window_ms: u64,
    /// Whether `fetch_if_needed` refreshes loaded entities in the background
    /// when the caller does not say.
    pub background_reload: bool,
    /// Upper bound on grouped request size, applied after the backend's own
    /// partitioning.
    pub max_batch_size: Option<usize>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            coalesce_window_ms: 0,
            background_reload: false,
            max_batch_size: None,
        }
    }
}

impl FetchConfig {
    /// Parses a config from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> FetchResult<Self> {
        serde_json::from_str(json).map_err(|e| FetchError::Config(e.to_string()))
    }
}

pub(crate) struct Inner {
    config: FetchConfig,
    backends: Backends,
    pub(crate) cache: Arc<dyn EntityCache>,
    registry: Mutex<PendingFetchRegistry>,
    tick: AtomicU64,
    destroyed: AtomicBool,
}

impl Inner {
    pub(crate) fn is_alive(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire)
    }

    fn registry(&self) -> MutexGuard<'_, PendingFetchRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle_in_flight(&self, settled: &[Marker]) {
        if settled.is_empty() {
            return;
        }
        let mut registry = self.registry();
        for (identity, promise) in settled {
            registry.settle(identity, promise);
        }
    }
}

/// Identifies one dispatched intent in the registry's in-flight index.
type Marker = (EntityIdentity, Promise<EntityIdentity>);

fn marker(intent: &FetchIntent) -> Marker {
    (intent.identity().clone(), intent.promise())
}

/// Coalesces fetches and dispatches saves on behalf of the rest of the data layer.
///
/// Cloning is cheap; clones share one registry.
///
/// Requests are dispatched on the ambient tokio runtime. On a current-thread
/// runtime (or a `LocalSet`) every call made before the caller next awaits
/// is part of the same burst; on a multi-threaded runtime set
/// `coalesce_window_ms` to give sibling calls time to arrive.
#[derive(Clone)]
pub struct FetchManager {
    inner: Arc<Inner>,
}

impl FetchManager {
    /// Creates a manager with the default [`FetchConfig`].
    pub fn new(backends: Backends, cache: Arc<dyn EntityCache>) -> Self {
        Self::with_config(backends, cache, FetchConfig::default())
    }

    /// Creates a manager with an explicit configuration.
    pub fn with_config(backends: Backends, cache: Arc<dyn EntityCache>, config: FetchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                backends,
                cache,
                registry: Mutex::new(PendingFetchRegistry::new()),
                tick: AtomicU64::new(0),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the configuration the manager was built with.
    pub fn config(&self) -> &FetchConfig {
        &self.inner.config
    }

    /// Number of flushes performed so far.
    pub fn tick(&self) -> u64 {
        self.inner.tick.load(Ordering::Acquire)
    }

    /// Number of fetch intents waiting for the next flush.
    pub fn pending_count(&self) -> usize {
        self.inner.registry().pending_count()
    }

    /// Number of dispatched fetch intents that have not settled yet.
    pub fn in_flight_count(&self) -> usize {
        self.inner.registry().in_flight_count()
    }

    // ── Fetch ────────────────────────────────────────────────────

    /// Requests a fetch of `identity`.
    ///
    /// If an equivalent fetch is already pending, its promise is returned and
    /// no new network work is created. Programming errors (no id, no backend
    /// for the kind, no runtime, destroyed manager) are returned immediately.
    pub fn schedule_fetch(
        &self,
        identity: EntityIdentity,
        options: FetchOptions,
    ) -> FetchResult<Promise<EntityIdentity>> {
        self.ensure_alive()?;
        if !identity.has_id() {
            return Err(FetchError::missing_id(&identity));
        }
        self.inner.backends.for_kind(identity.kind())?;
        let runtime = Handle::try_current().map_err(|_| FetchError::NoRuntime)?;

        let tick = self.tick();
        let enqueued = self.inner.registry().enqueue(identity.clone(), options, tick);
        if enqueued.coalesced {
            debug!("Joined pending fetch for {}", identity);
        }
        if enqueued.schedule_flush {
            self.spawn_flush(&runtime);
        }
        Ok(enqueued.promise)
    }

    /// Fetches `identity` only if the cache cannot already answer for it.
    ///
    /// New and deleted entities are never fetched. Loaded, non-empty entities
    /// are fetched only when `reload` is set; otherwise an already-resolved
    /// promise is returned, and a background refresh is scheduled if
    /// background reload is on.
    pub fn fetch_if_needed(
        &self,
        identity: EntityIdentity,
        options: FetchOptions,
    ) -> FetchResult<Promise<EntityIdentity>> {
        let cache = &self.inner.cache;
        if cache.is_new(&identity) || cache.is_deleted(&identity) {
            return Ok(Promise::resolved(identity));
        }

        let loaded = cache.is_loaded(&identity) && !cache.is_empty(&identity);
        if !loaded || options.reload {
            return self.schedule_fetch(identity, options);
        }

        let background = options
            .background_reload
            .unwrap_or(self.inner.config.background_reload);
        if background {
            debug!("Refreshing {} in the background", identity);
            // Nobody awaits a background refresh; failures are logged by dispatch.
            if let Err(e) = self.schedule_fetch(identity.clone(), options) {
                warn!("Could not schedule background refresh of {}: {}", identity, e);
            }
        }
        Ok(Promise::resolved(identity))
    }

    /// Dispatches everything pending now.
    ///
    /// Normally invoked by the flush scheduled on the first enqueue of a
    /// burst. Completes once every dispatched operation has settled.
    pub async fn flush(&self) {
        let drained = self.inner.registry().take_for_dispatch();
        if drained.is_empty() {
            return;
        }
        let tick = self.inner.tick.fetch_add(1, Ordering::AcqRel);

        let mut operations = Vec::new();
        for (kind, intents) in drained {
            let drained_markers: Vec<Marker> = intents.values().flatten().map(marker).collect();
            let backend = match self.inner.backends.for_kind(&kind) {
                Ok(backend) => backend,
                Err(e) => {
                    error!("Dropping pending {} fetches: {}", kind, e);
                    reject_all(intents.into_values().flatten().collect(), e);
                    self.inner.settle_in_flight(&drained_markers);
                    continue;
                }
            };
            let plan = plan_kind(
                &kind,
                intents,
                backend.as_ref(),
                &self.inner.cache,
                self.inner.config.max_batch_size,
            );

            // Intents rejected while planning never reach the network.
            let planned: Vec<Vec<Marker>> = plan.iter().map(Dispatch::markers).collect();
            let unplanned: Vec<Marker> = drained_markers
                .into_iter()
                .filter(|(_, promise)| {
                    !planned
                        .iter()
                        .flatten()
                        .any(|(_, other)| other.same_as(promise))
                })
                .collect();
            self.inner.settle_in_flight(&unplanned);

            operations.extend(
                plan.into_iter()
                    .zip(planned)
                    .map(|(dispatch, markers)| (backend.clone(), dispatch, markers)),
            );
        }

        let intent_count: usize = operations.iter().map(|(_, d, _)| d.intent_count()).sum();
        info!(
            "Flush {}: dispatching {} requests for {} fetch intents",
            tick,
            operations.len(),
            intent_count
        );

        let inner = self.inner.as_ref();
        futures::future::join_all(operations.into_iter().map(
            |(backend, dispatch, markers)| async move {
                match dispatch {
                    Dispatch::Individual { snapshot, intents } => {
                        fetch_individual(inner, backend.as_ref(), snapshot, intents).await;
                    }
                    Dispatch::Group(members) => {
                        fetch_group(inner, backend.as_ref(), members).await;
                    }
                }
                inner.settle_in_flight(&markers);
            },
        ))
        .await;
    }

    fn spawn_flush(&self, runtime: &Handle) {
        let manager = self.clone();
        let window = self.inner.config.coalesce_window_ms;
        runtime.spawn(async move {
            if window == 0 {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(Duration::from_millis(window)).await;
            }
            manager.flush().await;
        });
    }

    // ── Save ─────────────────────────────────────────────────────

    /// Dispatches a create, update or delete immediately.
    ///
    /// Saves are never coalesced. Resolves with `None` when the backend
    /// returned no body.
    pub fn schedule_save(
        &self,
        identity: EntityIdentity,
        options: SaveOptions,
    ) -> FetchResult<Promise<Option<Normalized>>> {
        self.ensure_alive()?;
        let operation = options.operation;
        if operation != SaveOperation::Create && !identity.has_id() {
            return Err(FetchError::missing_id(&identity));
        }
        let backend = self.inner.backends.for_kind(identity.kind())?;
        if !backend.capabilities().supports_save(operation) {
            return Err(FetchError::unsupported(&identity, operation));
        }
        let runtime = Handle::try_current().map_err(|_| FetchError::NoRuntime)?;

        let snapshot = Snapshot::new(identity, self.inner.cache.clone(), options.adapter_options, None);
        let intent = SaveIntent::new(operation, snapshot);
        let promise = intent.promise();
        runtime.spawn(dispatch_save(self.inner.clone(), backend, intent));
        Ok(promise)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Tears the manager down.
    ///
    /// Pending (not yet dispatched) fetches are rejected. Operations already
    /// in flight still settle their promises, but their results are no
    /// longer ingested into the cache.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained = self.inner.registry().drain_all();
        let intents: Vec<_> = drained
            .into_iter()
            .flat_map(|(_, by_identity)| by_identity.into_values().flatten())
            .collect();
        if !intents.is_empty() {
            info!("Rejecting {} pending fetches on teardown", intents.len());
        }
        reject_all(intents, FetchError::Destroyed);
    }

    /// Whether [`destroy`](Self::destroy) has been called.
    pub fn is_destroyed(&self) -> bool {
        !self.inner.is_alive()
    }

    fn ensure_alive(&self) -> FetchResult<()> {
        if self.inner.is_alive() {
            Ok(())
        } else {
            Err(FetchError::Destroyed)
        }
    }
}

impl std::fmt::Debug for FetchManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchManager")
            .field("config", &self.inner.config)
            .field("backends", &self.inner.backends)
            .field("tick", &self.tick())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
