//! Network backend abstraction.
//!
//! A backend performs the actual network operations for one or more entity
//! kinds. Optional operations are declared through [`Capabilities`] so the
//! engine can check for them up front instead of probing at call time.

use crate::cache::Payload;
use crate::error::{FetchError, FetchResult};
use crate::options::SaveOperation;
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use stowage_types::{EntityIdentity, EntityKind};

/// Optional operations a backend implements.
///
/// `fetch_one` is always required.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// `fetch_many` is implemented.
    pub fetch_many: bool,
    /// Pending fetches of this backend's kinds may be grouped into `fetch_many` calls.
    pub coalesce_find_requests: bool,
    pub create: bool,
    pub update: bool,
    pub delete: bool,
}

impl Capabilities {
    /// Single-entity reads only.
    pub const fn read_only() -> Self {
        Self {
            fetch_many: false,
            coalesce_find_requests: false,
            create: false,
            update: false,
            delete: false,
        }
    }

    /// Every operation, with grouping enabled.
    pub const fn all() -> Self {
        Self {
            fetch_many: true,
            coalesce_find_requests: true,
            create: true,
            update: true,
            delete: true,
        }
    }

    /// Adds `fetch_many` with grouping enabled.
    pub const fn with_batching(mut self) -> Self {
        self.fetch_many = true;
        self.coalesce_find_requests = true;
        self
    }

    /// Adds create, update and delete.
    pub const fn with_saves(mut self) -> Self {
        self.create = true;
        self.update = true;
        self.delete = true;
        self
    }

    /// Grouped fetches are both implemented and enabled.
    pub fn supports_batching(&self) -> bool {
        self.fetch_many && self.coalesce_find_requests
    }

    /// Whether the backend implements `operation`.
    pub fn supports_save(&self, operation: SaveOperation) -> bool {
        match operation {
            SaveOperation::Create => self.create,
            SaveOperation::Update => self.update,
            SaveOperation::Delete => self.delete,
        }
    }
}

/// Performs network operations on behalf of the fetch engine.
#[async_trait]
pub trait Backend: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    /// Fetches a single entity.
    async fn fetch_one(&self, identity: &EntityIdentity, snapshot: &Snapshot) -> FetchResult<Payload>;

    /// Fetches several entities of one kind in a single call.
    async fn fetch_many(
        &self,
        identities: &[EntityIdentity],
        snapshots: &[Snapshot],
    ) -> FetchResult<Payload> {
        let kind = identities
            .first()
            .map(|i| i.kind().to_string())
            .unwrap_or_default();
        let _ = snapshots;
        Err(FetchError::Unsupported {
            kind,
            operation: "findMany".into(),
        })
    }

    /// Splits snapshots into groups, each fetched with one `fetch_many` call.
    ///
    /// Every group must be non-empty and contain only snapshots from the input.
    fn partition_for_batch(&self, snapshots: &[Snapshot]) -> Vec<Vec<Snapshot>> {
        vec![snapshots.to_vec()]
    }

    /// `None` means the backend returned no body, which counts as success.
    async fn create(&self, snapshot: &Snapshot) -> FetchResult<Option<Payload>> {
        Err(FetchError::unsupported(snapshot.identity(), SaveOperation::Create))
    }

    async fn update(&self, snapshot: &Snapshot) -> FetchResult<Option<Payload>> {
        Err(FetchError::unsupported(snapshot.identity(), SaveOperation::Update))
    }

    async fn delete(&self, snapshot: &Snapshot) -> FetchResult<Option<Payload>> {
        Err(FetchError::unsupported(snapshot.identity(), SaveOperation::Delete))
    }
}

/// Splits snapshots into consecutive groups of at most `max` members.
pub fn partition_by_size(snapshots: &[Snapshot], max: usize) -> Vec<Vec<Snapshot>> {
    snapshots
        .chunks(max.max(1))
        .map(<[Snapshot]>::to_vec)
        .collect()
}

/// Backends by entity kind, with an optional fallback for unlisted kinds.
#[derive(Clone, Default)]
pub struct Backends {
    by_kind: HashMap<EntityKind, Arc<dyn Backend>>,
    fallback: Option<Arc<dyn Backend>>,
}

impl Backends {
    /// Creates an empty routing table with no fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// One backend for every kind.
    pub fn single(backend: Arc<dyn Backend>) -> Self {
        Self {
            by_kind: HashMap::new(),
            fallback: Some(backend),
        }
    }

    /// Routes `kind` to `backend`, replacing any earlier registration.
    pub fn register(&mut self, kind: impl Into<EntityKind>, backend: Arc<dyn Backend>) {
        self.by_kind.insert(kind.into(), backend);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, kind: impl Into<EntityKind>, backend: Arc<dyn Backend>) -> Self {
        self.register(kind, backend);
        self
    }

    /// Sets the backend used for kinds with no registration of their own.
    pub fn with_fallback(mut self, backend: Arc<dyn Backend>) -> Self {
        self.fallback = Some(backend);
        self
    }

    /// Resolves the backend responsible for `kind`.
    pub fn for_kind(&self, kind: &EntityKind) -> FetchResult<Arc<dyn Backend>> {
        self.by_kind
            .get(kind)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| FetchError::NoBackend(kind.to_string()))
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("kinds", &self.by_kind.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
