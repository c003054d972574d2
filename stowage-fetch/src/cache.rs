//! Entity cache collaborator.
//!
//! The fetch engine never stores entity data itself. It asks the cache
//! whether a fetch is needed, reads snapshots through it, and hands every
//! backend response to it for normalization and ingestion.

use crate::error::FetchResult;
use crate::options::SaveOperation;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use stowage_types::{EntityIdentity, EntityKind};

/// Raw backend payload. The engine only checks that it is non-empty.
pub type Payload = Value;

/// Attribute values of an entity.
pub type Attributes = Map<String, Value>;

/// One relationship of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relationship {
    BelongsTo(Option<EntityIdentity>),
    HasMany(Vec<EntityIdentity>),
}

/// Relationships of an entity, by name.
pub type Relationships = BTreeMap<String, Relationship>;

/// The request a payload answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    FindRecord,
    FindMany,
    Save(SaveOperation),
}

/// What the cache is told alongside a payload.
#[derive(Debug, Clone)]
pub struct IngestContext {
    pub kind: EntityKind,
    pub request: RequestKind,
    /// Identities the request asked for, in request order.
    pub requested: Vec<EntityIdentity>,
    /// The caller's op tag, if any.
    pub op: Option<String>,
}

/// Normalized result of ingesting a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    /// Primary entities, in payload order.
    pub data: Vec<EntityIdentity>,
    /// Side-loaded entities.
    pub included: Vec<EntityIdentity>,
}

impl Normalized {
    /// A result with one primary entity.
    pub fn single(identity: EntityIdentity) -> Self {
        Self {
            data: vec![identity],
            included: Vec::new(),
        }
    }

    /// A result with several primary entities and nothing side-loaded.
    pub fn many(data: Vec<EntityIdentity>) -> Self {
        Self {
            data,
            included: Vec::new(),
        }
    }

    /// The first primary entity, if any.
    pub fn primary(&self) -> Option<&EntityIdentity> {
        self.data.first()
    }
}

/// The entity cache as seen by the fetch engine.
///
/// The cache may be mutated by unrelated pushes at any time; the engine
/// re-reads state rather than assuming it is unchanged since dispatch.
#[async_trait]
pub trait EntityCache: Send + Sync {
    /// The entity has data from the server.
    fn is_loaded(&self, identity: &EntityIdentity) -> bool;

    /// The entity is a placeholder with no data.
    fn is_empty(&self, identity: &EntityIdentity) -> bool;

    /// The entity was created locally and not yet saved.
    fn is_new(&self, identity: &EntityIdentity) -> bool;

    fn is_deleted(&self, identity: &EntityIdentity) -> bool;

    /// Current attributes, used to populate snapshots lazily.
    fn attributes_of(&self, identity: &EntityIdentity) -> Option<Attributes>;

    /// Current relationships, used to populate snapshots lazily.
    fn relationships_of(&self, identity: &EntityIdentity) -> Option<Relationships> {
        let _ = identity;
        None
    }

    /// Normalizes and stores a backend payload.
    async fn ingest(&self, payload: Payload, context: &IngestContext) -> FetchResult<Normalized>;

    /// Drops placeholder state for an identity whose first load failed.
    fn release_placeholder(&self, identity: &EntityIdentity);

    /// Receives entities a batch response returned without being asked for.
    fn accept_supplementary(&self, identities: &[EntityIdentity]) {
        let _ = identities;
    }
}
