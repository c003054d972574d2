//! Read-only entity snapshots handed to backends.

use crate::cache::{Attributes, EntityCache, Relationship, Relationships};
use crate::options::{AdapterOptions, Include};
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, OnceLock};
use stowage_types::{EntityIdentity, EntityKind};

/// Point-in-time view of an entity.
///
/// Attributes and relationships are read from the cache on first access
/// and then frozen, so a backend that never looks at them costs nothing.
#[derive(Clone)]
pub struct Snapshot {
    inner: Arc<SnapshotInner>,
}

struct SnapshotInner {
    identity: EntityIdentity,
    adapter_options: Option<AdapterOptions>,
    include: Option<Include>,
    cache: Arc<dyn EntityCache>,
    attributes: OnceLock<Attributes>,
    relationships: OnceLock<Relationships>,
}

impl Snapshot {
    /// Creates an unpopulated snapshot of `identity`.
    pub fn new(
        identity: EntityIdentity,
        cache: Arc<dyn EntityCache>,
        adapter_options: Option<AdapterOptions>,
        include: Option<Include>,
    ) -> Self {
        Self {
            inner: Arc::new(SnapshotInner {
                identity,
                adapter_options,
                include,
                cache,
                attributes: OnceLock::new(),
                relationships: OnceLock::new(),
            }),
        }
    }

    /// Returns the identity this snapshot describes.
    pub fn identity(&self) -> &EntityIdentity {
        &self.inner.identity
    }

    /// Returns the entity kind.
    pub fn kind(&self) -> &EntityKind {
        self.inner.identity.kind()
    }

    /// Returns the server id, if one has been assigned.
    pub fn id(&self) -> Option<&str> {
        self.inner.identity.id()
    }

    /// Returns the adapter options of the request that built this snapshot.
    pub fn adapter_options(&self) -> Option<&AdapterOptions> {
        self.inner.adapter_options.as_ref()
    }

    /// Returns the include paths of the request that built this snapshot.
    pub fn include(&self) -> Option<&Include> {
        self.inner.include.as_ref()
    }

    /// Returns the attributes, reading them from the cache on first use.
    pub fn attributes(&self) -> &Attributes {
        self.inner.attributes.get_or_init(|| {
            self.inner
                .cache
                .attributes_of(&self.inner.identity)
                .unwrap_or_default()
        })
    }

    /// Returns one attribute by name.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attributes().get(name)
    }

    /// Returns the relationships, reading them from the cache on first use.
    pub fn relationships(&self) -> &Relationships {
        self.inner.relationships.get_or_init(|| {
            self.inner
                .cache
                .relationships_of(&self.inner.identity)
                .unwrap_or_default()
        })
    }

    /// Returns one relationship by name.
    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships().get(name)
    }

    /// Whether the lazy fields have been read yet.
    pub fn is_populated(&self) -> bool {
        self.inner.attributes.get().is_some()
    }

    /// Resource-object style JSON view.
    pub fn to_json(&self) -> Value {
        let relationships: serde_json::Map<String, Value> = self
            .relationships()
            .iter()
            .map(|(name, rel)| (name.clone(), json!({ "data": relationship_json(rel) })))
            .collect();

        json!({
            "type": self.kind().as_str(),
            "id": self.id(),
            "lid": self.identity().lid().to_string(),
            "attributes": self.attributes(),
            "relationships": relationships,
        })
    }
}

fn identity_json(identity: &EntityIdentity) -> Value {
    json!({ "type": identity.kind().as_str(), "id": identity.id() })
}

fn relationship_json(relationship: &Relationship) -> Value {
    match relationship {
        Relationship::BelongsTo(Some(identity)) => identity_json(identity),
        Relationship::BelongsTo(None) => Value::Null,
        Relationship::HasMany(identities) => {
            Value::Array(identities.iter().map(identity_json).collect())
        }
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("identity", &self.inner.identity)
            .field("populated", &self.is_populated())
            .finish_non_exhaustive()
    }
}
