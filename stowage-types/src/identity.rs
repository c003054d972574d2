//! Entity kinds and identities.

use crate::LocalId;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The kind (model name) an entity belongs to, e.g. `person`.
///
/// Cloning is a reference-count bump, so kinds can be used freely as map keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKind(Arc<str>);

impl EntityKind {
    /// Creates a kind from its model name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Returns the kind name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EntityKind {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl Borrow<str> for EntityKind {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identity of one logical remote entity.
///
/// Equality and hashing use `(kind, lid)` only. The server primary key is
/// carried alongside but may be filled in later (see
/// [`IdentityCache::assign_id`](crate::IdentityCache::assign_id)), so two
/// copies of one identity taken before and after id assignment still compare
/// equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityIdentity {
    kind: EntityKind,
    lid: LocalId,
    id: Option<String>,
}

impl EntityIdentity {
    /// Creates an identity for an entity the server already knows.
    ///
    /// Prefer [`IdentityCache::get_or_create`](crate::IdentityCache::get_or_create)
    /// so repeated lookups share one `lid`.
    pub fn new(kind: impl Into<EntityKind>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            lid: LocalId::new(),
            id: Some(id.into()),
        }
    }

    /// Creates an identity that has no server primary key yet.
    pub fn local(kind: impl Into<EntityKind>) -> Self {
        Self {
            kind: kind.into(),
            lid: LocalId::new(),
            id: None,
        }
    }

    /// Returns the entity kind.
    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    /// Returns the local identifier.
    pub fn lid(&self) -> LocalId {
        self.lid
    }

    /// The server primary key, if one has been assigned.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Whether the server has assigned a primary key.
    pub fn has_id(&self) -> bool {
        self.id.is_some()
    }

    /// Returns `true` if this identity names `id` of `kind`.
    pub fn matches(&self, kind: &EntityKind, id: &str) -> bool {
        self.kind == *kind && self.id.as_deref() == Some(id)
    }

    pub(crate) fn with_id(&self, id: String) -> Self {
        Self {
            kind: self.kind.clone(),
            lid: self.lid,
            id: Some(id),
        }
    }
}

impl PartialEq for EntityIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.lid == other.lid && self.kind == other.kind
    }
}

impl Eq for EntityIdentity {}

impl Hash for EntityIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.lid.hash(state);
    }
}

impl fmt::Display for EntityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}:{}", self.kind, id),
            None => write!(f, "{}:{}", self.kind, self.lid),
        }
    }
}
