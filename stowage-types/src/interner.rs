//! Identity interning.
//!
//! Guarantees that every lookup of `(kind, id)` yields the same
//! [`EntityIdentity`], so identities can be used directly as map keys by the
//! fetch engine and the entity cache.

use crate::{EntityIdentity, EntityKind, IdentityError, LocalId, Result};
use std::collections::HashMap;

/// Interning table for entity identities.
///
/// Owned by whoever coordinates the data layer; there is no global instance.
#[derive(Debug, Default)]
pub struct IdentityCache {
    by_lid: HashMap<LocalId, EntityIdentity>,
    by_key: HashMap<(EntityKind, String), LocalId>,
}

impl IdentityCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the interned identity for `id` of `kind`, creating it if this
    /// is the first time the pair is seen.
    pub fn get_or_create(&mut self, kind: impl Into<EntityKind>, id: impl Into<String>) -> EntityIdentity {
        let kind = kind.into();
        let id = id.into();
        if let Some(existing) = self.peek(&kind, &id) {
            return existing;
        }

        let identity = EntityIdentity::new(kind.clone(), id.clone());
        self.by_key.insert((kind, id), identity.lid());
        self.by_lid.insert(identity.lid(), identity.clone());
        identity
    }

    /// Mints an identity for a client-created entity with no primary key.
    pub fn create_local(&mut self, kind: impl Into<EntityKind>) -> EntityIdentity {
        let identity = EntityIdentity::local(kind);
        self.by_lid.insert(identity.lid(), identity.clone());
        identity
    }

    /// Looks up an interned identity without creating one.
    pub fn peek(&self, kind: &EntityKind, id: &str) -> Option<EntityIdentity> {
        self.by_key
            .get(&(kind.clone(), id.to_string()))
            .and_then(|lid| self.by_lid.get(lid))
            .cloned()
    }

    /// Looks up an interned identity by its local id.
    pub fn get(&self, lid: LocalId) -> Option<&EntityIdentity> {
        self.by_lid.get(&lid)
    }

    /// Records a server-assigned primary key for a local identity.
    ///
    /// Assigning the id an identity already has is a no-op.
    pub fn assign_id(&mut self, identity: &EntityIdentity, id: impl Into<String>) -> Result<EntityIdentity> {
        let id = id.into();
        let current = self
            .by_lid
            .get(&identity.lid())
            .ok_or_else(|| IdentityError::UnknownIdentity(identity.to_string()))?;

        match current.id() {
            Some(existing) if existing == id => return Ok(current.clone()),
            Some(existing) => {
                return Err(IdentityError::IdAlreadyAssigned {
                    identity: identity.to_string(),
                    existing: existing.to_string(),
                });
            }
            None => {}
        }

        let key = (identity.kind().clone(), id.clone());
        if self.by_key.contains_key(&key) {
            return Err(IdentityError::IdConflict {
                kind: identity.kind().to_string(),
                id,
            });
        }

        let updated = current.with_id(id);
        self.by_key.insert(key, updated.lid());
        self.by_lid.insert(updated.lid(), updated.clone());
        Ok(updated)
    }

    /// Drops an identity from the table. Returns whether it was present.
    pub fn forget(&mut self, identity: &EntityIdentity) -> bool {
        let Some(removed) = self.by_lid.remove(&identity.lid()) else {
            return false;
        };
        if let Some(id) = removed.id() {
            self.by_key.remove(&(removed.kind().clone(), id.to_string()));
        }
        true
    }

    /// Number of interned identities.
    pub fn len(&self) -> usize {
        self.by_lid.len()
    }

    /// Whether no identities are interned.
    pub fn is_empty(&self) -> bool {
        self.by_lid.is_empty()
    }
}
