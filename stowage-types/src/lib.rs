//! Identity types for the Stowage data layer.
//!
//! This crate defines how a remotely-sourced entity is named on the client:
//! - Local identifiers (UUID v7) minted before the server assigns a key
//! - Entity kinds (the model/type name an entity belongs to)
//! - Entity identities pairing the two with an optional server primary key
//! - An interning table so every representation of one entity compares equal
//!
//! Nothing here performs I/O. The fetch engine in `stowage-fetch` keys its
//! pending-request bookkeeping on [`EntityIdentity`].

mod identity;
mod ids;
mod interner;

pub use identity::{EntityIdentity, EntityKind};
pub use ids::LocalId;
pub use interner::IdentityCache;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, IdentityError>;

/// Errors that can occur while interning or updating identities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("unknown identity: {0}")]
    UnknownIdentity(String),

    #[error("id {id} for kind {kind} already belongs to another identity")]
    IdConflict { kind: String, id: String },

    #[error("identity {identity} already has id {existing}")]
    IdAlreadyAssigned { identity: String, existing: String },

    #[error("invalid UUID: {0}")]
    InvalidUuid(String),
}

impl From<uuid::Error> for IdentityError {
    fn from(err: uuid::Error) -> Self {
        Self::InvalidUuid(err.to_string())
    }
}
