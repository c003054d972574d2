//! Local identifiers.
//!
//! Uses UUID v7 so identifiers minted in one session sort by creation time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Client-side identifier for an entity.
///
/// Every entity gets one the moment the client learns about it, whether or
/// not the server has assigned it a primary key yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(Uuid);

impl LocalId {
    /// Creates a new local ID with the current timestamp.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a local ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parses a local ID, with or without the `@lid:` display prefix.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let raw = s.strip_prefix("@lid:").unwrap_or(s);
        Ok(Self(Uuid::parse_str(raw)?))
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@lid:{}", self.0)
    }
}

impl FromStr for LocalId {
    type Err = crate::IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
