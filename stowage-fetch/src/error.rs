//! Error types for the fetch layer.

use stowage_types::EntityIdentity;
use thiserror::Error;

use crate::options::SaveOperation;

/// Result type for fetch and save operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors that can occur while scheduling or settling requests.
///
/// `Clone` because a single network result may settle many shared promises.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The identity has no server primary key yet and cannot be fetched.
    #[error("cannot fetch {0}: it has no server-assigned id")]
    MissingId(String),

    /// No backend is registered for the entity kind.
    #[error("no backend registered for kind {0}")]
    NoBackend(String),

    /// The backend does not implement the requested operation.
    #[error("backend for kind {kind} does not support {operation}")]
    Unsupported { kind: String, operation: String },

    /// The backend's batch partitioning produced an empty group.
    #[error("backend returned an empty group while partitioning {0}")]
    EmptyGroup(String),

    /// The backend's batch partitioning referenced an entity that was not requested.
    #[error("backend grouped {0}, which was not part of the request")]
    UnknownGroupMember(String),

    /// The backend returned an empty or blank payload.
    #[error("backend returned an empty payload for {0}")]
    EmptyPayload(String),

    /// Transport/backend failure (rejected network operation).
    #[error("backend error: {0}")]
    Backend(String),

    /// A batch response did not contain a requested entity.
    #[error("{0} was not found in the batch response")]
    NotFoundInBatch(String),

    /// The cache collaborator failed to ingest a payload.
    #[error("ingest error: {0}")]
    Ingest(String),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// `schedule_*` was called outside a tokio runtime.
    #[error("no async runtime available to dispatch requests")]
    NoRuntime,

    /// The manager was destroyed before the request could be dispatched.
    #[error("fetch manager has been destroyed")]
    Destroyed,

    /// The deferred backing a promise was dropped without being settled.
    #[error("request was abandoned before it settled")]
    Abandoned,
}

impl FetchError {
    pub(crate) fn missing_id(identity: &EntityIdentity) -> Self {
        Self::MissingId(identity.to_string())
    }

    pub(crate) fn unsupported(identity: &EntityIdentity, operation: SaveOperation) -> Self {
        Self::Unsupported {
            kind: identity.kind().to_string(),
            operation: operation.to_string(),
        }
    }

    /// Whether this error indicates a bug in the caller or backend rather
    /// than a runtime failure. These are never retried.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::MissingId(_)
                | Self::NoBackend(_)
                | Self::Unsupported { .. }
                | Self::EmptyGroup(_)
                | Self::UnknownGroupMember(_)
                | Self::NoRuntime
                | Self::Destroyed
        )
    }
}
