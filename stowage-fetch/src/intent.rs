//! Fetch and save intents.
//!
//! An intent is one caller's request, paired with the [`Deferred`] that
//! settles it. Fetch intents move through
//! `Created → Registered → Dispatched* → Resolved | Rejected`; save intents
//! are dispatched as soon as they are created.

use crate::cache::Normalized;
use crate::deferred::{Deferred, Promise};
use crate::error::FetchError;
use crate::options::{FetchOptions, SaveOperation};
use crate::snapshot::Snapshot;
use stowage_types::EntityIdentity;
use tracing::warn;

/// Lifecycle of a fetch intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentState {
    Created,
    /// Waiting in the pending registry for the next flush.
    Registered,
    DispatchedIndividually,
    DispatchedInGroup,
    Resolved,
    Rejected,
}

impl IntentState {
    /// Whether `self → next` is a legal transition.
    pub fn can_advance_to(self, next: IntentState) -> bool {
        use IntentState::*;
        matches!(
            (self, next),
            (Created, Registered)
                | (Registered, DispatchedIndividually)
                | (Registered, DispatchedInGroup)
                // Planning failures settle straight out of the registry.
                | (Registered, Rejected)
                | (DispatchedIndividually, Resolved)
                | (DispatchedIndividually, Rejected)
                | (DispatchedInGroup, Resolved)
                | (DispatchedInGroup, Rejected)
        )
    }

    /// Whether the intent has reached a terminal state.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Resolved | Self::Rejected)
    }
}

/// A pending request to materialize or refresh one entity.
#[derive(Debug)]
pub struct FetchIntent {
    identity: EntityIdentity,
    options: FetchOptions,
    created_tick: u64,
    state: IntentState,
    deferred: Deferred<EntityIdentity>,
}

impl FetchIntent {
    /// Creates an intent in the `Created` state with a fresh deferred.
    pub fn new(identity: EntityIdentity, options: FetchOptions, created_tick: u64) -> Self {
        Self {
            identity,
            options,
            created_tick,
            state: IntentState::Created,
            deferred: Deferred::new(),
        }
    }

    /// Returns the identity this intent fetches.
    pub fn identity(&self) -> &EntityIdentity {
        &self.identity
    }

    /// Returns the options the intent was registered with.
    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// The manager tick during which this intent was created.
    pub fn created_tick(&self) -> u64 {
        self.created_tick
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> IntentState {
        self.state
    }

    /// Returns a handle to the promise this intent settles.
    pub fn promise(&self) -> Promise<EntityIdentity> {
        self.deferred.promise()
    }

    /// Moves to `next`, ignoring (and logging) illegal transitions.
    pub(crate) fn advance(&mut self, next: IntentState) {
        if self.state.can_advance_to(next) {
            self.state = next;
        } else {
            warn!(
                "Ignoring intent transition {:?} -> {:?} for {}",
                self.state, next, self.identity
            );
        }
    }

    pub(crate) fn resolve(mut self, identity: EntityIdentity) {
        self.advance(IntentState::Resolved);
        self.deferred.resolve(identity);
    }

    pub(crate) fn reject(mut self, error: FetchError) {
        self.advance(IntentState::Rejected);
        self.deferred.reject(error);
    }
}

/// A single create/update/delete request. Never deduplicated.
#[derive(Debug)]
pub struct SaveIntent {
    operation: SaveOperation,
    snapshot: Snapshot,
    deferred: Deferred<Option<Normalized>>,
}

impl SaveIntent {
    /// Creates a save intent over `snapshot`.
    pub fn new(operation: SaveOperation, snapshot: Snapshot) -> Self {
        Self {
            operation,
            snapshot,
            deferred: Deferred::new(),
        }
    }

    /// Returns the identity being saved.
    pub fn identity(&self) -> &EntityIdentity {
        self.snapshot.identity()
    }

    /// Returns the mutation to perform.
    pub fn operation(&self) -> SaveOperation {
        self.operation
    }

    /// Returns the snapshot handed to the backend.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Returns a handle to the promise this save settles.
    pub fn promise(&self) -> Promise<Option<Normalized>> {
        self.deferred.promise()
    }

    pub(crate) fn into_parts(self) -> (SaveOperation, Snapshot, Deferred<Option<Normalized>>) {
        (self.operation, self.snapshot, self.deferred)
    }
}
