//! Pending fetch registry.
//!
//! Accumulates fetch intents between flushes, keyed
//! kind → identity → intents in insertion order. Intents handed to a flush
//! stay visible as in-flight until their dispatch settles, so an equivalent
//! request made meanwhile joins them instead of going to the network again.

use crate::deferred::Promise;
use crate::fingerprint::{find_matching, is_same_request};
use crate::intent::{FetchIntent, IntentState};
use crate::options::FetchOptions;
use indexmap::IndexMap;
use stowage_types::{EntityIdentity, EntityKind};

/// Intents for one kind, in the order their identities were first seen.
pub type KindIntents = IndexMap<EntityIdentity, Vec<FetchIntent>>;

/// A dispatched fetch that has not settled yet.
#[derive(Debug)]
struct InFlight {
    options: FetchOptions,
    promise: Promise<EntityIdentity>,
}

/// Outcome of [`PendingFetchRegistry::enqueue`].
#[derive(Debug)]
pub struct Enqueued {
    pub promise: Promise<EntityIdentity>,
    /// The request joined an intent that was already pending or in flight.
    pub coalesced: bool,
    /// This is the first intent since the last drain; the caller should
    /// schedule a flush.
    pub schedule_flush: bool,
}

/// Fetch intents recorded during the current tick and not yet dispatched.
#[derive(Debug, Default)]
pub struct PendingFetchRegistry {
    pending: IndexMap<EntityKind, KindIntents>,
    in_flight: IndexMap<EntityIdentity, Vec<InFlight>>,
    flush_scheduled: bool,
}

impl PendingFetchRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fetch for `identity`, joining a compatible in-flight or
    /// pending intent if there is one.
    pub fn enqueue(&mut self, identity: EntityIdentity, options: FetchOptions, tick: u64) -> Enqueued {
        if let Some(promise) = self.find_in_flight(&identity, &options) {
            return Enqueued {
                promise,
                coalesced: true,
                schedule_flush: false,
            };
        }

        let intents = self
            .pending
            .entry(identity.kind().clone())
            .or_default()
            .entry(identity.clone())
            .or_default();

        if let Some(index) = find_matching(intents, &options) {
            return Enqueued {
                promise: intents[index].promise(),
                coalesced: true,
                schedule_flush: false,
            };
        }

        let mut intent = FetchIntent::new(identity, options, tick);
        intent.advance(IntentState::Registered);
        let promise = intent.promise();
        intents.push(intent);

        let schedule_flush = !self.flush_scheduled;
        self.flush_scheduled = true;
        Enqueued {
            promise,
            coalesced: false,
            schedule_flush,
        }
    }

    /// Removes and returns everything pending for `kind`.
    pub fn drain_kind(&mut self, kind: &EntityKind) -> KindIntents {
        self.pending.shift_remove(kind).unwrap_or_default()
    }

    /// Removes and returns everything pending, kinds in first-seen order.
    /// The next enqueue will ask for a new flush.
    pub fn drain_all(&mut self) -> Vec<(EntityKind, KindIntents)> {
        self.flush_scheduled = false;
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    /// Like [`drain_all`](Self::drain_all), but every drained intent stays
    /// joinable as in-flight until [`settle`](Self::settle) is called for it.
    pub fn take_for_dispatch(&mut self) -> Vec<(EntityKind, KindIntents)> {
        let drained = self.drain_all();
        for intent in drained.iter().flat_map(|(_, by_identity)| by_identity.values().flatten()) {
            self.in_flight
                .entry(intent.identity().clone())
                .or_default()
                .push(InFlight {
                    options: intent.options().clone(),
                    promise: intent.promise(),
                });
        }
        drained
    }

    /// Forgets the in-flight entry behind `promise` once it has settled.
    pub fn settle(&mut self, identity: &EntityIdentity, promise: &Promise<EntityIdentity>) {
        if let Some(entries) = self.in_flight.get_mut(identity) {
            entries.retain(|entry| !entry.promise.same_as(promise));
            if entries.is_empty() {
                self.in_flight.shift_remove(identity);
            }
        }
    }

    /// Promise of the first in-flight fetch of `identity` that already covers
    /// `options`.
    pub fn find_in_flight(
        &self,
        identity: &EntityIdentity,
        options: &FetchOptions,
    ) -> Option<Promise<EntityIdentity>> {
        self.in_flight
            .get(identity)?
            .iter()
            .find(|entry| is_same_request(&entry.options, options))
            .map(|entry| entry.promise.clone())
    }

    /// Number of dispatched fetches that have not settled.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.values().map(Vec::len).sum()
    }

    /// Intents currently pending for `identity`.
    pub fn intents_for(&self, identity: &EntityIdentity) -> &[FetchIntent] {
        self.pending
            .get(identity.kind())
            .and_then(|by_identity| by_identity.get(identity))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Kinds with pending intents, in first-seen order.
    pub fn pending_kinds(&self) -> impl Iterator<Item = &EntityKind> {
        self.pending.keys()
    }

    /// Total number of distinct pending (not yet dispatched) intents.
    pub fn pending_count(&self) -> usize {
        self.pending
            .values()
            .flat_map(|by_identity| by_identity.values())
            .map(Vec::len)
            .sum()
    }

    /// Nothing is waiting for a flush.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether a flush has been requested since the last drain.
    pub fn flush_scheduled(&self) -> bool {
        self.flush_scheduled
    }
}
