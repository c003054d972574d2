//! Individual and grouped fetch dispatch.
//!
//! Each function performs exactly one backend call and settles every intent
//! it was given, whatever the outcome.

use crate::backend::Backend;
use crate::cache::{IngestContext, Payload, RequestKind};
use crate::error::{FetchError, FetchResult};
use crate::intent::{FetchIntent, IntentState};
use crate::manager::Inner;
use crate::snapshot::Snapshot;
use serde_json::Value;
use std::collections::HashSet;
use stowage_types::EntityIdentity;
use tracing::{debug, warn};

/// Fetches one identity and settles every intent bound to it.
///
/// `intents` holds more than one entry only when several non-equivalent
/// intents survived fingerprinting and the backend groups requests; reads
/// are idempotent so one response serves them all.
pub(crate) async fn fetch_individual(
    inner: &Inner,
    backend: &dyn Backend,
    snapshot: Snapshot,
    mut intents: Vec<FetchIntent>,
) {
    let identity = snapshot.identity().clone();
    if !identity.has_id() {
        reject_all(intents, FetchError::missing_id(&identity));
        return;
    }

    for intent in &mut intents {
        intent.advance(IntentState::DispatchedIndividually);
    }
    let was_loaded = inner.cache.is_loaded(&identity);
    let op = intents.first().and_then(|i| i.options().op.clone());

    debug!("Fetching {} ({} waiting)", identity, intents.len());
    let result = match backend.fetch_one(&identity, &snapshot).await {
        Ok(payload) => validate_payload(payload, &identity, false),
        Err(e) => Err(e),
    };

    let result = match result {
        Ok(payload) if !inner.is_alive() => {
            warn!(
                "Fetch of {} settled after the manager was destroyed; skipping ingest",
                identity
            );
            drop(payload);
            Ok(())
        }
        Ok(payload) => {
            let context = IngestContext {
                kind: identity.kind().clone(),
                request: RequestKind::FindRecord,
                requested: vec![identity.clone()],
                op,
            };
            inner.cache.ingest(payload, &context).await.map(|normalized| {
                if let Some(primary) = normalized.primary() {
                    if primary.id() != identity.id() {
                        warn!(
                            "Fetch of {} returned primary entity {}; resolving with the requested identity",
                            identity, primary
                        );
                    }
                }
            })
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => resolve_all(intents, &identity),
        Err(e) => {
            warn!("Fetch of {} failed: {}", identity, e);
            release_if_unloaded(inner, &identity, was_loaded);
            reject_all(intents, e);
        }
    }
}

/// Fetches a group of identities with one `fetch_many` call and attributes
/// the response back to each member by primary key.
pub(crate) async fn fetch_group(
    inner: &Inner,
    backend: &dyn Backend,
    members: Vec<(FetchIntent, Snapshot)>,
) {
    let (mut intents, snapshots): (Vec<FetchIntent>, Vec<Snapshot>) = members.into_iter().unzip();
    let identities: Vec<EntityIdentity> = snapshots.iter().map(|s| s.identity().clone()).collect();
    let Some(kind) = identities.first().map(|i| i.kind().clone()) else {
        return;
    };

    for intent in &mut intents {
        intent.advance(IntentState::DispatchedInGroup);
    }
    let was_loaded: Vec<bool> = identities.iter().map(|i| inner.cache.is_loaded(i)).collect();

    debug!("Fetching {} {} entities in one request", identities.len(), kind);
    let payload = match backend.fetch_many(&identities, &snapshots).await {
        Ok(payload) => validate_payload(payload, &identities[0], true),
        Err(e) => Err(e),
    };

    let payload = match payload {
        Ok(payload) => payload,
        Err(e) => {
            warn!(
                "Grouped fetch of {} {} entities failed: {}",
                identities.len(),
                kind,
                e
            );
            for (identity, loaded) in identities.iter().zip(&was_loaded) {
                release_if_unloaded(inner, identity, *loaded);
            }
            reject_all(intents, e);
            return;
        }
    };

    if !inner.is_alive() {
        warn!(
            "Grouped fetch of {} {} entities settled after the manager was destroyed; skipping ingest",
            identities.len(),
            kind
        );
        for (intent, identity) in intents.into_iter().zip(&identities) {
            intent.resolve(identity.clone());
        }
        return;
    }

    let context = IngestContext {
        kind: kind.clone(),
        request: RequestKind::FindMany,
        requested: identities.clone(),
        op: intents.first().and_then(|i| i.options().op.clone()),
    };
    let normalized = match inner.cache.ingest(payload, &context).await {
        Ok(normalized) => normalized,
        Err(e) => {
            warn!("Ingesting grouped {} response failed: {}", kind, e);
            for (identity, loaded) in identities.iter().zip(&was_loaded) {
                release_if_unloaded(inner, identity, *loaded);
            }
            reject_all(intents, e);
            return;
        }
    };

    let returned: HashSet<&str> = normalized
        .data
        .iter()
        .filter(|i| *i.kind() == kind)
        .filter_map(EntityIdentity::id)
        .collect();

    let supplementary: Vec<EntityIdentity> = normalized
        .data
        .iter()
        .filter(|returned| {
            !identities.iter().any(|requested| {
                *returned == requested
                    || requested.id().is_some_and(|id| returned.matches(&kind, id))
            })
        })
        .cloned()
        .collect();
    if !supplementary.is_empty() {
        debug!(
            "Grouped {} response carried {} unrequested entities",
            kind,
            supplementary.len()
        );
        inner.cache.accept_supplementary(&supplementary);
    }

    let mut missing = Vec::new();
    for ((intent, identity), loaded) in intents.into_iter().zip(&identities).zip(&was_loaded) {
        let found = identity.id().is_some_and(|id| returned.contains(id));
        if found {
            intent.resolve(identity.clone());
        } else {
            release_if_unloaded(inner, identity, *loaded);
            intent.reject(FetchError::NotFoundInBatch(identity.to_string()));
            missing.push(identity.to_string());
        }
    }

    if !missing.is_empty() {
        warn!(
            "Expected {} in the grouped {} response but they were missing: {}",
            if missing.len() == 1 { "an entity" } else { "entities" },
            kind,
            missing.join(", ")
        );
    }
}

/// Rejects empty or blank payloads. A grouped response may be an empty list
/// (every member is then reported missing).
pub(crate) fn validate_payload(
    payload: Payload,
    identity: &EntityIdentity,
    allow_empty_list: bool,
) -> FetchResult<Payload> {
    let blank = match &payload {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty() && !allow_empty_list,
        Value::Bool(_) | Value::Number(_) => false,
    };
    if blank {
        Err(FetchError::EmptyPayload(identity.to_string()))
    } else {
        Ok(payload)
    }
}

fn release_if_unloaded(inner: &Inner, identity: &EntityIdentity, was_loaded: bool) {
    if !was_loaded && inner.is_alive() {
        debug!("Releasing placeholder for {}", identity);
        inner.cache.release_placeholder(identity);
    }
}

fn resolve_all(intents: Vec<FetchIntent>, identity: &EntityIdentity) {
    for intent in intents {
        intent.resolve(identity.clone());
    }
}

pub(crate) fn reject_all(intents: Vec<FetchIntent>, error: FetchError) {
    for intent in intents {
        intent.reject(error.clone());
    }
}
