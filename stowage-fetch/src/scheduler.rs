//! Coalescing scheduler.
//!
//! Turns one kind's drained intents into a list of network operations:
//! grouped `fetch_many` calls where the backend allows it, individual
//! `fetch_one` calls otherwise.

use crate::backend::{partition_by_size, Backend};
use crate::cache::EntityCache;
use crate::deferred::Promise;
use crate::dispatch::reject_all;
use crate::error::{FetchError, FetchResult};
use crate::intent::FetchIntent;
use crate::registry::KindIntents;
use crate::snapshot::Snapshot;
use std::collections::HashMap;
use std::sync::Arc;
use stowage_types::{EntityIdentity, EntityKind, LocalId};
use tracing::{debug, error, warn};

/// One network operation produced by planning.
#[derive(Debug)]
pub(crate) enum Dispatch {
    /// A single `fetch_one` call settling every listed intent.
    Individual {
        snapshot: Snapshot,
        intents: Vec<FetchIntent>,
    },
    /// One `fetch_many` call for every member.
    Group(Vec<(FetchIntent, Snapshot)>),
}

impl Dispatch {
    pub(crate) fn intent_count(&self) -> usize {
        match self {
            Self::Individual { intents, .. } => intents.len(),
            Self::Group(members) => members.len(),
        }
    }

    /// Identity and promise of every intent this dispatch settles.
    pub(crate) fn markers(&self) -> Vec<(EntityIdentity, Promise<EntityIdentity>)> {
        let intents: Box<dyn Iterator<Item = &FetchIntent> + '_> = match self {
            Self::Individual { intents, .. } => Box::new(intents.iter()),
            Self::Group(members) => Box::new(members.iter().map(|(intent, _)| intent)),
        };
        intents
            .map(|intent| (intent.identity().clone(), intent.promise()))
            .collect()
    }
}

fn snapshot_for(intent: &FetchIntent, cache: &Arc<dyn EntityCache>) -> Snapshot {
    Snapshot::new(
        intent.identity().clone(),
        cache.clone(),
        intent.options().adapter_options.clone(),
        intent.options().include.clone(),
    )
}

fn individual(intent: FetchIntent, cache: &Arc<dyn EntityCache>) -> Dispatch {
    Dispatch::Individual {
        snapshot: snapshot_for(&intent, cache),
        intents: vec![intent],
    }
}

/// Plans the dispatches for one kind.
///
/// Intents that cannot be planned (the backend's partition was invalid) are
/// rejected here so nothing is left pending.
pub(crate) fn plan_kind(
    kind: &EntityKind,
    intents: KindIntents,
    backend: &dyn Backend,
    cache: &Arc<dyn EntityCache>,
    max_batch_size: Option<usize>,
) -> Vec<Dispatch> {
    if !backend.capabilities().supports_batching() {
        return intents
            .into_values()
            .flatten()
            .map(|intent| individual(intent, cache))
            .collect();
    }

    let mut singles = Vec::new();
    let mut duplicates = Vec::new();
    for (_, mut list) in intents {
        match list.len() {
            0 => {}
            1 => singles.extend(list.pop()),
            _ => duplicates.push(list),
        }
    }

    let mut plan = Vec::new();
    if !singles.is_empty() {
        let snapshots: Vec<Snapshot> = singles.iter().map(|i| snapshot_for(i, cache)).collect();
        match partition(kind, backend, &snapshots, max_batch_size) {
            Ok((groups, ungrouped)) => {
                let mut slots: Vec<Option<(FetchIntent, Snapshot)>> =
                    singles.into_iter().zip(snapshots).map(Some).collect();
                for group in groups {
                    let mut members: Vec<(FetchIntent, Snapshot)> =
                        group.into_iter().filter_map(|i| slots[i].take()).collect();
                    match members.len() {
                        0 => {}
                        1 => {
                            let (intent, snapshot) = members.remove(0);
                            plan.push(Dispatch::Individual {
                                snapshot,
                                intents: vec![intent],
                            });
                        }
                        _ => plan.push(Dispatch::Group(members)),
                    }
                }
                for index in ungrouped {
                    if let Some((intent, snapshot)) = slots[index].take() {
                        plan.push(Dispatch::Individual {
                            snapshot,
                            intents: vec![intent],
                        });
                    }
                }
            }
            Err(e) => {
                error!("Could not group pending {} fetches: {}", kind, e);
                reject_all(singles, e);
            }
        }
    }

    for list in duplicates {
        debug!(
            "{} intents for {} survived fingerprinting; fetching once for all",
            list.len(),
            list[0].identity()
        );
        plan.push(Dispatch::Individual {
            snapshot: snapshot_for(&list[0], cache),
            intents: list,
        });
    }

    plan
}

/// Asks the backend to partition `snapshots`, validates the result and maps
/// it to indices. Returns the groups and the indices no group claimed.
fn partition(
    kind: &EntityKind,
    backend: &dyn Backend,
    snapshots: &[Snapshot],
    max_batch_size: Option<usize>,
) -> FetchResult<(Vec<Vec<usize>>, Vec<usize>)> {
    let index_of: HashMap<LocalId, usize> = snapshots
        .iter()
        .enumerate()
        .map(|(i, s)| (s.identity().lid(), i))
        .collect();

    let mut groups = Vec::new();
    let mut claimed = vec![false; snapshots.len()];
    for group in backend.partition_for_batch(snapshots) {
        if group.is_empty() {
            return Err(FetchError::EmptyGroup(kind.to_string()));
        }
        let pieces = match max_batch_size {
            Some(max) if group.len() > max => partition_by_size(&group, max),
            _ => vec![group],
        };
        for piece in pieces {
            let mut indices = Vec::with_capacity(piece.len());
            for snapshot in &piece {
                let index = *index_of
                    .get(&snapshot.identity().lid())
                    .ok_or_else(|| FetchError::UnknownGroupMember(snapshot.identity().to_string()))?;
                if claimed[index] {
                    warn!("{} was placed in more than one group; keeping the first", snapshot.identity());
                    continue;
                }
                claimed[index] = true;
                indices.push(index);
            }
            if !indices.is_empty() {
                groups.push(indices);
            }
        }
    }

    let ungrouped: Vec<usize> = claimed
        .iter()
        .enumerate()
        .filter(|(_, claimed)| !**claimed)
        .map(|(i, _)| i)
        .collect();
    if !ungrouped.is_empty() {
        debug!(
            "{} pending {} fetches were left out of every group; fetching individually",
            ungrouped.len(),
            kind
        );
    }
    Ok((groups, ungrouped))
}
