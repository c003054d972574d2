//! Request fingerprinting.
//!
//! Decides whether a new fetch intent for an identity is already satisfied by
//! one that is pending for the same identity.

use crate::intent::FetchIntent;
use crate::options::FetchOptions;

/// Returns `true` if `incoming` can be served by the request described by
/// `existing`.
///
/// Adapter options must be absent on `incoming` or be the very same
/// allocation as `existing`'s. Include paths must be absent on `incoming`,
/// or a subset of what `existing` already includes.
pub fn is_same_request(existing: &FetchOptions, incoming: &FetchOptions) -> bool {
    adapter_options_compatible(existing, incoming) && include_compatible(existing, incoming)
}

fn adapter_options_compatible(existing: &FetchOptions, incoming: &FetchOptions) -> bool {
    match (incoming.effective_adapter_options(), existing.adapter_options.as_ref()) {
        (None, _) => true,
        (Some(wanted), Some(have)) => wanted.same_as(have),
        (Some(_), None) => false,
    }
}

fn include_compatible(existing: &FetchOptions, incoming: &FetchOptions) -> bool {
    let Some(wanted) = incoming.include_paths() else {
        return true;
    };
    let Some(have) = existing.include_paths() else {
        return false;
    };
    wanted.is_subset(&have)
}

/// Index of the first intent (in insertion order) that already covers
/// `options`.
pub fn find_matching(intents: &[FetchIntent], options: &FetchOptions) -> Option<usize> {
    intents
        .iter()
        .position(|intent| is_same_request(intent.options(), options))
}
