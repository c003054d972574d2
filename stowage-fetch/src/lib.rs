//! Fetch/save coalescing engine for the Stowage data layer.
//!
//! Many independent call sites can ask for the same entity within one burst
//! of activity, each with slightly different options. The engine fuses those
//! requests into the minimum number of network operations while still
//! settling every caller's promise with the right result or error.
//!
//! # Architecture
//!
//! - **Deferred / Promise**: settle-once handles decoupling callers from the
//!   code that performs the work
//! - **Fingerprint**: decides when a new fetch is satisfied by a pending one
//! - **Registry**: fetch intents collected since the last flush
//! - **Scheduler**: partitions a kind's intents into grouped and individual
//!   network calls
//! - **Dispatch / Save**: perform one backend call each and settle intents
//! - **Manager**: the coordinator callers use
//!
//! Entity storage lives behind [`EntityCache`] and network access behind
//! [`Backend`]; neither is implemented here.
//!
//! ## Fetch flow
//!
//! 1. `schedule_fetch` fingerprints the request against pending intents for
//!    the same identity and either joins one or registers a new intent
//! 2. The first intent of a burst schedules a flush
//! 3. The flush drains the registry and plans each kind separately
//! 4. Grouped responses are attributed back to members by primary key;
//!    missing members are rejected individually
//! 5. Payloads are handed to the cache for ingestion and promises settle
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stowage_fetch::{Backend, Backends, EntityCache, FetchManager, FetchOptions};
//! use stowage_types::IdentityCache;
//!
//! async fn load(backend: Arc<dyn Backend>, cache: Arc<dyn EntityCache>) {
//!     let manager = FetchManager::new(Backends::single(backend), cache);
//!     let mut identities = IdentityCache::new();
//!     let person = identities.get_or_create("person", "1");
//!
//!     let a = manager.schedule_fetch(person.clone(), FetchOptions::new()).unwrap();
//!     let b = manager
//!         .schedule_fetch(person, FetchOptions::new().with_include(""))
//!         .unwrap();
//!     assert!(a.same_as(&b));
//!     let _ = a.await;
//! }
//! ```

mod backend;
mod cache;
mod deferred;
mod dispatch;
mod error;
pub mod fingerprint;
mod intent;
mod manager;
mod options;
pub mod registry;
mod save;
mod scheduler;
mod snapshot;

pub use backend::{partition_by_size, Backend, Backends, Capabilities};
pub use cache::{
    Attributes, EntityCache, IngestContext, Normalized, Payload, Relationship, Relationships,
    RequestKind,
};
pub use deferred::{Deferred, Promise};
pub use error::{FetchError, FetchResult};
pub use fingerprint::is_same_request;
pub use intent::{FetchIntent, IntentState, SaveIntent};
pub use manager::{FetchConfig, FetchManager};
pub use options::{AdapterOptions, FetchOptions, Include, SaveOperation, SaveOptions};
pub use registry::{Enqueued, PendingFetchRegistry};
pub use snapshot::Snapshot;
