//! Shared test helpers: a recording backend and an in-memory entity cache.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use stowage_fetch::{
    Attributes, Backend, Backends, Capabilities, EntityCache, FetchError, FetchManager,
    FetchResult, IngestContext, Normalized, Payload, Relationship, Relationships, RequestKind,
    SaveOperation, Snapshot,
};
use stowage_types::{EntityIdentity, EntityKind, IdentityCache};
use tokio::sync::Notify;

/// One backend call as recorded by [`MockBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FetchOne(String),
    FetchMany(Vec<String>),
    Create(Option<String>),
    Update(String),
    Delete(String),
}

/// Backend that serves every id except those marked missing or failing.
pub struct MockBackend {
    capabilities: Capabilities,
    calls: Mutex<Vec<Call>>,
    missing: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    fail_many: Mutex<bool>,
    extra: Mutex<Vec<String>>,
    max_group: Mutex<Option<usize>>,
    empty_group: Mutex<bool>,
    blank_payload: Mutex<bool>,
    malformed_payload: Mutex<bool>,
    gate: Mutex<Option<Arc<Notify>>>,
    next_id: Mutex<u32>,
}

impl MockBackend {
    pub fn new(capabilities: Capabilities) -> Arc<Self> {
        Arc::new(Self {
            capabilities,
            calls: Mutex::new(Vec::new()),
            missing: Mutex::new(HashSet::new()),
            failing: Mutex::new(HashSet::new()),
            fail_many: Mutex::new(false),
            extra: Mutex::new(Vec::new()),
            max_group: Mutex::new(None),
            empty_group: Mutex::new(false),
            blank_payload: Mutex::new(false),
            malformed_payload: Mutex::new(false),
            gate: Mutex::new(None),
            next_id: Mutex::new(100),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// The backend answers as if `id` does not exist.
    pub fn mark_missing(&self, id: &str) {
        self.missing.lock().unwrap().insert(id.to_string());
    }

    /// Fetching `id` individually fails with a transport error.
    pub fn mark_failing(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_grouped(&self) {
        *self.fail_many.lock().unwrap() = true;
    }

    /// Grouped responses also carry these unrequested ids.
    pub fn add_extra(&self, id: &str) {
        self.extra.lock().unwrap().push(id.to_string());
    }

    pub fn limit_group_size(&self, max: usize) {
        *self.max_group.lock().unwrap() = Some(max);
    }

    pub fn return_empty_group(&self) {
        *self.empty_group.lock().unwrap() = true;
    }

    pub fn return_blank_payload(&self) {
        *self.blank_payload.lock().unwrap() = true;
    }

    /// Fetch responses are non-empty but carry no usable `data`, so ingest fails.
    pub fn return_malformed_payload(&self) {
        *self.malformed_payload.lock().unwrap() = true;
    }

    /// Holds every call until the returned notifier is triggered.
    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    async fn wait_for_gate(&self) {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

fn resource(kind: &EntityKind, id: &str) -> Value {
    json!({ "type": kind.as_str(), "id": id, "attributes": { "name": format!("{kind} {id}") } })
}

#[async_trait]
impl Backend for MockBackend {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn fetch_one(&self, identity: &EntityIdentity, _snapshot: &Snapshot) -> FetchResult<Payload> {
        let id = identity.id().unwrap_or_default().to_string();
        self.record(Call::FetchOne(id.clone()));
        self.wait_for_gate().await;

        if *self.blank_payload.lock().unwrap() {
            return Ok(Value::Null);
        }
        if *self.malformed_payload.lock().unwrap() {
            return Ok(json!({ "data": "unavailable" }));
        }
        if self.failing.lock().unwrap().contains(&id) {
            return Err(FetchError::Backend(format!("connection reset fetching {id}")));
        }
        if self.missing.lock().unwrap().contains(&id) {
            return Err(FetchError::Backend(format!("404 for {id}")));
        }
        Ok(json!({ "data": resource(identity.kind(), &id) }))
    }

    async fn fetch_many(&self, identities: &[EntityIdentity], _snapshots: &[Snapshot]) -> FetchResult<Payload> {
        let ids: Vec<String> = identities
            .iter()
            .map(|i| i.id().unwrap_or_default().to_string())
            .collect();
        self.record(Call::FetchMany(ids.clone()));
        self.wait_for_gate().await;

        if *self.fail_many.lock().unwrap() {
            return Err(FetchError::Backend("503 service unavailable".into()));
        }
        if *self.malformed_payload.lock().unwrap() {
            return Ok(json!({ "data": "unavailable" }));
        }
        let kind = identities[0].kind();
        let missing = self.missing.lock().unwrap().clone();
        let mut data: Vec<Value> = ids
            .iter()
            .filter(|id| !missing.contains(*id))
            .map(|id| resource(kind, id))
            .collect();
        data.extend(self.extra.lock().unwrap().iter().map(|id| resource(kind, id)));
        Ok(json!({ "data": data }))
    }

    fn partition_for_batch(&self, snapshots: &[Snapshot]) -> Vec<Vec<Snapshot>> {
        if *self.empty_group.lock().unwrap() {
            return vec![snapshots.to_vec(), Vec::new()];
        }
        match *self.max_group.lock().unwrap() {
            Some(max) => stowage_fetch::partition_by_size(snapshots, max),
            None => vec![snapshots.to_vec()],
        }
    }

    async fn create(&self, snapshot: &Snapshot) -> FetchResult<Option<Payload>> {
        self.record(Call::Create(snapshot.id().map(str::to_string)));
        self.wait_for_gate().await;
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            next.to_string()
        };
        let mut body = resource(snapshot.kind(), &id);
        body["attributes"] = Value::Object(snapshot.attributes().clone());
        Ok(Some(json!({ "data": body })))
    }

    async fn update(&self, snapshot: &Snapshot) -> FetchResult<Option<Payload>> {
        let id = snapshot.id().unwrap_or_default().to_string();
        self.record(Call::Update(id.clone()));
        self.wait_for_gate().await;
        if self.failing.lock().unwrap().contains(&id) {
            return Err(FetchError::Backend(format!("422 for {id}")));
        }
        Ok(Some(json!({ "data": resource(snapshot.kind(), &id) })))
    }

    async fn delete(&self, snapshot: &Snapshot) -> FetchResult<Option<Payload>> {
        self.record(Call::Delete(snapshot.id().unwrap_or_default().to_string()));
        self.wait_for_gate().await;
        Ok(None)
    }
}

/// In-memory cache that ingests `{ "data": ..., "included": [...] }` payloads.
#[derive(Default)]
pub struct MemoryCache {
    identities: Mutex<IdentityCache>,
    records: Mutex<HashMap<EntityIdentity, Attributes>>,
    relationships: Mutex<HashMap<EntityIdentity, Relationships>>,
    placeholders: Mutex<HashSet<EntityIdentity>>,
    new_records: Mutex<HashSet<EntityIdentity>>,
    deleted: Mutex<HashSet<EntityIdentity>>,
    released: Mutex<Vec<EntityIdentity>>,
    supplementary: Mutex<Vec<EntityIdentity>>,
    ingests: Mutex<Vec<RequestKind>>,
}

impl MemoryCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Interned identity for a server-known entity; registers a placeholder.
    pub fn identity(&self, kind: &str, id: &str) -> EntityIdentity {
        let identity = self.identities.lock().unwrap().get_or_create(kind, id);
        if !self.records.lock().unwrap().contains_key(&identity) {
            self.placeholders.lock().unwrap().insert(identity.clone());
        }
        identity
    }

    /// A locally created entity with the given attributes.
    pub fn create_local(&self, kind: &str, attributes: Value) -> EntityIdentity {
        let identity = self.identities.lock().unwrap().create_local(kind);
        self.new_records.lock().unwrap().insert(identity.clone());
        if let Value::Object(map) = attributes {
            self.records.lock().unwrap().insert(identity.clone(), map);
        }
        identity
    }

    /// Marks an entity as loaded with the given attributes.
    pub fn load(&self, identity: &EntityIdentity, attributes: Value) {
        self.placeholders.lock().unwrap().remove(identity);
        if let Value::Object(map) = attributes {
            self.records.lock().unwrap().insert(identity.clone(), map);
        }
    }

    pub fn set_relationship(&self, identity: &EntityIdentity, name: &str, relationship: Relationship) {
        self.relationships
            .lock()
            .unwrap()
            .entry(identity.clone())
            .or_default()
            .insert(name.to_string(), relationship);
    }

    pub fn mark_deleted(&self, identity: &EntityIdentity) {
        self.deleted.lock().unwrap().insert(identity.clone());
    }

    pub fn released(&self) -> Vec<EntityIdentity> {
        self.released.lock().unwrap().clone()
    }

    pub fn supplementary(&self) -> Vec<EntityIdentity> {
        self.supplementary.lock().unwrap().clone()
    }

    pub fn ingests(&self) -> Vec<RequestKind> {
        self.ingests.lock().unwrap().clone()
    }

    pub fn has_placeholder(&self, identity: &EntityIdentity) -> bool {
        self.placeholders.lock().unwrap().contains(identity)
    }

    pub fn attribute(&self, identity: &EntityIdentity, name: &str) -> Option<Value> {
        self.records
            .lock()
            .unwrap()
            .get(identity)
            .and_then(|attrs| attrs.get(name).cloned())
    }

    fn store_resource(&self, value: &Value, context: &IngestContext) -> FetchResult<EntityIdentity> {
        let kind = value["type"]
            .as_str()
            .ok_or_else(|| FetchError::Ingest("resource without type".into()))?;
        let id = value["id"]
            .as_str()
            .ok_or_else(|| FetchError::Ingest("resource without id".into()))?;

        let identity = match (context.request, context.requested.first()) {
            (RequestKind::Save(SaveOperation::Create), Some(local)) if !local.has_id() => self
                .identities
                .lock()
                .unwrap()
                .assign_id(local, id)
                .map_err(|e| FetchError::Ingest(e.to_string()))?,
            _ => self.identities.lock().unwrap().get_or_create(kind, id),
        };

        let attributes = value["attributes"].as_object().cloned().unwrap_or_default();
        self.new_records.lock().unwrap().remove(&identity);
        self.load(&identity, Value::Object(attributes));
        Ok(identity)
    }
}

#[async_trait]
impl EntityCache for MemoryCache {
    fn is_loaded(&self, identity: &EntityIdentity) -> bool {
        self.records.lock().unwrap().contains_key(identity)
    }

    fn is_empty(&self, identity: &EntityIdentity) -> bool {
        self.placeholders.lock().unwrap().contains(identity)
    }

    fn is_new(&self, identity: &EntityIdentity) -> bool {
        self.new_records.lock().unwrap().contains(identity)
    }

    fn is_deleted(&self, identity: &EntityIdentity) -> bool {
        self.deleted.lock().unwrap().contains(identity)
    }

    fn attributes_of(&self, identity: &EntityIdentity) -> Option<Attributes> {
        self.records.lock().unwrap().get(identity).cloned()
    }

    fn relationships_of(&self, identity: &EntityIdentity) -> Option<Relationships> {
        self.relationships.lock().unwrap().get(identity).cloned()
    }

    async fn ingest(&self, payload: Payload, context: &IngestContext) -> FetchResult<Normalized> {
        self.ingests.lock().unwrap().push(context.request);

        let mut normalized = match &payload["data"] {
            Value::Array(items) => Normalized::many(
                items
                    .iter()
                    .map(|item| self.store_resource(item, context))
                    .collect::<FetchResult<Vec<_>>>()?,
            ),
            Value::Object(_) => Normalized::single(self.store_resource(&payload["data"], context)?),
            _ => return Err(FetchError::Ingest("payload has no data".into())),
        };
        if let Value::Array(items) = &payload["included"] {
            normalized.included = items
                .iter()
                .map(|item| self.store_resource(item, context))
                .collect::<FetchResult<Vec<_>>>()?;
        }
        Ok(normalized)
    }

    fn release_placeholder(&self, identity: &EntityIdentity) {
        self.placeholders.lock().unwrap().remove(identity);
        self.released.lock().unwrap().push(identity.clone());
    }

    fn accept_supplementary(&self, identities: &[EntityIdentity]) {
        self.supplementary.lock().unwrap().extend_from_slice(identities);
    }
}

/// A manager with one backend for every kind.
pub fn setup(capabilities: Capabilities) -> (FetchManager, Arc<MockBackend>, Arc<MemoryCache>) {
    let backend = MockBackend::new(capabilities);
    let cache = MemoryCache::new();
    let manager = FetchManager::new(Backends::single(backend.clone()), cache.clone());
    (manager, backend, cache)
}

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
