//! Save dispatch.

mod common;

use common::{setup, Call};
use pretty_assertions::assert_eq;
use serde_json::json;
use stowage_fetch::{AdapterOptions, Capabilities, FetchError, RequestKind, SaveOperation, SaveOptions};
use stowage_types::EntityIdentity;

fn read_write() -> Capabilities {
    Capabilities::read_only().with_saves()
}

#[tokio::test]
async fn create_assigns_server_id() {
    common::init_tracing();
    let (manager, backend, cache) = setup(read_write());
    let local = cache.create_local("person", json!({ "name": "Grace" }));

    let normalized = manager
        .schedule_save(local.clone(), SaveOptions::create())
        .unwrap()
        .await
        .unwrap()
        .expect("create returns a body");

    let saved = normalized.primary().unwrap();
    assert_eq!(saved, &local);
    assert_eq!(saved.id(), Some("101"));
    assert_eq!(backend.calls(), vec![Call::Create(None)]);
    assert_eq!(cache.attribute(&local, "name"), Some(json!("Grace")));
    assert_eq!(cache.ingests(), vec![RequestKind::Save(SaveOperation::Create)]);
}

#[tokio::test]
async fn concurrent_saves_are_never_coalesced() {
    let (manager, backend, cache) = setup(read_write());
    let person = cache.identity("person", "1");
    cache.load(&person, json!({ "name": "Ada" }));

    let a = manager.schedule_save(person.clone(), SaveOptions::update()).unwrap();
    let b = manager.schedule_save(person.clone(), SaveOptions::update()).unwrap();
    assert!(!a.same_as(&b));

    assert!(a.await.unwrap().is_some());
    assert!(b.await.unwrap().is_some());
    assert_eq!(
        backend.calls(),
        vec![Call::Update("1".into()), Call::Update("1".into())]
    );
}

#[tokio::test]
async fn saves_with_shared_options_still_dispatch_separately() {
    let (manager, backend, cache) = setup(read_write());
    let person = cache.identity("person", "1");
    let shared = AdapterOptions::from_value(json!({ "validate": true }));

    let a = manager
        .schedule_save(person.clone(), SaveOptions::update().with_adapter_options(shared.clone()))
        .unwrap();
    let b = manager
        .schedule_save(person, SaveOptions::update().with_adapter_options(shared))
        .unwrap();
    a.await.unwrap();
    b.await.unwrap();
    assert_eq!(backend.call_count(), 2);
}

#[tokio::test]
async fn delete_without_body_resolves_empty() {
    let (manager, backend, cache) = setup(read_write());
    let person = cache.identity("person", "1");

    let result = manager
        .schedule_save(person, SaveOptions::delete())
        .unwrap()
        .await
        .unwrap();
    assert_eq!(result, None);
    assert_eq!(backend.calls(), vec![Call::Delete("1".into())]);
    assert!(cache.ingests().is_empty());
}

#[tokio::test]
async fn save_is_dispatched_without_waiting_for_a_flush() {
    let (manager, backend, cache) = setup(read_write());
    let person = cache.identity("person", "1");

    let promise = manager.schedule_save(person, SaveOptions::update()).unwrap();
    tokio::task::yield_now().await;
    assert_eq!(backend.call_count(), 1);
    assert_eq!(manager.pending_count(), 0);
    promise.await.unwrap();
}

#[tokio::test]
async fn failed_save_rejects() {
    let (manager, backend, cache) = setup(read_write());
    backend.mark_failing("1");
    let person = cache.identity("person", "1");

    let err = manager
        .schedule_save(person, SaveOptions::update())
        .unwrap()
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::Backend("422 for 1".into()));
}

#[tokio::test]
async fn unsupported_operation_fails_immediately() {
    let (manager, backend, cache) = setup(Capabilities::read_only());
    let person = cache.identity("person", "1");

    let err = manager
        .schedule_save(person, SaveOptions::delete())
        .unwrap_err();
    assert_eq!(
        err,
        FetchError::Unsupported {
            kind: "person".into(),
            operation: "deleteRecord".into(),
        }
    );
    assert!(err.is_programming_error());
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn update_without_id_fails_immediately() {
    let (manager, _backend, _cache) = setup(read_write());
    let err = manager
        .schedule_save(EntityIdentity::local("person"), SaveOptions::update())
        .unwrap_err();
    assert!(matches!(err, FetchError::MissingId(_)));
}

#[tokio::test]
async fn save_settles_after_destroy_without_ingest() {
    let (manager, backend, cache) = setup(read_write());
    let gate = backend.gate();
    let person = cache.identity("person", "1");

    let promise = manager.schedule_save(person, SaveOptions::update()).unwrap();
    while backend.call_count() == 0 {
        tokio::task::yield_now().await;
    }
    manager.destroy();
    gate.notify_one();

    assert_eq!(promise.await.unwrap(), None);
    assert!(cache.ingests().is_empty());
}
