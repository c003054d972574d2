//! Save dispatch.
//!
//! One backend call per save, no coalescing.

use crate::backend::Backend;
use crate::cache::{IngestContext, Payload, RequestKind};
use crate::error::FetchResult;
use crate::intent::SaveIntent;
use crate::manager::Inner;
use crate::options::SaveOperation;
use crate::snapshot::Snapshot;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs one save and settles its intent.
pub(crate) async fn dispatch_save(inner: Arc<Inner>, backend: Arc<dyn Backend>, intent: SaveIntent) {
    let (operation, snapshot, deferred) = intent.into_parts();
    let identity = snapshot.identity().clone();
    debug!("Dispatching {} for {}", operation, identity);

    let response = call_backend(backend.as_ref(), operation, &snapshot).await;
    let result = match response {
        Ok(None) => Ok(None),
        Ok(Some(payload)) if is_absent(&payload) => Ok(None),
        Ok(Some(_)) if !inner.is_alive() => {
            warn!(
                "{} for {} settled after the manager was destroyed; skipping ingest",
                operation, identity
            );
            Ok(None)
        }
        Ok(Some(payload)) => {
            let context = IngestContext {
                kind: identity.kind().clone(),
                request: RequestKind::Save(operation),
                requested: vec![identity.clone()],
                op: Some(operation.to_string()),
            };
            inner.cache.ingest(payload, &context).await.map(Some)
        }
        Err(e) => Err(e),
    };

    if let Err(e) = &result {
        warn!("{} for {} failed: {}", operation, identity, e);
    }
    deferred.settle(result);
}

async fn call_backend(
    backend: &dyn Backend,
    operation: SaveOperation,
    snapshot: &Snapshot,
) -> FetchResult<Option<Payload>> {
    match operation {
        SaveOperation::Create => backend.create(snapshot).await,
        SaveOperation::Update => backend.update(snapshot).await,
        SaveOperation::Delete => backend.delete(snapshot).await,
    }
}

/// No body, or an empty one, is a successful save with nothing to ingest.
fn is_absent(payload: &Payload) -> bool {
    match payload {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
