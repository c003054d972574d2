//! Caller-supplied request options.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Relationship paths to side-load with a fetch.
///
/// Accepts either the comma-separated form (`"comments,author"`) or an
/// explicit list. Both normalize to the same sorted set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Include {
    Csv(String),
    Paths(Vec<String>),
}

impl Include {
    /// Sorted, de-duplicated paths with blank segments dropped.
    pub fn normalize(&self) -> BTreeSet<String> {
        let paths: Box<dyn Iterator<Item = &str> + '_> = match self {
            Self::Csv(csv) => Box::new(csv.split(',')),
            Self::Paths(paths) => Box::new(paths.iter().map(String::as_str)),
        };
        paths
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// An include with no non-blank paths is the same as no include.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Csv(csv) => csv.split(',').all(|p| p.trim().is_empty()),
            Self::Paths(paths) => paths.iter().all(|p| p.trim().is_empty()),
        }
    }
}

impl From<&str> for Include {
    fn from(csv: &str) -> Self {
        Self::Csv(csv.to_string())
    }
}

impl From<String> for Include {
    fn from(csv: String) -> Self {
        Self::Csv(csv)
    }
}

impl From<Vec<String>> for Include {
    fn from(paths: Vec<String>) -> Self {
        Self::Paths(paths)
    }
}

impl From<Vec<&str>> for Include {
    fn from(paths: Vec<&str>) -> Self {
        Self::Paths(paths.into_iter().map(str::to_string).collect())
    }
}

/// Backend-specific options passed through untouched.
///
/// Two option sets are only ever considered the same request when they are
/// the *same allocation*: structurally equal maps built separately are
/// treated as materially different requests.
#[derive(Debug, Clone)]
pub struct AdapterOptions(Arc<Map<String, Value>>);

impl AdapterOptions {
    /// Wraps an options map in a new shared allocation.
    pub fn new(options: Map<String, Value>) -> Self {
        Self(Arc::new(options))
    }

    /// Builds options from a JSON object. Non-object values yield an empty set.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::new(map),
            _ => Self::new(Map::new()),
        }
    }

    /// Looks up one option by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Whether no options are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reference identity, not structural equality.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Options for a fetch intent.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Fetch even if the entity is already loaded.
    pub reload: bool,
    /// Resolve immediately from cache but refresh in the background.
    /// `None` defers to the manager's configuration.
    pub background_reload: Option<bool>,
    pub include: Option<Include>,
    pub adapter_options: Option<AdapterOptions>,
    /// Free-form tag describing the caller's operation, forwarded to ingestion.
    pub op: Option<String>,
}

impl FetchOptions {
    /// Creates options for a plain fetch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether a loaded entity is fetched again.
    pub fn with_reload(mut self, reload: bool) -> Self {
        self.reload = reload;
        self
    }

    /// Overrides the manager's background reload setting for this call.
    pub fn with_background_reload(mut self, background_reload: bool) -> Self {
        self.background_reload = Some(background_reload);
        self
    }

    /// Sets the relationship paths to side-load.
    pub fn with_include(mut self, include: impl Into<Include>) -> Self {
        self.include = Some(include.into());
        self
    }

    /// Attaches backend-specific options.
    pub fn with_adapter_options(mut self, options: AdapterOptions) -> Self {
        self.adapter_options = Some(options);
        self
    }

    /// Tags the request with the caller's operation name.
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Include paths, or `None` when nothing non-blank was requested.
    pub fn include_paths(&self) -> Option<BTreeSet<String>> {
        self.include
            .as_ref()
            .filter(|include| !include.is_empty())
            .map(Include::normalize)
    }

    /// Adapter options, or `None` when absent or empty.
    pub fn effective_adapter_options(&self) -> Option<&AdapterOptions> {
        self.adapter_options.as_ref().filter(|opts| !opts.is_empty())
    }
}

/// The mutation a save performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SaveOperation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for SaveOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("createRecord"),
            Self::Update => f.write_str("updateRecord"),
            Self::Delete => f.write_str("deleteRecord"),
        }
    }
}

/// Options for a save intent.
#[derive(Debug, Clone)]
pub struct SaveOptions {
    pub operation: SaveOperation,
    pub adapter_options: Option<AdapterOptions>,
}

impl SaveOptions {
    /// Creates save options for `operation`.
    pub fn new(operation: SaveOperation) -> Self {
        Self {
            operation,
            adapter_options: None,
        }
    }

    /// Options for creating a new entity.
    pub fn create() -> Self {
        Self::new(SaveOperation::Create)
    }

    /// Options for updating an existing entity.
    pub fn update() -> Self {
        Self::new(SaveOperation::Update)
    }

    /// Options for deleting an existing entity.
    pub fn delete() -> Self {
        Self::new(SaveOperation::Delete)
    }

    /// Attaches backend-specific options.
    pub fn with_adapter_options(mut self, options: AdapterOptions) -> Self {
        self.adapter_options = Some(options);
        self
    }
}
