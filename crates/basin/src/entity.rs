// ── Entity identity and record types ──
//
// An Entity is a JSON-object row with a structurally required string id.
// Everything beyond the id is opaque to the store: fields are carried
// verbatim and merged shallowly, never interpreted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

// ── EntityId ────────────────────────────────────────────────────────

/// Opaque identifier for an entity, supplied by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ── Entity ──────────────────────────────────────────────────────────

/// One record in an entity map.
///
/// The id is a first-class field; all remaining fields ride along in
/// `fields` via `#[serde(flatten)]`, so nothing a record store sends is
/// dropped. An id-less entity is unrepresentable -- conversions from
/// raw JSON reject objects without a non-empty string `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,

    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            fields: serde_json::Map::new(),
        }
    }

    /// Builder-style field assignment, mostly for tests and seeding.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Look up a field by name (`id` is not a field).
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Parse an entity from a raw JSON row.
    ///
    /// The row must be an object carrying a non-empty string `id`.
    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        let entity: Self = serde_json::from_value(value).map_err(|e| {
            StoreError::invalid(format!("entity row must be an object with a string id: {e}"))
        })?;

        if entity.id.as_str().is_empty() {
            return Err(StoreError::invalid("entity row has an empty id"));
        }
        Ok(entity)
    }

    /// Rebuild the raw JSON row, id included.
    pub fn to_value(&self) -> Value {
        let mut row = serde_json::Map::with_capacity(self.fields.len() + 1);
        row.insert("id".to_owned(), Value::String(self.id.as_str().to_owned()));
        row.extend(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Value::Object(row)
    }
}
