// ── Mutation / action payloads ──

use basin_feed::ChangeRecord;
use serde_json::Value;

use crate::entity::{Entity, EntityId};
use crate::error::StoreError;

/// What a `commit` or `dispatch` carries.
///
/// The bridge always commits [`Payload::Change`] with the delivered
/// record verbatim; direct callers usually pass entities or raw JSON
/// and lean on the `From` impls. The extractors below do the payload
/// coercion mutation factories need, rejecting shapes that don't fit
/// with [`StoreError::InvalidArgument`].
#[derive(Debug, Clone)]
pub enum Payload {
    /// A change record delivered by the feed. Mutations read its `row`.
    Change(ChangeRecord),
    /// A single entity.
    Entity(Entity),
    /// A batch of entities.
    Entities(Vec<Entity>),
    /// Raw JSON.
    Value(Value),
}

impl Payload {
    /// Empty payload for commits and dispatches that carry nothing.
    pub fn none() -> Self {
        Self::Value(Value::Null)
    }

    /// Coerce into one entity.
    pub fn into_entity(self) -> Result<Entity, StoreError> {
        match self {
            Self::Entity(entity) => Ok(entity),
            Self::Change(record) => Entity::from_value(record.row),
            Self::Value(value) => Entity::from_value(value),
            Self::Entities(_) => Err(StoreError::invalid(
                "expected a single entity, got a batch",
            )),
        }
    }

    /// Coerce into a batch of entities. A JSON array converts element by
    /// element; a single entity becomes a batch of one.
    pub fn into_entities(self) -> Result<Vec<Entity>, StoreError> {
        match self {
            Self::Entities(entities) => Ok(entities),
            Self::Entity(entity) => Ok(vec![entity]),
            Self::Change(record) => Self::Value(record.row).into_entities(),
            Self::Value(Value::Array(rows)) => {
                rows.into_iter().map(Entity::from_value).collect()
            }
            Self::Value(value) => Ok(vec![Entity::from_value(value)?]),
        }
    }

    /// Coerce into an entity id: an entity's own id, a row's `id` field,
    /// or a bare JSON string.
    pub fn into_entity_id(self) -> Result<EntityId, StoreError> {
        match self {
            Self::Entity(entity) => Ok(entity.id),
            Self::Change(record) => Self::Value(record.row).into_entity_id(),
            Self::Value(Value::String(id)) if !id.is_empty() => Ok(EntityId::from(id)),
            Self::Value(Value::Object(row)) => match row.get("id").and_then(Value::as_str) {
                Some(id) if !id.is_empty() => Ok(EntityId::from(id)),
                _ => Err(StoreError::invalid("row has no usable id")),
            },
            Self::Value(_) => Err(StoreError::invalid(
                "expected an entity, a row object, or an id string",
            )),
            Self::Entities(_) => Err(StoreError::invalid(
                "expected a single id, got a batch",
            )),
        }
    }

    /// The raw JSON this payload carries. For a change record that is
    /// its `row`.
    pub fn into_value(self) -> Value {
        match self {
            Self::Change(record) => record.row,
            Self::Entity(entity) => entity.to_value(),
            Self::Entities(entities) => {
                Value::Array(entities.iter().map(Entity::to_value).collect())
            }
            Self::Value(value) => value,
        }
    }
}

impl From<ChangeRecord> for Payload {
    fn from(record: ChangeRecord) -> Self {
        Self::Change(record)
    }
}

impl From<Entity> for Payload {
    fn from(entity: Entity) -> Self {
        Self::Entity(entity)
    }
}

impl From<Vec<Entity>> for Payload {
    fn from(entities: Vec<Entity>) -> Self {
        Self::Entities(entities)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}
