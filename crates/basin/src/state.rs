// ── Module state: entity maps and plain values ──
//
// EntityMap carries the four-operation algebra every map-shaped state
// field supports. ModuleState is one module's named fields: entity maps
// plus arbitrary plain JSON values.
//
// Every operation validates and converts before touching the map, so a
// failed call leaves the state exactly as it found it.

use indexmap::IndexMap;
use serde_json::Value;

use crate::entity::{Entity, EntityId};
use crate::error::StoreError;

// ── EntityMap ───────────────────────────────────────────────────────

/// An id-indexed collection of [`Entity`] records.
///
/// Iteration order is insertion order, so snapshots are deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityMap {
    entries: IndexMap<EntityId, Entity>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard the current contents and index `entities` by id.
    ///
    /// Afterwards the key set is exactly the ids of `entities` -- stale
    /// keys are gone. Duplicate ids keep the last occurrence.
    pub fn replace_all(&mut self, entities: Vec<Entity>) {
        self.entries.clear();
        for entity in entities {
            self.entries.insert(entity.id.clone(), entity);
        }
    }

    /// Add `entity` under its id, fully replacing any previous record.
    pub fn insert_or_replace(&mut self, entity: Entity) {
        self.entries.insert(entity.id.clone(), entity);
    }

    /// Delete the record at `id`. The key is absent afterwards, not
    /// mapped to a null. Removing a missing id is a no-op.
    pub fn remove(&mut self, id: &EntityId) -> Option<Entity> {
        self.entries.shift_remove(id)
    }

    /// Shallow-merge a JSON patch into the record at `patch["id"]`.
    ///
    /// The patch must be an object with a non-empty string `id`; that is
    /// the one validated precondition in this algebra. Patch fields
    /// replace existing fields wholesale (nested objects are not merged
    /// recursively) and untouched fields survive. A patch addressing an
    /// id with no record creates the record from the patch alone.
    pub fn update(&mut self, patch: Value) -> Result<(), StoreError> {
        let Value::Object(patch_fields) = patch else {
            return Err(StoreError::invalid("update patch must be a JSON object"));
        };

        let id = match patch_fields.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => EntityId::from(id),
            _ => return Err(StoreError::invalid("id must be defined to update an entry")),
        };

        match self.entries.entry(id.clone()) {
            indexmap::map::Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                for (key, value) in patch_fields {
                    if key != "id" {
                        record.fields.insert(key, value);
                    }
                }
            }
            indexmap::map::Entry::Vacant(vacant) => {
                let mut fields = patch_fields;
                fields.remove("id");
                vacant.insert(Entity { id, fields });
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Entity)> {
        self.entries.iter()
    }

    /// The whole map as a JSON object, rows keyed by id.
    pub fn to_value(&self) -> Value {
        let object: serde_json::Map<String, Value> = self
            .entries
            .iter()
            .map(|(id, entity)| (id.as_str().to_owned(), entity.to_value()))
            .collect();
        Value::Object(object)
    }
}

impl FromIterator<Entity> for EntityMap {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        let mut map = Self::new();
        for entity in iter {
            map.insert_or_replace(entity);
        }
        map
    }
}

// ── ModuleState ─────────────────────────────────────────────────────

/// One named field of module state.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    /// An id-indexed entity map, mutated through the map algebra.
    Map(EntityMap),
    /// An arbitrary JSON value, replaced wholesale by mutations.
    Value(Value),
}

/// The state owned by a single module (or by the store root).
///
/// Fields keep declaration order. Mutations receive `&mut ModuleState`
/// and observers receive immutable snapshots of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleState {
    fields: IndexMap<String, StateValue>,
}

impl ModuleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an empty entity map field.
    #[must_use]
    pub fn with_entity_map(mut self, name: impl Into<String>) -> Self {
        self.fields
            .insert(name.into(), StateValue::Map(EntityMap::new()));
        self
    }

    /// Declare a plain value field.
    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), StateValue::Value(value.into()));
        self
    }

    /// The entity map at `name`, if that field is a map.
    pub fn entity_map(&self, name: &str) -> Option<&EntityMap> {
        match self.fields.get(name) {
            Some(StateValue::Map(map)) => Some(map),
            _ => None,
        }
    }

    /// The plain value at `name`, if that field is a plain value.
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.fields.get(name) {
            Some(StateValue::Value(value)) => Some(value),
            _ => None,
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Mutable access to the entity map at `name`. Mutations only touch
    /// fields the module declared, so a missing field or one holding a
    /// plain value is a shape mismatch.
    pub fn entity_map_mut(&mut self, name: &str) -> Result<&mut EntityMap, StoreError> {
        match self.fields.get_mut(name) {
            Some(StateValue::Map(map)) => Ok(map),
            _ => Err(StoreError::StateShape {
                field: name.to_owned(),
            }),
        }
    }

    /// Replace (or declare) the plain value at `name`.
    pub fn set_value(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), StateValue::Value(value.into()));
    }
}
