// ── Ready-made entity-map mutations ──
//
// Most modules mirror record-store tables into entity maps, and their
// mutations are the same four operations over and over. These factories
// produce them, bound to a named state field, so a module wires its
// listener declarations without hand-writing the bodies.
//
// Each factory converts the payload before touching the map, so a
// rejected payload leaves the state untouched.

use crate::module::MutationFn;

/// Mutation that rebuilds the map at `field` from a batch of entities.
pub fn replace_all(field: impl Into<String>) -> MutationFn {
    let field = field.into();
    Box::new(move |state, payload| {
        let entities = payload.into_entities()?;
        state.entity_map_mut(&field)?.replace_all(entities);
        Ok(())
    })
}

/// Mutation that inserts or wholesale-replaces one entity at `field`.
pub fn insert_or_replace(field: impl Into<String>) -> MutationFn {
    let field = field.into();
    Box::new(move |state, payload| {
        let entity = payload.into_entity()?;
        state.entity_map_mut(&field)?.insert_or_replace(entity);
        Ok(())
    })
}

/// Mutation that removes the entity named by the payload's id from
/// `field`. Accepts an entity, a row object, or a bare id string.
pub fn remove(field: impl Into<String>) -> MutationFn {
    let field = field.into();
    Box::new(move |state, payload| {
        let id = payload.into_entity_id()?;
        state.entity_map_mut(&field)?.remove(&id);
        Ok(())
    })
}

/// Mutation that shallow-merges a patch into the entity at the patch's
/// id. Fails with [`InvalidArgument`](crate::StoreError::InvalidArgument)
/// when the patch has no usable id.
pub fn update(field: impl Into<String>) -> MutationFn {
    let field = field.into();
    Box::new(move |state, payload| {
        let patch = payload.into_value();
        state.entity_map_mut(&field)?.update(patch)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use basin_feed::{ChangeKind, ChangeRecord, TableName};
    use serde_json::json;

    use crate::entity::{Entity, EntityId};
    use crate::payload::Payload;
    use crate::state::ModuleState;
    use crate::StoreError;

    use super::*;

    fn change(row: serde_json::Value) -> Payload {
        Payload::Change(ChangeRecord {
            table: TableName::from("items"),
            kind: ChangeKind::Updated,
            seq: 1,
            row,
        })
    }

    #[test]
    fn insert_or_replace_accepts_change_records() {
        let mutation = insert_or_replace("items");
        let mut state = ModuleState::new().with_entity_map("items");

        mutation(&mut state, change(json!({"id": "a", "name": "alpha"}))).unwrap();

        let map = state.entity_map("items").unwrap();
        assert_eq!(map.get(&EntityId::from("a")).unwrap().get("name"), Some(&json!("alpha")));
    }

    #[test]
    fn replace_all_swaps_the_whole_map() {
        let mutation = replace_all("items");
        let mut state = ModuleState::new().with_entity_map("items");
        state
            .entity_map_mut("items")
            .unwrap()
            .insert_or_replace(Entity::new("stale"));

        mutation(&mut state, Payload::from(json!([{"id": "a"}, {"id": "b"}]))).unwrap();

        let map = state.entity_map("items").unwrap();
        assert!(!map.contains(&EntityId::from("stale")));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn remove_takes_the_id_from_the_row() {
        let mutation = remove("items");
        let mut state = ModuleState::new().with_entity_map("items");
        state
            .entity_map_mut("items")
            .unwrap()
            .insert_or_replace(Entity::new("a"));

        mutation(&mut state, change(json!({"id": "a"}))).unwrap();

        assert!(state.entity_map("items").unwrap().is_empty());
    }

    #[test]
    fn update_without_id_propagates_invalid_argument() {
        let mutation = update("items");
        let mut state = ModuleState::new().with_entity_map("items");

        let err = mutation(&mut state, change(json!({"name": "x"}))).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument { .. }));
    }

    #[test]
    fn update_merges_into_the_existing_entry() {
        let mutation = update("items");
        let mut state = ModuleState::new().with_entity_map("items");
        state
            .entity_map_mut("items")
            .unwrap()
            .insert_or_replace(Entity::new("a").with("name", "alpha").with("keep", true));

        mutation(&mut state, change(json!({"id": "a", "name": "renamed"}))).unwrap();

        let a = state
            .entity_map("items")
            .unwrap()
            .get(&EntityId::from("a"))
            .cloned()
            .unwrap();
        assert_eq!(a.get("name"), Some(&json!("renamed")));
        assert_eq!(a.get("keep"), Some(&json!(true)));
    }

    #[test]
    fn factories_reject_plain_value_fields() {
        let mutation = insert_or_replace("count");
        let mut state = ModuleState::new().with_value("count", 0);

        let err = mutation(&mut state, Payload::from(Entity::new("a"))).unwrap_err();
        assert!(matches!(err, StoreError::StateShape { .. }));
    }
}
