// ── Listener registry ──
//
// The composition root folds every module's listener declaration into
// one immutable map of `{table -> change kind -> qualified mutation}`.
// The bridge walks this registry to subscribe against the change feed.

use indexmap::IndexMap;

use basin_feed::{ChangeKind, TableName};

use crate::module::{Listeners, Module};

/// The folded, namespace-qualified listener map.
///
/// Built once during composition and read-only afterwards. Exactly one
/// mutation name per `(table, kind)` pair; conflicts during the fold
/// resolve last-write-wins in module declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    entries: IndexMap<TableName, IndexMap<ChangeKind, String>>,
}

impl Registry {
    /// The qualified mutation registered for a `(table, kind)` pair.
    pub fn mutation_for(&self, table: &TableName, kind: ChangeKind) -> Option<&str> {
        self.entries
            .get(table)?
            .get(&kind)
            .map(String::as_str)
    }

    /// Every `(table, kind, qualified mutation)` triple, tables in fold
    /// order.
    pub fn iter(&self) -> impl Iterator<Item = (&TableName, ChangeKind, &str)> {
        self.entries.iter().flat_map(|(table, kinds)| {
            kinds
                .iter()
                .map(move |(kind, mutation)| (table, *kind, mutation.as_str()))
        })
    }

    /// Number of `(table, kind)` pairs, i.e. of feed subscriptions the
    /// bridge will make.
    pub fn subscription_count(&self) -> usize {
        self.entries.values().map(IndexMap::len).sum()
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableName> {
        self.entries.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fold module listener declarations into a [`Registry`].
///
/// Starts from `base` (root-level declarations, taken as already
/// qualified) and walks `modules` in declaration order. A namespaced
/// module's mutation names gain a `"{name}/"` prefix; a non-namespaced
/// module's names are folded verbatim. Each module's declaration is
/// consumed -- after the fold the registry is the single source of
/// truth for feed wiring.
///
/// A later declaration for an already-bound `(table, kind)` replaces
/// the earlier one. That is deliberate (modules may override built-in
/// wiring) but usually worth noticing, so the fold logs a warning.
pub fn build_registry(base: Listeners, modules: &mut IndexMap<String, Module>) -> Registry {
    let mut entries = base.entries;

    for (module_name, module) in modules.iter_mut() {
        let Some(declaration) = module.take_listeners() else {
            continue;
        };

        let prefix = if module.namespaced {
            format!("{module_name}/")
        } else {
            String::new()
        };

        for (table, kinds) in declaration.entries {
            let table_entry = entries.entry(table.clone()).or_default();
            for (kind, mutation) in kinds {
                let qualified = format!("{prefix}{mutation}");
                if let Some(previous) = table_entry.insert(kind, qualified.clone()) {
                    if previous != qualified {
                        tracing::warn!(
                            table = %table,
                            kind = %kind,
                            previous = %previous,
                            mutation = %qualified,
                            "listener overwritten"
                        );
                    }
                }
            }
        }
    }

    Registry { entries }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use basin_feed::ChangeKind;

    use super::*;

    fn modules_from(pairs: Vec<(&str, Module)>) -> IndexMap<String, Module> {
        pairs
            .into_iter()
            .map(|(name, module)| (name.to_owned(), module))
            .collect()
    }

    #[test]
    fn namespaced_modules_gain_a_prefix() {
        let mut modules = modules_from(vec![(
            "channel_sets",
            Module::new()
                .namespaced()
                .on_change("channelset", ChangeKind::Created, "ADD_CHANNELSET"),
        )]);

        let registry = build_registry(Listeners::new(), &mut modules);

        assert_eq!(
            registry.mutation_for(&"channelset".into(), ChangeKind::Created),
            Some("channel_sets/ADD_CHANNELSET")
        );
    }

    #[test]
    fn plain_modules_fold_verbatim() {
        let mut modules = modules_from(vec![(
            "channel_sets",
            Module::new().on_change("channelset", ChangeKind::Created, "ADD_CHANNELSET"),
        )]);

        let registry = build_registry(Listeners::new(), &mut modules);

        assert_eq!(
            registry.mutation_for(&"channelset".into(), ChangeKind::Created),
            Some("ADD_CHANNELSET")
        );
    }

    #[test]
    fn later_module_wins_a_conflicting_pair() {
        let mut modules = modules_from(vec![
            (
                "first",
                Module::new()
                    .namespaced()
                    .on_change("item", ChangeKind::Updated, "FROM_FIRST"),
            ),
            (
                "second",
                Module::new()
                    .namespaced()
                    .on_change("item", ChangeKind::Updated, "FROM_SECOND"),
            ),
        ]);

        let registry = build_registry(Listeners::new(), &mut modules);

        assert_eq!(
            registry.mutation_for(&"item".into(), ChangeKind::Updated),
            Some("second/FROM_SECOND")
        );
        assert_eq!(registry.subscription_count(), 1);
    }

    #[test]
    fn module_declarations_override_the_base() {
        let base = Listeners::new().on("item", ChangeKind::Created, "ROOT_ADD");
        let mut modules = modules_from(vec![(
            "items",
            Module::new()
                .namespaced()
                .on_change("item", ChangeKind::Created, "ADD"),
        )]);

        let registry = build_registry(base, &mut modules);

        assert_eq!(
            registry.mutation_for(&"item".into(), ChangeKind::Created),
            Some("items/ADD")
        );
    }

    #[test]
    fn fold_consumes_the_declarations() {
        let mut modules = modules_from(vec![(
            "items",
            Module::new().on_change("item", ChangeKind::Created, "ADD"),
        )]);

        build_registry(Listeners::new(), &mut modules);

        assert!(modules.get("items").unwrap().listeners().is_none());
    }

    #[test]
    fn distinct_pairs_accumulate() {
        let base = Listeners::new().on("session", ChangeKind::Updated, "UPDATE_SESSION");
        let mut modules = modules_from(vec![
            (
                "items",
                Module::new()
                    .namespaced()
                    .on_change("item", ChangeKind::Created, "ADD")
                    .on_change("item", ChangeKind::Deleted, "REMOVE"),
            ),
            (
                "tags",
                Module::new()
                    .namespaced()
                    .on_change("tag", ChangeKind::Created, "ADD"),
            ),
        ]);

        let registry = build_registry(base, &mut modules);

        assert_eq!(registry.subscription_count(), 4);
        let tables: Vec<String> = registry.tables().map(ToString::to_string).collect();
        assert_eq!(tables, vec!["session", "item", "tag"]);
        assert_eq!(
            registry.mutation_for(&"tag".into(), ChangeKind::Created),
            Some("tags/ADD")
        );
    }
}
