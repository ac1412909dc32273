//! Store composition.
//!
//! [`StoreBuilder`] merges built-in and caller modules, folds their
//! change listeners into a [`Registry`](crate::Registry), wires the
//! registry to a change feed and returns the composed [`Store`].
//!
//! ```rust,ignore
//! let feed = Arc::new(MemoryFeed::new());
//! let store = StoreBuilder::new()
//!     .module(
//!         "channel_sets",
//!         Module::new()
//!             .namespaced()
//!             .state(ModuleState::new().with_entity_map("channel_sets"))
//!             .mutation("ADD", mutations::insert_or_replace("channel_sets"))
//!             .on_change("channel_set", ChangeKind::Created, "ADD"),
//!     )
//!     .feed(feed.clone())
//!     .build()?;
//!
//! feed.publish("channel_set", ChangeKind::Created, json!({"id": "cs1"}))?;
//! ```

use std::sync::Arc;

use basin_feed::{ChangeFeed, ChangeKind, TableName};
use indexmap::IndexMap;

use crate::bridge::install_bridge;
use crate::error::StoreError;
use crate::module::{ActionFn, GetterFn, Listeners, Module, MutationFn};
use crate::registry::build_registry;
use crate::state::ModuleState;
use crate::store::{GetterEntry, MutationEntry, Store, StoreConfig};

/// A one-shot installer run against the freshly built store, after the
/// feed bridge. Returning an error aborts composition.
pub type Plugin = Box<dyn FnOnce(&Store) -> Result<(), StoreError> + Send>;

// ── StoreBuilder ────────────────────────────────────────────────────

/// Collects everything a store is composed from. All parts are optional
/// and default to empty.
#[derive(Default)]
pub struct StoreBuilder {
    config: StoreConfig,
    state: ModuleState,
    mutations: IndexMap<String, MutationFn>,
    getters: IndexMap<String, GetterFn>,
    actions: IndexMap<String, ActionFn>,
    base_modules: IndexMap<String, Module>,
    modules: IndexMap<String, Module>,
    plugins: Vec<Plugin>,
    listeners: Listeners,
    feed: Option<Arc<dyn ChangeFeed>>,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Root state, mutated by root mutations.
    #[must_use]
    pub fn state(mut self, state: ModuleState) -> Self {
        self.state = state;
        self
    }

    /// Register a root mutation. Registering the same name again
    /// replaces the earlier handler.
    #[must_use]
    pub fn mutation(mut self, name: impl Into<String>, mutation: MutationFn) -> Self {
        self.mutations.insert(name.into(), mutation);
        self
    }

    #[must_use]
    pub fn getter(mut self, name: impl Into<String>, getter: GetterFn) -> Self {
        self.getters.insert(name.into(), getter);
        self
    }

    #[must_use]
    pub fn action(mut self, name: impl Into<String>, action: ActionFn) -> Self {
        self.actions.insert(name.into(), action);
        self
    }

    /// Add a caller module. Caller modules override base modules of the
    /// same name wholesale.
    #[must_use]
    pub fn module(mut self, name: impl Into<String>, module: Module) -> Self {
        self.modules.insert(name.into(), module);
        self
    }

    /// Add a built-in module. Kept only if no caller module claims the
    /// same name.
    #[must_use]
    pub fn base_module(mut self, name: impl Into<String>, module: Module) -> Self {
        self.base_modules.insert(name.into(), module);
        self
    }

    #[must_use]
    pub fn plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Base listener declarations, folded before any module's. A module
    /// declaring the same `(table, kind)` pair wins over these.
    #[must_use]
    pub fn listeners(mut self, listeners: Listeners) -> Self {
        self.listeners = listeners;
        self
    }

    /// Declare a single base listener. Mutation names here are taken
    /// verbatim, so point at namespaced mutations with their full
    /// `"{module}/{name}"` form.
    #[must_use]
    pub fn on_change(
        mut self,
        table: impl Into<TableName>,
        kind: ChangeKind,
        mutation: impl Into<String>,
    ) -> Self {
        self.listeners.insert(table.into(), kind, mutation.into());
        self
    }

    /// The change feed to bridge the folded registry onto.
    #[must_use]
    pub fn feed(mut self, feed: Arc<dyn ChangeFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    // ── Composition ──────────────────────────────────────────────────

    /// Compose the store: merge modules, fold listeners, build the
    /// registration tables, install the feed bridge, then run caller
    /// plugins in order. A plugin error aborts the whole composition.
    pub fn build(self) -> Result<Store, StoreError> {
        let mut merged = self.base_modules;
        for (name, module) in self.modules {
            // Caller wins; a replaced base module keeps its position.
            merged.insert(name, module);
        }

        let registry = build_registry(self.listeners, &mut merged);

        let mut mutations: IndexMap<String, MutationEntry> = IndexMap::new();
        let mut getters: IndexMap<String, GetterEntry> = IndexMap::new();
        let mut actions: IndexMap<String, ActionFn> = IndexMap::new();

        for (name, apply) in self.mutations {
            insert_mutation(&mut mutations, name, None, apply);
        }
        for (name, derive) in self.getters {
            insert_getter(&mut getters, name, None, derive);
        }
        for (name, action) in self.actions {
            insert_action(&mut actions, name, action);
        }

        let mut module_states: IndexMap<String, ModuleState> = IndexMap::new();
        for (name, module) in merged {
            let prefix = if module.namespaced {
                format!("{name}/")
            } else {
                String::new()
            };

            for (local, apply) in module.mutations {
                insert_mutation(
                    &mut mutations,
                    format!("{prefix}{local}"),
                    Some(name.clone()),
                    apply,
                );
            }
            for (local, derive) in module.getters {
                insert_getter(
                    &mut getters,
                    format!("{prefix}{local}"),
                    Some(name.clone()),
                    derive,
                );
            }
            for (local, action) in module.actions {
                insert_action(&mut actions, format!("{prefix}{local}"), action);
            }

            module_states.insert(name, module.state);
        }

        let store = Store::from_parts(
            &self.config,
            self.state,
            module_states,
            mutations,
            getters,
            actions,
            registry,
        );

        if let Some(feed) = self.feed {
            install_bridge(store.registry(), &store, feed.as_ref());
        }

        for plugin in self.plugins {
            plugin(&store)?;
        }

        Ok(store)
    }
}

fn insert_mutation(
    mutations: &mut IndexMap<String, MutationEntry>,
    name: String,
    module: Option<String>,
    apply: MutationFn,
) {
    if mutations
        .insert(name.clone(), MutationEntry { module, apply })
        .is_some()
    {
        tracing::debug!(mutation = %name, "mutation registration replaced");
    }
}

fn insert_getter(
    getters: &mut IndexMap<String, GetterEntry>,
    name: String,
    module: Option<String>,
    derive: GetterFn,
) {
    if getters
        .insert(name.clone(), GetterEntry { module, derive })
        .is_some()
    {
        tracing::debug!(getter = %name, "getter registration replaced");
    }
}

fn insert_action(actions: &mut IndexMap<String, ActionFn>, name: String, action: ActionFn) {
    if actions.insert(name.clone(), action).is_some() {
        tracing::debug!(action = %name, "action registration replaced");
    }
}
