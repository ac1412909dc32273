// ── Module descriptors ──
//
// A Module bundles what one domain slice contributes to the store:
// initial state, mutations, getters, actions, and a declaration of
// which record-store changes feed which mutation. The composer folds
// the declaration into the listener registry and registers everything
// else under the module's namespace.

use futures_core::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::Value;

use basin_feed::{ChangeKind, TableName};

use crate::error::StoreError;
use crate::payload::Payload;
use crate::state::ModuleState;
use crate::store::Store;

/// Applies a payload to module state. Runs to completion under the
/// store's commit lock; on error it must leave the state as it found it.
pub type MutationFn = Box<dyn Fn(&mut ModuleState, Payload) -> Result<(), StoreError> + Send + Sync>;

/// Derives a value from a published state snapshot.
pub type GetterFn = Box<dyn Fn(&ModuleState) -> Value + Send + Sync>;

/// An async operation receiving a cheap store handle, free to commit.
pub type ActionFn =
    Box<dyn Fn(Store, Payload) -> BoxFuture<'static, Result<(), StoreError>> + Send + Sync>;

// ── Listeners ───────────────────────────────────────────────────────

/// A declaration of `{table -> change kind -> mutation name}`.
///
/// In a module the mutation names are unqualified; the registry fold
/// prefixes them with the module namespace. Declaring the same
/// `(table, kind)` twice keeps the later mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listeners {
    pub(crate) entries: IndexMap<TableName, IndexMap<ChangeKind, String>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that changes of `kind` on `table` commit `mutation`.
    #[must_use]
    pub fn on(
        mut self,
        table: impl Into<TableName>,
        kind: ChangeKind,
        mutation: impl Into<String>,
    ) -> Self {
        self.insert(table.into(), kind, mutation.into());
        self
    }

    /// Returns the previously declared mutation for the pair, if any.
    pub(crate) fn insert(
        &mut self,
        table: TableName,
        kind: ChangeKind,
        mutation: String,
    ) -> Option<String> {
        self.entries.entry(table).or_default().insert(kind, mutation)
    }

    pub fn mutation_for(&self, table: &TableName, kind: ChangeKind) -> Option<&str> {
        self.entries
            .get(table)?
            .get(&kind)
            .map(String::as_str)
    }

    /// Every declared `(table, kind, mutation)` triple, tables in
    /// declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&TableName, ChangeKind, &str)> {
        self.entries.iter().flat_map(|(table, kinds)| {
            kinds
                .iter()
                .map(move |(kind, mutation)| (table, *kind, mutation.as_str()))
        })
    }

    /// Number of declared `(table, kind)` pairs.
    pub fn len(&self) -> usize {
        self.entries.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Module ──────────────────────────────────────────────────────────

/// One composable slice of the store.
///
/// Built with chained calls, handed to
/// [`StoreBuilder::module`](crate::StoreBuilder::module) under a name:
///
/// ```rust,ignore
/// use basin::{mutations, ChangeKind, Module, ModuleState};
///
/// let channel_sets = Module::new()
///     .namespaced()
///     .state(ModuleState::new().with_entity_map("channelsets"))
///     .mutation("ADD_CHANNELSET", mutations::insert_or_replace("channelsets"))
///     .mutation("REMOVE_CHANNELSET", mutations::remove("channelsets"))
///     .on_change("channelset", ChangeKind::Created, "ADD_CHANNELSET")
///     .on_change("channelset", ChangeKind::Deleted, "REMOVE_CHANNELSET");
/// ```
#[derive(Default)]
pub struct Module {
    pub(crate) namespaced: bool,
    pub(crate) state: ModuleState,
    pub(crate) mutations: IndexMap<String, MutationFn>,
    pub(crate) getters: IndexMap<String, GetterFn>,
    pub(crate) actions: IndexMap<String, ActionFn>,
    pub(crate) listeners: Option<Listeners>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register this module's mutations, getters and actions under a
    /// `"{name}/"` prefix instead of at the root.
    #[must_use]
    pub fn namespaced(mut self) -> Self {
        self.namespaced = true;
        self
    }

    /// Set the module's initial state.
    #[must_use]
    pub fn state(mut self, state: ModuleState) -> Self {
        self.state = state;
        self
    }

    /// Register a mutation under an unqualified name. Registering the
    /// same name again replaces the earlier handler.
    #[must_use]
    pub fn mutation(mut self, name: impl Into<String>, mutation: MutationFn) -> Self {
        self.mutations.insert(name.into(), mutation);
        self
    }

    /// Register a getter over this module's state.
    #[must_use]
    pub fn getter(mut self, name: impl Into<String>, getter: GetterFn) -> Self {
        self.getters.insert(name.into(), getter);
        self
    }

    /// Register an async action.
    #[must_use]
    pub fn action(mut self, name: impl Into<String>, action: ActionFn) -> Self {
        self.actions.insert(name.into(), action);
        self
    }

    /// Declare that changes of `kind` on `table` commit `mutation`
    /// (unqualified; the registry fold applies the namespace prefix).
    #[must_use]
    pub fn on_change(
        mut self,
        table: impl Into<TableName>,
        kind: ChangeKind,
        mutation: impl Into<String>,
    ) -> Self {
        self.listeners
            .get_or_insert_with(Listeners::new)
            .insert(table.into(), kind, mutation.into());
        self
    }

    /// The listener declaration, until the registry fold consumes it.
    pub fn listeners(&self) -> Option<&Listeners> {
        self.listeners.as_ref()
    }

    pub(crate) fn take_listeners(&mut self) -> Option<Listeners> {
        self.listeners.take()
    }
}
