// ── The composed store ──
//
// Holds the working state tree behind one commit lock, the registration
// tables built by the composer, and the publish side of every watch
// channel. Mutations are the only writers: commit applies one mutation
// to completion, then publishes a fresh immutable snapshot of the
// mutated module. Readers only ever see published snapshots.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::error::StoreError;
use crate::module::{ActionFn, GetterFn, MutationFn};
use crate::payload::Payload;
use crate::registry::Registry;
use crate::state::ModuleState;
use crate::stream::StateStream;

const COMMIT_CHANNEL_CAPACITY: usize = 256;

/// Tuning for a composed [`Store`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capacity of the post-commit broadcast channel. An observer that
    /// falls further behind than this sees `RecvError::Lagged`.
    /// Default: 256.
    pub commit_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            commit_capacity: COMMIT_CHANNEL_CAPACITY,
        }
    }
}

// ── CommitEvent ─────────────────────────────────────────────────────

/// Broadcast to observers after every successful commit. Failed commits
/// broadcast nothing.
#[derive(Debug, Clone)]
pub struct CommitEvent {
    /// Qualified mutation name as it was committed.
    pub mutation: String,
    /// Module owning the mutation; `None` for root mutations.
    pub module: Option<String>,
    pub at: DateTime<Utc>,
}

// ── Registration entries ────────────────────────────────────────────

pub(crate) struct MutationEntry {
    pub(crate) module: Option<String>,
    pub(crate) apply: MutationFn,
}

pub(crate) struct GetterEntry {
    pub(crate) module: Option<String>,
    pub(crate) derive: GetterFn,
}

/// Working copies of every module's state, guarded by the commit lock.
struct StateTree {
    root: ModuleState,
    modules: IndexMap<String, ModuleState>,
}

struct StoreInner {
    mutations: IndexMap<String, MutationEntry>,
    getters: IndexMap<String, GetterEntry>,
    actions: IndexMap<String, ActionFn>,
    registry: Registry,
    working: Mutex<StateTree>,
    root_snapshot: watch::Sender<Arc<ModuleState>>,
    snapshots: IndexMap<String, watch::Sender<Arc<ModuleState>>>,
    commit_tx: broadcast::Sender<CommitEvent>,
    last_change_at: watch::Sender<Option<DateTime<Utc>>>,
}

// ── Store ───────────────────────────────────────────────────────────

/// The composed, centralized state store.
///
/// Cheaply cloneable via `Arc`; clones share all state. Built by
/// [`StoreBuilder`](crate::StoreBuilder), never directly.
///
/// `commit` is synchronous and serialized: one mutation at a time runs
/// to completion, and observers never see intermediate state. Snapshots
/// handed out before a commit are unaffected by it.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    pub(crate) fn from_parts(
        config: &StoreConfig,
        root: ModuleState,
        modules: IndexMap<String, ModuleState>,
        mutations: IndexMap<String, MutationEntry>,
        getters: IndexMap<String, GetterEntry>,
        actions: IndexMap<String, ActionFn>,
        registry: Registry,
    ) -> Self {
        let (root_snapshot, _) = watch::channel(Arc::new(root.clone()));
        let snapshots: IndexMap<String, watch::Sender<Arc<ModuleState>>> = modules
            .iter()
            .map(|(name, state)| {
                let (tx, _) = watch::channel(Arc::new(state.clone()));
                (name.clone(), tx)
            })
            .collect();
        let (commit_tx, _) = broadcast::channel(config.commit_capacity);
        let (last_change_at, _) = watch::channel(None);

        Self {
            inner: Arc::new(StoreInner {
                mutations,
                getters,
                actions,
                registry,
                working: Mutex::new(StateTree { root, modules }),
                root_snapshot,
                snapshots,
                commit_tx,
                last_change_at,
            }),
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Apply the mutation registered under `name` to its module's state.
    ///
    /// Serialized behind the commit lock; returns once the mutation has
    /// run to completion and the module's new snapshot is published.
    /// An unregistered name is [`StoreError::UnknownMutation`] -- the
    /// registry fold never validates mutation names, so a typo'd
    /// listener declaration surfaces here, on first delivery.
    pub fn commit(&self, name: &str, payload: impl Into<Payload>) -> Result<(), StoreError> {
        let entry = self
            .inner
            .mutations
            .get(name)
            .ok_or_else(|| StoreError::UnknownMutation {
                name: name.to_owned(),
            })?;

        let mut tree = lock(&self.inner.working);
        let (state, snapshot_tx) = match entry.module.as_deref() {
            None => (&mut tree.root, &self.inner.root_snapshot),
            Some(module) => {
                let state =
                    tree.modules
                        .get_mut(module)
                        .ok_or_else(|| StoreError::UnknownModule {
                            name: module.to_owned(),
                        })?;
                let tx = self
                    .inner
                    .snapshots
                    .get(module)
                    .ok_or_else(|| StoreError::UnknownModule {
                        name: module.to_owned(),
                    })?;
                (state, tx)
            }
        };

        (entry.apply)(state, payload.into())?;

        let snapshot = Arc::new(state.clone());
        snapshot_tx.send_modify(|current| *current = snapshot);
        let at = Utc::now();
        self.inner.last_change_at.send_modify(|t| *t = Some(at));
        drop(tree);

        tracing::trace!(mutation = name, "commit applied");
        let _ = self.inner.commit_tx.send(CommitEvent {
            mutation: name.to_owned(),
            module: entry.module.clone(),
            at,
        });
        Ok(())
    }

    /// Run the action registered under `name`.
    pub async fn dispatch(
        &self,
        name: &str,
        payload: impl Into<Payload>,
    ) -> Result<(), StoreError> {
        let action = self
            .inner
            .actions
            .get(name)
            .ok_or_else(|| StoreError::UnknownAction {
                name: name.to_owned(),
            })?;

        tracing::trace!(action = name, "dispatching");
        action(self.clone(), payload.into()).await
    }

    /// Evaluate the getter registered under `name` against its module's
    /// latest published snapshot.
    pub fn get(&self, name: &str) -> Result<Value, StoreError> {
        let entry = self
            .inner
            .getters
            .get(name)
            .ok_or_else(|| StoreError::UnknownGetter {
                name: name.to_owned(),
            })?;

        let snapshot = match entry.module.as_deref() {
            None => self.inner.root_snapshot.borrow().clone(),
            Some(module) => self
                .inner
                .snapshots
                .get(module)
                .ok_or_else(|| StoreError::UnknownModule {
                    name: module.to_owned(),
                })?
                .borrow()
                .clone(),
        };

        Ok((entry.derive)(&snapshot))
    }

    // ── Snapshots and subscriptions ──────────────────────────────────

    /// The latest published snapshot of a module's state.
    pub fn state(&self, module: &str) -> Result<Arc<ModuleState>, StoreError> {
        self.inner
            .snapshots
            .get(module)
            .map(|tx| tx.borrow().clone())
            .ok_or_else(|| StoreError::UnknownModule {
                name: module.to_owned(),
            })
    }

    /// The latest published snapshot of the root state.
    pub fn root_state(&self) -> Arc<ModuleState> {
        self.inner.root_snapshot.borrow().clone()
    }

    /// Subscribe to a module's state.
    pub fn watch(&self, module: &str) -> Result<StateStream, StoreError> {
        self.inner
            .snapshots
            .get(module)
            .map(|tx| StateStream::new(tx.subscribe()))
            .ok_or_else(|| StoreError::UnknownModule {
                name: module.to_owned(),
            })
    }

    /// Subscribe to the root state.
    pub fn watch_root(&self) -> StateStream {
        StateStream::new(self.inner.root_snapshot.subscribe())
    }

    /// Subscribe to the post-commit broadcast.
    pub fn commits(&self) -> broadcast::Receiver<CommitEvent> {
        self.inner.commit_tx.subscribe()
    }

    // ── Introspection ────────────────────────────────────────────────

    /// The folded listener registry this store was composed with.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.inner.snapshots.keys().map(String::as_str)
    }

    pub fn has_mutation(&self, name: &str) -> bool {
        self.inner.mutations.contains_key(name)
    }

    /// When the last successful commit happened, if any.
    pub fn last_change_at(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_change_at.borrow()
    }
}

/// Poison only marks a panicked commit; the tree is still usable.
fn lock(working: &Mutex<StateTree>) -> MutexGuard<'_, StateTree> {
    working.lock().unwrap_or_else(PoisonError::into_inner)
}
