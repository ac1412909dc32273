// basin: modular reactive state store bridged to record-store change feeds.

pub mod bridge;
pub mod composer;
pub mod entity;
pub mod error;
pub mod module;
pub mod mutations;
pub mod payload;
pub mod registry;
pub mod state;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::install_bridge;
pub use composer::{Plugin, StoreBuilder};
pub use error::StoreError;
pub use module::{ActionFn, GetterFn, Listeners, Module, MutationFn};
pub use registry::{Registry, build_registry};
pub use store::{CommitEvent, Store, StoreConfig};
pub use stream::{StateStream, StateWatchStream};

// Re-export state and payload types at the crate root for ergonomics.
pub use entity::{Entity, EntityId};
pub use payload::Payload;
pub use state::{EntityMap, ModuleState, StateValue};

// Feed-side types callers need to declare listeners and publish changes.
pub use basin_feed::{ChangeFeed, ChangeKind, ChangeRecord, TableName};
