// ── Store error types ──
//
// Every variant here is a programming error at some call site: a typo'd
// dispatch target, a payload that doesn't fit the mutation, a state
// field of the wrong shape. None of them are retried or absorbed; they
// surface synchronously from the operation that hit them.

use thiserror::Error;

/// Unified error type for the store crate.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A payload failed validation (missing id, wrong JSON shape, ...).
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// `commit` named a mutation nobody registered. Typically a typo in
    /// a listener declaration; caught at dispatch time, not at build time.
    #[error("Unknown mutation: {name}")]
    UnknownMutation { name: String },

    /// `dispatch` named an action nobody registered.
    #[error("Unknown action: {name}")]
    UnknownAction { name: String },

    /// `get` named a getter nobody registered.
    #[error("Unknown getter: {name}")]
    UnknownGetter { name: String },

    /// A lookup named a module that was never composed into the store.
    #[error("Unknown module: {name}")]
    UnknownModule { name: String },

    /// A mutation or getter expected an entity map at a state field the
    /// module never declared, or one holding a plain value.
    #[error("State field {field:?} is not an entity map")]
    StateShape { field: String },
}

impl StoreError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
