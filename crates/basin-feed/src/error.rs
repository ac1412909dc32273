use thiserror::Error;

use crate::change::{ChangeKind, TableName};

/// Error type for the `basin-feed` crate.
///
/// Handler failures are fatal to the delivery that produced them: a
/// synchronous publish returns the error to its caller, an async pump
/// stops and surfaces it through its join handle. Feeds never retry or
/// swallow a failed handler.
#[derive(Debug, Error)]
pub enum FeedError {
    /// A subscribed change handler returned an error.
    #[error("Change handler failed for {table}/{kind}: {message}")]
    Handler {
        table: TableName,
        kind: ChangeKind,
        message: String,
    },

    /// The change channel has no live receiver (pump exited or was never started).
    #[error("Change channel closed")]
    ChannelClosed,

    /// `start` was called twice on the same channel feed.
    #[error("Change pump already started")]
    PumpAlreadyStarted,
}
