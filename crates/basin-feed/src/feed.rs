// ── Change-feed subscription boundary ──
//
// The trait a record store (or an in-process stand-in) implements so
// consumers can listen for row changes table by table, kind by kind.

use dashmap::DashMap;

use crate::change::{ChangeKind, ChangeRecord, TableName};
use crate::error::FeedError;

/// Callback invoked for each delivered change record.
///
/// Returning an error aborts the delivery: the feed treats a failed
/// handler as fatal and surfaces the error to the publisher or pump.
pub type ChangeHandler = Box<dyn Fn(&ChangeRecord) -> Result<(), FeedError> + Send + Sync>;

/// A source of row-change notifications.
///
/// Delivery contract, identical for every implementation:
///
/// - at-least-once, starting from the moment of subscription;
/// - FIFO within a `(table, kind)` pair;
/// - no ordering guarantee across different pairs;
/// - multiple handlers on one pair run in subscription order;
/// - subscriptions last for the life of the feed (no unsubscribe).
///
/// Handlers must not publish back into the feed that is delivering to
/// them; deliveries run to completion on the delivering thread or task.
pub trait ChangeFeed: Send + Sync {
    /// Register `handler` for every future change of `kind` on `table`.
    fn subscribe(&self, table: TableName, kind: ChangeKind, handler: ChangeHandler);
}

/// Run every handler registered for the record's `(table, kind)` pair,
/// in subscription order. The first error aborts the delivery.
pub(crate) fn deliver(
    handlers: &DashMap<(TableName, ChangeKind), Vec<ChangeHandler>>,
    record: &ChangeRecord,
) -> Result<(), FeedError> {
    let Some(entry) = handlers.get(&(record.table.clone(), record.kind)) else {
        tracing::trace!(table = %record.table, kind = %record.kind, "change with no listeners");
        return Ok(());
    };

    for handler in entry.iter() {
        handler(record)?;
    }
    Ok(())
}
