// ── Synchronous in-process feed ──

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::change::{ChangeKind, ChangeRecord, TableName};
use crate::error::FeedError;
use crate::feed::{self, ChangeFeed, ChangeHandler};

/// An in-process [`ChangeFeed`] that delivers synchronously on the
/// publisher's thread.
///
/// [`publish`](Self::publish) assigns the record's `seq` and runs every
/// registered handler before returning, so per-pair FIFO holds by
/// construction. The first handler error aborts the publish and is
/// returned to the caller.
///
/// This is the feed to reach for in tests and in embeddings where the
/// record store lives in the same process and mutates on one thread.
#[derive(Default)]
pub struct MemoryFeed {
    handlers: DashMap<(TableName, ChangeKind), Vec<ChangeHandler>>,
    seq: AtomicU64,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish one row change, delivering to every handler registered
    /// for `(table, kind)`. Returns the assigned sequence number.
    pub fn publish(
        &self,
        table: impl Into<TableName>,
        kind: ChangeKind,
        row: serde_json::Value,
    ) -> Result<u64, FeedError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let record = ChangeRecord {
            table: table.into(),
            kind,
            seq,
            row,
        };

        tracing::trace!(table = %record.table, kind = %record.kind, seq, "publishing change");
        feed::deliver(&self.handlers, &record)?;
        Ok(seq)
    }

    /// Number of handlers registered for a `(table, kind)` pair.
    pub fn handler_count(&self, table: impl Into<TableName>, kind: ChangeKind) -> usize {
        self.handlers
            .get(&(table.into(), kind))
            .map_or(0, |entry| entry.len())
    }
}

impl ChangeFeed for MemoryFeed {
    fn subscribe(&self, table: TableName, kind: ChangeKind, handler: ChangeHandler) {
        tracing::debug!(table = %table, kind = %kind, "handler subscribed");
        self.handlers.entry((table, kind)).or_default().push(handler);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;

    fn recording_handler(log: &Arc<Mutex<Vec<u64>>>) -> ChangeHandler {
        let log = Arc::clone(log);
        Box::new(move |record| {
            log.lock().unwrap().push(record.seq);
            Ok(())
        })
    }

    #[test]
    fn publish_assigns_increasing_seq() {
        let feed = MemoryFeed::new();
        let s1 = feed
            .publish("items", ChangeKind::Created, json!({"id": "a"}))
            .unwrap();
        let s2 = feed
            .publish("items", ChangeKind::Created, json!({"id": "b"}))
            .unwrap();
        assert!(s2 > s1);
    }

    #[test]
    fn publish_without_listeners_is_ok() {
        let feed = MemoryFeed::new();
        assert!(feed
            .publish("items", ChangeKind::Deleted, json!({"id": "a"}))
            .is_ok());
    }

    #[test]
    fn delivers_in_publish_order() {
        let feed = MemoryFeed::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        feed.subscribe("items".into(), ChangeKind::Created, recording_handler(&log));

        feed.publish("items", ChangeKind::Created, json!({"id": "a"}))
            .unwrap();
        feed.publish("items", ChangeKind::Created, json!({"id": "b"}))
            .unwrap();
        feed.publish("items", ChangeKind::Created, json!({"id": "c"}))
            .unwrap();

        let seqs = log.lock().unwrap().clone();
        assert_eq!(seqs.len(), 3);
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn delivery_is_scoped_to_the_pair() {
        let feed = MemoryFeed::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        feed.subscribe("items".into(), ChangeKind::Created, recording_handler(&log));

        feed.publish("items", ChangeKind::Deleted, json!({"id": "a"}))
            .unwrap();
        feed.publish("other", ChangeKind::Created, json!({"id": "b"}))
            .unwrap();

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn handler_error_aborts_publish() {
        let feed = MemoryFeed::new();
        feed.subscribe(
            "items".into(),
            ChangeKind::Created,
            Box::new(|record| {
                Err(FeedError::Handler {
                    table: record.table.clone(),
                    kind: record.kind,
                    message: "boom".into(),
                })
            }),
        );

        let err = feed
            .publish("items", ChangeKind::Created, json!({"id": "a"}))
            .unwrap_err();
        assert!(matches!(err, FeedError::Handler { .. }));
    }

    #[test]
    fn handler_count_reflects_subscriptions() {
        let feed = MemoryFeed::new();
        assert_eq!(feed.handler_count("items", ChangeKind::Created), 0);

        feed.subscribe("items".into(), ChangeKind::Created, Box::new(|_| Ok(())));
        feed.subscribe("items".into(), ChangeKind::Created, Box::new(|_| Ok(())));

        assert_eq!(feed.handler_count("items", ChangeKind::Created), 2);
        assert_eq!(feed.handler_count("items", ChangeKind::Updated), 0);
    }
}
