//! Channel-backed async feed.
//!
//! Producers push row changes through a [`ChangeSender`]; a single pump
//! task assigns sequence numbers and routes each record to the handlers
//! subscribed for its `(table, kind)` pair. One consumer task means the
//! per-pair FIFO contract holds end to end.
//!
//! # Example
//!
//! ```rust,ignore
//! use basin_feed::{ChangeFeed, ChangeKind, ChannelFeed, ChannelFeedConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let feed = ChannelFeed::new(ChannelFeedConfig::default());
//! feed.subscribe("items".into(), ChangeKind::Created, Box::new(|record| {
//!     println!("created: {}", record.row);
//!     Ok(())
//! }));
//!
//! let sender = feed.sender();
//! let cancel = CancellationToken::new();
//! let pump = feed.start(cancel.clone())?;
//!
//! sender.send("items", ChangeKind::Created, serde_json::json!({"id": "a"})).await?;
//!
//! cancel.cancel();
//! pump.await??;
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::change::{ChangeKind, ChangeRecord, TableName};
use crate::error::FeedError;
use crate::feed::{self, ChangeFeed, ChangeHandler};

// ── Channel capacity ────────────────────────────────────────────────

const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// Tuning for a [`ChannelFeed`].
#[derive(Debug, Clone)]
pub struct ChannelFeedConfig {
    /// Bound of the pending-change channel. Senders apply backpressure
    /// (await) once this many changes are queued. Default: 1024.
    pub capacity: usize,
}

impl Default for ChannelFeedConfig {
    fn default() -> Self {
        Self {
            capacity: CHANGE_CHANNEL_CAPACITY,
        }
    }
}

// ── ChannelFeed ─────────────────────────────────────────────────────

/// A row change queued for delivery. `seq` is assigned by the pump.
struct PendingChange {
    table: TableName,
    kind: ChangeKind,
    row: serde_json::Value,
}

/// An async [`ChangeFeed`] pumped by a background task.
///
/// Subscriptions may be added before or after [`start`](Self::start);
/// a handler only sees changes routed after it subscribed. A handler
/// error stops the pump and surfaces through the join handle.
pub struct ChannelFeed {
    handlers: Arc<DashMap<(TableName, ChangeKind), Vec<ChangeHandler>>>,
    tx: mpsc::Sender<PendingChange>,
    rx: Mutex<Option<mpsc::Receiver<PendingChange>>>,
}

impl ChannelFeed {
    pub fn new(config: ChannelFeedConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity);
        Self {
            handlers: Arc::new(DashMap::new()),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// A cloneable producer handle for pushing changes into the feed.
    pub fn sender(&self) -> ChangeSender {
        ChangeSender {
            tx: self.tx.clone(),
        }
    }

    /// Spawn the pump task.
    ///
    /// Runs until cancelled, until every [`ChangeSender`] is dropped, or
    /// until a handler fails; the join handle reports which. Calling
    /// `start` a second time returns [`FeedError::PumpAlreadyStarted`].
    pub fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<Result<(), FeedError>>, FeedError> {
        let rx = self
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(FeedError::PumpAlreadyStarted)?;

        let handlers = Arc::clone(&self.handlers);
        Ok(tokio::spawn(pump(rx, handlers, cancel)))
    }
}

impl ChangeFeed for ChannelFeed {
    fn subscribe(&self, table: TableName, kind: ChangeKind, handler: ChangeHandler) {
        tracing::debug!(table = %table, kind = %kind, "handler subscribed");
        self.handlers.entry((table, kind)).or_default().push(handler);
    }
}

// ── ChangeSender ────────────────────────────────────────────────────

/// Producer side of a [`ChannelFeed`].
#[derive(Clone)]
pub struct ChangeSender {
    tx: mpsc::Sender<PendingChange>,
}

impl ChangeSender {
    /// Queue one row change for delivery. Awaits when the channel is at
    /// capacity; fails once the pump has exited.
    pub async fn send(
        &self,
        table: impl Into<TableName>,
        kind: ChangeKind,
        row: serde_json::Value,
    ) -> Result<(), FeedError> {
        self.tx
            .send(PendingChange {
                table: table.into(),
                kind,
                row,
            })
            .await
            .map_err(|_| FeedError::ChannelClosed)
    }
}

// ── Pump task ───────────────────────────────────────────────────────

/// Drain the channel, assigning sequence numbers and routing each
/// record to its handlers. Stops on cancellation, channel close, or the
/// first handler error.
async fn pump(
    mut rx: mpsc::Receiver<PendingChange>,
    handlers: Arc<DashMap<(TableName, ChangeKind), Vec<ChangeHandler>>>,
    cancel: CancellationToken,
) -> Result<(), FeedError> {
    let mut seq: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("change pump cancelled");
                return Ok(());
            }
            pending = rx.recv() => {
                let Some(pending) = pending else {
                    tracing::debug!("change channel closed, pump exiting");
                    return Ok(());
                };

                seq += 1;
                let record = ChangeRecord {
                    table: pending.table,
                    kind: pending.kind,
                    seq,
                    row: pending.row,
                };

                tracing::trace!(table = %record.table, kind = %record.kind, seq, "routing change");
                if let Err(e) = feed::deliver(&handlers, &record) {
                    tracing::error!(error = %e, "change handler failed, pump stopping");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use serde_json::json;

    use super::*;

    fn recording_handler(log: &Arc<StdMutex<Vec<ChangeRecord>>>) -> ChangeHandler {
        let log = Arc::clone(log);
        Box::new(move |record| {
            log.lock().unwrap().push(record.clone());
            Ok(())
        })
    }

    #[tokio::test]
    async fn pump_routes_records_to_handlers() {
        let feed = ChannelFeed::new(ChannelFeedConfig::default());
        let log = Arc::new(StdMutex::new(Vec::new()));
        feed.subscribe("items".into(), ChangeKind::Created, recording_handler(&log));

        let sender = feed.sender();
        let cancel = CancellationToken::new();
        let pump = feed.start(cancel.clone()).unwrap();

        sender
            .send("items", ChangeKind::Created, json!({"id": "a"}))
            .await
            .unwrap();
        sender
            .send("items", ChangeKind::Created, json!({"id": "b"}))
            .await
            .unwrap();
        // A pair nobody listens to is silently routed past.
        sender
            .send("items", ChangeKind::Deleted, json!({"id": "a"}))
            .await
            .unwrap();

        // Close the channel so the pump drains and exits.
        drop(sender);
        drop(feed);
        pump.await.unwrap().unwrap();

        let records = log.lock().unwrap().clone();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].row["id"], "a");
        assert_eq!(records[1].row["id"], "b");
        assert!(records[0].seq < records[1].seq);
    }

    #[tokio::test]
    async fn pump_stops_on_handler_error() {
        let feed = ChannelFeed::new(ChannelFeedConfig::default());
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

        let sender = feed.sender();
        let pump = feed.start(CancellationToken::new()).unwrap();

        sender
            .send("items", ChangeKind::Created, json!({"id": "a"}))
            .await
            .unwrap();

        let err = pump.await.unwrap().unwrap_err();
        assert!(matches!(err, FeedError::Handler { .. }));

        // With the pump gone, sends fail.
        let send_err = sender
            .send("items", ChangeKind::Created, json!({"id": "b"}))
            .await
            .unwrap_err();
        assert!(matches!(send_err, FeedError::ChannelClosed));
    }

    #[tokio::test]
    async fn pump_exits_on_cancellation() {
        let feed = ChannelFeed::new(ChannelFeedConfig::default());
        let cancel = CancellationToken::new();
        let pump = feed.start(cancel.clone()).unwrap();

        cancel.cancel();
        assert!(pump.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn second_start_fails() {
        let feed = ChannelFeed::new(ChannelFeedConfig::default());
        let cancel = CancellationToken::new();
        let pump = feed.start(cancel.clone()).unwrap();

        let err = feed.start(cancel.clone()).unwrap_err();
        assert!(matches!(err, FeedError::PumpAlreadyStarted));

        cancel.cancel();
        pump.await.unwrap().unwrap();
    }
}
