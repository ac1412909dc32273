// ── Change-feed bridge ──────────────────────────────────────────────

use basin_feed::{ChangeFeed, FeedError};

use crate::payload::Payload;
use crate::registry::Registry;
use crate::store::Store;

/// Wire a folded [`Registry`] to a change feed.
///
/// Subscribes exactly once per `(table, kind)` pair in the registry.
/// Each handler forwards the delivered record to the store as
/// `store.commit(mutation, record)`, so every matching change lands in
/// state through the one mutation the fold elected for that pair.
///
/// A failed commit is returned to the feed as [`FeedError::Handler`]
/// and is fatal to the delivery that produced it -- feeds neither retry
/// nor skip. Mutation names are not validated here: a registry entry
/// naming an unregistered mutation fails on first delivery with
/// `UnknownMutation` inside the handler error.
pub fn install_bridge(registry: &Registry, store: &Store, feed: &dyn ChangeFeed) {
    for (table, kind, mutation) in registry.iter() {
        tracing::debug!(
            table = %table,
            kind = %kind,
            mutation = %mutation,
            "change listener installed"
        );

        let store = store.clone();
        let mutation = mutation.to_owned();
        let table = table.clone();
        feed.subscribe(
            table.clone(),
            kind,
            Box::new(move |record| {
                store
                    .commit(&mutation, Payload::Change(record.clone()))
                    .map_err(|error| FeedError::Handler {
                        table: table.clone(),
                        kind,
                        message: error.to_string(),
                    })
            }),
        );
    }
}
