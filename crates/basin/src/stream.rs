// ── Reactive state streams ──
//
// Subscription types for consuming published state snapshots.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::state::ModuleState;

/// A subscription to one module's state.
///
/// Provides both point-in-time snapshot access and reactive change
/// notification via the `changed()` method or by converting to a
/// `Stream`. Snapshots are immutable: a held `Arc` never observes
/// later commits.
pub struct StateStream {
    current: Arc<ModuleState>,
    receiver: watch::Receiver<Arc<ModuleState>>,
}

impl StateStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<ModuleState>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation time (or at the last
    /// `changed()` call).
    pub fn current(&self) -> &Arc<ModuleState> {
        &self.current
    }

    /// The latest published snapshot (may be newer than `current`).
    pub fn latest(&self) -> Arc<ModuleState> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next commit to this module, returning the new
    /// snapshot. Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<ModuleState>> {
        self.receiver.changed().await.ok()?;
        let snapshot = self.receiver.borrow_and_update().clone();
        self.current = snapshot.clone();
        Some(snapshot)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> StateWatchStream {
        StateWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
///
/// Yields the snapshot held at conversion time first, then the newest
/// snapshot after each commit. Intermediate snapshots are skipped when
/// polling lags behind commits (watch semantics).
pub struct StateWatchStream {
    inner: WatchStream<Arc<ModuleState>>,
}

impl Stream for StateWatchStream {
    type Item = Arc<ModuleState>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
