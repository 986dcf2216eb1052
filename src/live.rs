//! Live-update channel: push-style subscriptions over committed writes.
//!
//! Every mutation publishes a [`Change`] naming the query shapes it
//! affected.  A [`LiveQuery`] couples a broadcast receiver with a snapshot
//! closure: the first poll yields the current result set, each later poll
//! waits for a relevant change and re-fetches the whole set.  Delivery is
//! at-least-once full snapshots: a lagged receiver simply re-fetches,
//! which the snapshot contract absorbs.
//!
//! Cancellation is synchronous: after [`LiveQuery::cancel`] the query never
//! yields again.  Subscriptions are owned values, so tearing down the
//! owning context drops the receiver with it; there are no dangling
//! callbacks to leak.

use tokio::sync::broadcast;

use crate::errors::CoreError;

pub const CHANGE_BUS_CAPACITY: usize = 256;

/// A committed write, named by the query shape it invalidates.
///
/// Also the wire payload pushed to WebSocket subscribers, hence the serde
/// tagging.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Change {
    IncomingRequests { user_id: String },
    OutgoingRequests { user_id: String },
    Buddies { user_id: String },
    Conversations { user_id: String },
    Messages { conversation_id: String },
    Profile { user_id: String },
}

/// Clone-able fan-out handle shared by every stateful component.
#[derive(Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<Change>,
}

impl ChangeBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_BUS_CAPACITY);
        Self { tx }
    }

    /// Publish a committed change.  Having no subscribers is not an error.
    pub fn publish(&self, change: Change) {
        let _ = self.tx.send(change);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.tx.subscribe()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to one query.
///
/// `next()` yields `Some(snapshot)` for the initial result set and again
/// after every relevant committed write, in commit order within this
/// subscription.  It yields `None` only after cancellation (or bus
/// shutdown), never a silent empty success.
pub struct LiveQuery<T> {
    rx: broadcast::Receiver<Change>,
    relevant: Box<dyn Fn(&Change) -> bool + Send>,
    fetch: Box<dyn Fn() -> Result<Vec<T>, CoreError> + Send>,
    initial_pending: bool,
    cancelled: bool,
}

impl<T> std::fmt::Debug for LiveQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQuery")
            .field("initial_pending", &self.initial_pending)
            .field("cancelled", &self.cancelled)
            .finish_non_exhaustive()
    }
}

impl<T> LiveQuery<T> {
    pub(crate) fn new(
        rx: broadcast::Receiver<Change>,
        relevant: Box<dyn Fn(&Change) -> bool + Send>,
        fetch: Box<dyn Fn() -> Result<Vec<T>, CoreError> + Send>,
    ) -> Self {
        Self {
            rx,
            relevant,
            fetch,
            initial_pending: true,
            cancelled: false,
        }
    }

    /// Wait for the next snapshot.  The first call returns immediately with
    /// the current result set.
    pub async fn next(&mut self) -> Option<Result<Vec<T>, CoreError>> {
        if self.cancelled {
            return None;
        }
        if self.initial_pending {
            self.initial_pending = false;
            return Some((self.fetch)());
        }
        loop {
            match self.rx.recv().await {
                Ok(change) if (self.relevant)(&change) => return Some((self.fetch)()),
                Ok(_) => continue,
                // Missed events collapse into one re-fetch: the snapshot
                // already reflects every write we skipped.
                Err(broadcast::error::RecvError::Lagged(_)) => return Some((self.fetch)()),
                Err(broadcast::error::RecvError::Closed) => {
                    self.cancelled = true;
                    return None;
                }
            }
        }
    }

    /// Stop the subscription.  Takes effect immediately: no snapshot is
    /// ever delivered after this returns.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}
