use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::errors::StoreError;
use crate::store::KeyspaceEvent;
use crate::Result;

/// Capacity of the per-subscription event channel. A slow consumer blocks the
/// adaptor's forwarding task, which is the intended flow control.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Handle on a keyspace-notification subscription.
///
/// Closing the handle (or dropping it) cancels the adaptor's forwarding task,
/// which unsubscribes from the backend; any pending receive unblocks within
/// one timeout interval.
pub struct KeyspaceSubscription {
    rx: mpsc::Receiver<KeyspaceEvent>,
    cancel: CancellationToken,
}

impl KeyspaceSubscription {
    pub(crate) fn new(rx: mpsc::Receiver<KeyspaceEvent>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Receives the next event, waiting at most `wait`.
    ///
    /// `Ok(Some(_))` carries an event, `Ok(None)` means the wait elapsed, and
    /// `Err(SubscriptionClosed)` means the subscription was torn down.
    pub async fn recv(&mut self, wait: Duration) -> Result<Option<KeyspaceEvent>> {
        match timeout(wait, self.rx.recv()).await {
            Ok(Some(event)) => Ok(Some(event)),
            Ok(None) => Err(StoreError::SubscriptionClosed.into()),
            Err(_) => Ok(None),
        }
    }

    /// Unsubscribes. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for KeyspaceSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
