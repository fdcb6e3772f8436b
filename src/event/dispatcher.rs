//! Fan-out of panel updates to renderers.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::event::PanelUpdate;

/// A subscription to panel updates.
pub struct Subscription {
    receiver: broadcast::Receiver<PanelUpdate>,
}

impl Subscription {
    /// Receives the next update.
    ///
    /// A subscriber that falls behind skips the updates it missed rather
    /// than failing. Returns `None` once the dispatcher is gone.
    pub async fn recv(&mut self) -> Option<PanelUpdate> {
        loop {
            match self.receiver.recv().await {
                Ok(update) => return Some(update),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("subscriber lagged, skipped {} updates", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Publishes panel updates to all subscribers.
///
/// Clones share one channel.
#[derive(Clone)]
pub struct UpdateDispatcher {
    sender: broadcast::Sender<PanelUpdate>,
}

impl UpdateDispatcher {
    /// Creates a new dispatcher buffering up to `capacity` updates per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an update and returns how many subscribers it reached.
    pub fn dispatch(&self, update: PanelUpdate) -> usize {
        // nobody listening: the update is dropped
        self.sender.send(update).unwrap_or(0)
    }

    /// Subscribes to updates published from now on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Waits for an update matching `predicate`.
    ///
    /// Returns `None` if the timeout expires or the dispatcher is gone.
    pub async fn wait_for<F>(&self, predicate: F, timeout: Duration) -> Option<PanelUpdate>
    where
        F: Fn(&PanelUpdate) -> bool,
    {
        let mut subscription = self.subscribe();

        tokio::select! {
            biased;
            result = async {
                while let Some(update) = subscription.recv().await {
                    if predicate(&update) {
                        return Some(update);
                    }
                }
                None
            } => result,
            () = tokio::time::sleep(timeout) => None,
        }
    }
}
