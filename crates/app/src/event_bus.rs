//! In-process state bus backed by a tokio broadcast channel.

use tokio::sync::broadcast;

use homescript_domain::state::StateChange;

use crate::ports::StatePublisher;

/// In-process bus carrying state-change notifications.
///
/// Publishing succeeds even when there are no active subscribers
/// (the notification is simply dropped).
pub struct InProcessStateBus {
    sender: broadcast::Sender<StateChange>,
}

impl InProcessStateBus {
    /// Create a new bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to notifications published *after* this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.sender.subscribe()
    }
}

impl StatePublisher for InProcessStateBus {
    fn publish(&self, change: StateChange) {
        // send fails only when there are zero receivers, which is fine
        let _ = self.sender.send(change);
    }
}
