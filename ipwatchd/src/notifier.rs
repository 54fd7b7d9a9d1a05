use tokio::sync::broadcast;
use shared::types::EntryEvent;

/// Fans entry events out to every connected viewer.
///
/// Delivery is best-effort: nothing is replayed to late subscribers, and a
/// viewer that falls more than `capacity` events behind skips the overflow.
/// Each viewer sees events in publish order.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<EntryEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Never blocks; a no-op when nobody is connected
    pub fn publish(&self, event: EntryEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No viewers connected, event dropped");
        }
    }

    /// Receiver for one viewer session
    pub fn subscribe(&self) -> broadcast::Receiver<EntryEvent> {
        self.tx.subscribe()
    }

    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
