use log::trace;
use tokio::sync::broadcast;

use super::printer::PrinterId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorEvent {
    Added(PrinterId),
    Updated(PrinterId),
    Removed(PrinterId),
}

impl MonitorEvent {
    pub fn printer(&self) -> PrinterId {
        match self {
            MonitorEvent::Added(id) | MonitorEvent::Updated(id) | MonitorEvent::Removed(id) => *id,
        }
    }
}

/// Fan-out of monitor events to any number of subscribers.
///
/// Emitting never blocks. A subscriber that falls more than `capacity` events
/// behind skips the oldest ones and sees `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        EventBus { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: MonitorEvent) {
        // No subscribers is fine.
        if self.sender.send(event).is_err() {
            trace!("Dropped {:?}, nobody is listening", event);
        }
    }
}
