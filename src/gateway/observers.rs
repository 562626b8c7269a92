//! Connected dashboard observers
//!
//! Each observer owns a bounded outbound queue. Broadcasting never waits: a
//! full queue drops that message for that observer only, and a closed queue
//! removes the observer.

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use super::PushMessage;
use crate::metrics;

pub struct ObserverRegistry {
    observers: DashMap<String, mpsc::Sender<PushMessage>>,
    buffer: usize,
}

/// Outcome of a single send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Dropped,
    Removed,
}

impl ObserverRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            observers: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    pub fn connect(&self) -> (String, mpsc::Receiver<PushMessage>) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.buffer);
        self.observers.insert(id.clone(), tx);
        metrics::set_observers(self.observers.len());
        tracing::debug!(observer = %id, "Observer connected");
        (id, rx)
    }

    pub fn disconnect(&self, id: &str) -> bool {
        let removed = self.observers.remove(id).is_some();
        if removed {
            metrics::set_observers(self.observers.len());
            tracing::debug!(observer = %id, "Observer disconnected");
        }
        removed
    }

    /// Drop every observer queue, ending their streams.
    pub fn disconnect_all(&self) -> usize {
        let count = self.observers.len();
        self.observers.clear();
        metrics::set_observers(0);
        count
    }

    pub fn contains(&self, id: &str) -> bool {
        self.observers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Send to one observer. `None` means the id is not connected.
    pub fn send_to(&self, id: &str, message: PushMessage) -> Option<Delivery> {
        let result = self.observers.get(id)?.try_send(message);
        let delivery = classify(id, result);
        if delivery == Delivery::Removed {
            self.disconnect(id);
        }
        Some(delivery)
    }

    /// Send to every observer, returning how many accepted the message.
    pub fn broadcast(&self, message: &PushMessage) -> usize {
        let mut sent = 0;
        let mut closed = Vec::new();

        for observer in self.observers.iter() {
            match classify(observer.key(), observer.value().try_send(message.clone())) {
                Delivery::Sent => sent += 1,
                Delivery::Dropped => {}
                Delivery::Removed => closed.push(observer.key().clone()),
            }
        }

        // removal happens after iteration so no shard lock is held
        for id in closed {
            self.disconnect(&id);
        }

        sent
    }
}

fn classify(id: &str, result: Result<(), TrySendError<PushMessage>>) -> Delivery {
    match result {
        Ok(()) => Delivery::Sent,
        Err(TrySendError::Full(message)) => {
            tracing::debug!(observer = %id, event = message.event_name(), "Observer queue full, dropping message");
            Delivery::Dropped
        }
        Err(TrySendError::Closed(_)) => Delivery::Removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleared(n: usize) -> PushMessage {
        PushMessage::LogsCleared { cleared: n }
    }

    #[test]
    fn test_broadcast_reaches_everyone() {
        let registry = ObserverRegistry::new(4);
        let (_, mut a) = registry.connect();
        let (_, mut b) = registry.connect();

        assert_eq!(registry.broadcast(&cleared(1)), 2);
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());
    }

    #[test]
    fn test_closed_observer_is_removed_without_affecting_others() {
        let registry = ObserverRegistry::new(4);
        let (_, dropped) = registry.connect();
        let (_, mut alive) = registry.connect();
        drop(dropped);

        assert_eq!(registry.broadcast(&cleared(1)), 1);
        assert_eq!(registry.len(), 1);
        assert!(alive.try_recv().is_ok());
    }

    #[test]
    fn test_full_queue_drops_message_but_keeps_observer() {
        let registry = ObserverRegistry::new(1);
        let (id, mut rx) = registry.connect();

        assert_eq!(registry.send_to(&id, cleared(1)), Some(Delivery::Sent));
        assert_eq!(registry.send_to(&id, cleared(2)), Some(Delivery::Dropped));
        assert!(registry.contains(&id));

        match rx.try_recv() {
            Ok(PushMessage::LogsCleared { cleared }) => assert_eq!(cleared, 1),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_send_to_unknown() {
        let registry = ObserverRegistry::new(1);
        assert!(registry.send_to("missing", cleared(1)).is_none());
        assert!(!registry.disconnect("missing"));
    }
}
