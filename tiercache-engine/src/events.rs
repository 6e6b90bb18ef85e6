//! Event channel for coordinator side effects.

use tiercache_core::CacheEvent;
use tokio::sync::broadcast;

/// Broadcast channel carrying [`CacheEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CacheEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Never blocks; slow subscribers lag instead.
    pub fn emit(&self, event: CacheEvent) {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(receivers) => {
                tracing::trace!(event_type = event_type, receivers, "Emitted cache event");
            }
            Err(_) => {
                tracing::trace!(event_type = event_type, "No receivers for cache event");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_receivers() {
        let bus = EventBus::new(8);
        bus.emit(CacheEvent::Warmup { count: 1 });
        assert_eq!(bus.receiver_count(), 0);
    }

    #[test]
    fn test_emit_with_receiver() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let event = CacheEvent::Delete {
            keys: vec!["k".to_string()],
        };
        bus.emit(event.clone());
        assert_eq!(rx.try_recv().expect("Should receive event"), event);
    }
}
