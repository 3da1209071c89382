//! System Event Stream
//!
//! Publish/subscribe channel for runtime events that have no natural
//! receiver, chiefly dead letters.

use crate::messages::Message;
use crate::pid::Pid;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A message that could not be delivered
#[derive(Debug, Clone)]
pub struct DeadLetterEvent {
    pub pid: Pid,
    pub message: Option<Message>,
    pub sender: Option<Pid>,
    /// Name of the system message variant when the dead letter was a system message
    pub system_message: Option<&'static str>,
}

/// Events published by the runtime
#[derive(Debug, Clone)]
pub enum SystemEvent {
    DeadLetter(DeadLetterEvent),
}

type Handler = Arc<dyn Fn(&SystemEvent) + Send + Sync>;

/// Handle returned by [`EventStream::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// Synchronous fan-out of system events to subscribers
#[derive(Default)]
pub struct EventStream {
    subscribers: RwLock<Vec<(Subscription, Handler)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("subscribers", &self.subscribers.read().len())
            .finish()
    }
}

impl EventStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; it runs on the publishing thread and must not block
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SystemEvent) + Send + Sync + 'static,
    {
        let subscription = Subscription(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .push((subscription, Arc::new(handler)));
        subscription
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(s, _)| *s != subscription);
        subscribers.len() != before
    }

    pub fn publish(&self, event: &SystemEvent) {
        // Handlers may subscribe or publish themselves; never call them under the lock.
        let handlers: Vec<Handler> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn dead_letter(id: &str) -> SystemEvent {
        SystemEvent::DeadLetter(DeadLetterEvent {
            pid: Pid::local(id),
            message: None,
            sender: None,
            system_message: None,
        })
    }

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let stream = EventStream::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = Arc::clone(&count);
            stream.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        stream.publish(&dead_letter("a"));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let stream = EventStream::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let sub = stream.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        stream.publish(&dead_letter("a"));
        assert!(stream.unsubscribe(sub));
        assert!(!stream.unsubscribe(sub));
        stream.publish(&dead_letter("b"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(stream.subscriber_count(), 0);
    }
}
