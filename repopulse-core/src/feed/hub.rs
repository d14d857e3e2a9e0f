//! Fan-out of feed signals to subscribers.

use crate::error::FeedError;
use crate::subscription::{SubscriptionId, Subscribers};
use crate::types::FeedMessage;

use super::parse::parse_batch;

/// What an event source hands to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedSignal {
    /// A well-formed batch of messages
    Batch(Vec<FeedMessage>),
    /// A parse or transport failure; nothing from it reaches the batch path
    Error(FeedError),
}

/// Delivery counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FeedStats {
    pub batches: usize,
    pub messages: usize,
    pub errors: usize,
}

/// Subscriber registry plus payload classification for one event source.
#[derive(Debug)]
pub struct FeedHub {
    category_key: String,
    subscribers: Subscribers<FeedSignal>,
    stats: FeedStats,
}

impl FeedHub {
    pub fn new(category_key: impl Into<String>) -> Self {
        Self {
            category_key: category_key.into(),
            subscribers: Subscribers::new(),
            stats: FeedStats::default(),
        }
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&FeedSignal) + Send + 'static,
    {
        self.subscribers.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Parse a raw payload and publish either the batch or the parse error.
    ///
    /// Empty batches are dropped silently.
    pub fn publish_payload(&mut self, payload: &str) {
        match parse_batch(payload, &self.category_key) {
            Ok(batch) => self.publish_batch(batch),
            Err(e) => self.publish_error(e),
        }
    }

    pub fn publish_batch(&mut self, batch: Vec<FeedMessage>) {
        if batch.is_empty() {
            return;
        }
        self.stats.batches += 1;
        self.stats.messages += batch.len();
        tracing::debug!(messages = batch.len(), "Feed batch received");
        self.subscribers.notify(&FeedSignal::Batch(batch));
    }

    pub fn publish_error(&mut self, error: FeedError) {
        self.stats.errors += 1;
        tracing::warn!(error = %error, "Feed error");
        self.subscribers.notify(&FeedSignal::Error(error));
    }

    pub fn category_key(&self) -> &str {
        &self.category_key
    }

    pub fn stats(&self) -> &FeedStats {
        &self.stats
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// A producer of feed signals with the subscribe/unsubscribe contract.
pub trait EventSource {
    fn hub_mut(&mut self) -> &mut FeedHub;

    fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&FeedSignal) + Send + 'static,
        Self: Sized,
    {
        self.hub_mut().subscribe(handler)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.hub_mut().unsubscribe(id)
    }
}

impl EventSource for FeedHub {
    fn hub_mut(&mut self) -> &mut FeedHub {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_hub() -> (FeedHub, Arc<Mutex<Vec<FeedSignal>>>) {
        let mut hub = FeedHub::new("language");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        hub.subscribe(move |signal: &FeedSignal| sink.lock().unwrap().push(signal.clone()));
        (hub, seen)
    }

    #[test]
    fn test_valid_payload_is_published_as_batch() {
        let (mut hub, seen) = recording_hub();
        hub.publish_payload(r#"[{"language": "Rust"}, {"language": "Go"}]"#);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(&seen[0], FeedSignal::Batch(batch) if batch.len() == 2));
        assert_eq!(hub.stats().messages, 2);
    }

    #[test]
    fn test_malformed_payload_goes_to_error_channel() {
        let (mut hub, seen) = recording_hub();
        hub.publish_payload("not json");

        let seen = seen.lock().unwrap();
        assert!(matches!(&seen[0], FeedSignal::Error(FeedError::Parse { .. })));
        assert_eq!(hub.stats().errors, 1);
        assert_eq!(hub.stats().batches, 0);
    }

    #[test]
    fn test_empty_batch_not_published() {
        let (mut hub, seen) = recording_hub();
        hub.publish_payload("[]");
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unsubscribe_through_event_source() {
        let mut hub = FeedHub::new("language");
        let id = EventSource::subscribe(&mut hub, |_: &FeedSignal| {});
        assert_eq!(hub.subscriber_count(), 1);
        assert!(EventSource::unsubscribe(&mut hub, id));
        assert_eq!(hub.subscriber_count(), 0);
    }
}
