//! Change notifications for persisted keys.
//!
//! Every backend owns a [`WatchSender`]; each write publishes a
//! [`WatchEvent`] to all streams subscribed at that moment. Streams never
//! replay history.

use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::warn;

/// Type of change that occurred to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// Key was written for the first time.
    Created,
    /// Key existed and was overwritten.
    Updated,
    /// Key was removed.
    Deleted,
    /// The subscriber fell behind and missed events. `key` holds the
    /// stream's pattern; current values must be re-read.
    Lagged,
}

/// A change to one key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    pub key: String,
    pub event_type: EventType,
    /// Raw value after the change; `None` for deletions.
    pub new_value: Option<Vec<u8>>,
    /// Per-key version after the change (0 if deleted).
    pub new_version: u64,
}

impl WatchEvent {
    pub fn created(key: impl Into<String>, value: Vec<u8>, version: u64) -> Self {
        Self {
            key: key.into(),
            event_type: EventType::Created,
            new_value: Some(value),
            new_version: version,
        }
    }

    pub fn updated(key: impl Into<String>, value: Vec<u8>, version: u64) -> Self {
        Self {
            key: key.into(),
            event_type: EventType::Updated,
            new_value: Some(value),
            new_version: version,
        }
    }

    pub fn deleted(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            event_type: EventType::Deleted,
            new_value: None,
            new_version: 0,
        }
    }

    pub fn lagged(pattern: impl Into<String>) -> Self {
        Self {
            key: pattern.into(),
            event_type: EventType::Lagged,
            new_value: None,
            new_version: 0,
        }
    }

    pub fn is_lagged(&self) -> bool {
        self.event_type == EventType::Lagged
    }
}

/// A stream of watch events for a key or key prefix.
///
/// The pattern is an exact key, or a prefix when it ends with `*`. When
/// the subscriber falls behind, the missed events are replaced by a single
/// [`EventType::Lagged`] event.
pub struct WatchStream {
    inner: BroadcastStream<WatchEvent>,
    pattern: String,
}

impl WatchStream {
    pub fn new(receiver: broadcast::Receiver<WatchEvent>, pattern: impl Into<String>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            pattern: pattern.into(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn matches(&self, key: &str) -> bool {
        match self.pattern.strip_suffix('*') {
            Some(prefix) => key.starts_with(prefix),
            None => key == self.pattern,
        }
    }
}

impl Stream for WatchStream {
    type Item = WatchEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    if self.matches(&event.key) {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    warn!(pattern = %self.pattern, skipped, "watch stream lagged");
                    return Poll::Ready(Some(WatchEvent::lagged(self.pattern.clone())));
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Handle for publishing watch events to subscribers.
#[derive(Clone)]
pub struct WatchSender {
    sender: broadcast::Sender<WatchEvent>,
}

impl WatchSender {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn send(&self, event: WatchEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self, pattern: impl Into<String>) -> WatchStream {
        WatchStream::new(self.sender.subscribe(), pattern)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for WatchSender {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[test]
    fn test_event_type_serialize() {
        let json = serde_json::to_string(&EventType::Updated).unwrap();
        assert_eq!(json, "\"Updated\"");
    }

    #[test]
    fn test_watch_event_constructors() {
        let event = WatchEvent::created("/settings/sort", vec![1], 1);
        assert_eq!(event.event_type, EventType::Created);
        assert_eq!(event.new_value, Some(vec![1]));

        let event = WatchEvent::updated("/settings/sort", vec![2], 2);
        assert_eq!(event.event_type, EventType::Updated);
        assert_eq!(event.new_version, 2);

        let event = WatchEvent::deleted("/settings/sort");
        assert_eq!(event.event_type, EventType::Deleted);
        assert!(event.new_value.is_none());
        assert_eq!(event.new_version, 0);
    }

    #[test]
    fn test_pattern_matching() {
        let sender = WatchSender::new(16);

        let prefix = sender.subscribe("/settings/*");
        assert!(prefix.matches("/settings/mrgPart"));
        assert!(!prefix.matches("/cache/monsters"));

        let exact = sender.subscribe("/settings/mrgPart");
        assert!(exact.matches("/settings/mrgPart"));
        assert!(!exact.matches("/settings/mrgPartX"));
        assert_eq!(sender.receiver_count(), 2);
    }

    #[tokio::test]
    async fn test_stream_filters_and_orders() {
        let sender = WatchSender::new(16);
        let mut stream = sender.subscribe("/settings/a");

        sender.send(WatchEvent::created("/settings/b", vec![0], 1));
        sender.send(WatchEvent::created("/settings/a", vec![1], 1));
        sender.send(WatchEvent::updated("/settings/a", vec![2], 2));

        let first = stream.next().await.unwrap();
        let second = stream.next().await.unwrap();
        assert_eq!(first.new_value, Some(vec![1]));
        assert_eq!(second.new_value, Some(vec![2]));
    }

    #[tokio::test]
    async fn test_no_history_for_late_subscriber() {
        let sender = WatchSender::new(16);
        sender.send(WatchEvent::created("/k", vec![1], 1));

        let mut stream = sender.subscribe("/k");
        sender.send(WatchEvent::updated("/k", vec![2], 2));

        let event = stream.next().await.unwrap();
        assert_eq!(event.new_version, 2);
    }

    #[tokio::test]
    async fn test_lag_is_reported_once() {
        let sender = WatchSender::new(2);
        let mut stream = sender.subscribe("/k");

        for version in 1..=5 {
            sender.send(WatchEvent::updated("/k", vec![version as u8], version));
        }

        let event = stream.next().await.unwrap();
        assert!(event.is_lagged());
        assert_eq!(event.key, "/k");
        assert_eq!(stream.next().await.unwrap().new_version, 4);
        assert_eq!(stream.next().await.unwrap().new_version, 5);
    }

    #[tokio::test]
    async fn test_stream_ends_when_sender_dropped() {
        let sender = WatchSender::new(4);
        let mut stream = sender.subscribe("/k");
        drop(sender);
        assert!(stream.next().await.is_none());
    }
}
