#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **usc-bus** – Status event bus for the Universe Synchronization Core.
//! This crate provides the fundamental event bus trait and types shared by
//! every component that emits or observes [`StatusEvent`]s. It sits at the
//! deterministic core layer: lightweight, in-memory broadcasting with no
//! persistence or I/O concerns of its own. The bus preserves per-source
//! emission order: events emitted by a single [`EventSource`] are delivered
//! to every observer in the order they were published. Ordering across
//! distinct sources is not guaranteed.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use usc_types::StatusEvent;

//─────────────────────────────
//  Status bus trait
//─────────────────────────────

/// Core status bus abstraction for publishing and observing [`StatusEvent`]s.
///
/// The bus provides a simple publish-subscribe mechanism that allows the
/// Engine, Auth, Manager, and Rate Limiter components to report status
/// asynchronously while staying loosely coupled.
pub trait StatusBus: Send + Sync {
    /// Publish an event to all current subscribers.
    ///
    /// Completes without blocking on subscribers. If a subscriber is slow
    /// or absent, the bus may drop events for it to maintain system
    /// responsiveness — dropped events surface to that subscriber as a
    /// lagged-receiver error, never as a silent gap.
    fn publish(&self, event: StatusEvent) -> Result<()>;

    /// Subscribe to the live status stream.
    ///
    /// Returns a receiver that observes every event published after the
    /// subscription was created. A subscriber that falls too far behind
    /// may miss events once the ring buffer wraps.
    fn subscribe(&self) -> broadcast::Receiver<StatusEvent>;
}

//─────────────────────────────
//  In-memory bus implementation
//─────────────────────────────

/// Simple in-memory, broadcast-only status bus using Tokio channels. Used
/// both as the process-wide singleton passed to every component and, with a
/// small capacity, as a test double.
#[derive(Debug, Clone)]
pub struct InMemoryStatusBus {
    tx: Arc<broadcast::Sender<StatusEvent>>,
}

impl Default for InMemoryStatusBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl InMemoryStatusBus {
    /// Create a new in-memory bus with the specified ring buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx: Arc::new(tx) }
    }

    /// Get the current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl StatusBus for InMemoryStatusBus {
    fn publish(&self, event: StatusEvent) -> Result<()> {
        // A send with zero receivers is not an error - status events may be
        // published before the HTTP stream has any listener attached.
        let _ = self.tx.send(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }
}

//─────────────────────────────
//  Error types
//─────────────────────────────

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Event could not be published.
    #[error("failed to publish event: {0}")]
    PublishFailed(String),
    /// Subscription failed.
    #[error("failed to create subscription: {0}")]
    SubscriptionFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;
    use usc_types::{EventSource, StatusKind};

    fn event(source: EventSource, kind: StatusKind) -> StatusEvent {
        StatusEvent::new(source, kind, "test")
    }

    #[tokio::test]
    async fn publish_then_subscribe_roundtrip() {
        let bus = InMemoryStatusBus::new(16);
        let mut rx = bus.subscribe();

        let evt = event(EventSource::Manager, StatusKind::Idle);
        bus.publish(evt.clone()).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, evt.kind);
        assert_eq!(received.source, evt.source);
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = InMemoryStatusBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        let evt = event(
            EventSource::Engine("alpha".into()),
            StatusKind::Committed {
                sha: "deadbeef".into(),
            },
        );
        bus.publish(evt.clone()).unwrap();

        assert_eq!(rx1.recv().await.unwrap().kind, evt.kind);
        assert_eq!(rx2.recv().await.unwrap().kind, evt.kind);
    }

    #[tokio::test]
    async fn events_from_one_source_are_delivered_in_emission_order() {
        let bus = InMemoryStatusBus::new(16);
        let mut rx = bus.subscribe();

        let source = EventSource::Engine("alpha".into());
        let emitted = vec![
            event(source.clone(), StatusKind::Idle),
            event(source.clone(), StatusKind::Committing),
            event(
                source.clone(),
                StatusKind::Committed {
                    sha: "abc123".into(),
                },
            ),
        ];
        for evt in &emitted {
            bus.publish(evt.clone()).unwrap();
        }

        for evt in &emitted {
            let received = rx.recv().await.unwrap();
            assert_eq!(received.kind, evt.kind);
        }
    }

    #[tokio::test]
    async fn lagging_subscriber_sees_lagged_error_not_a_silent_gap() {
        let bus = InMemoryStatusBus::new(2);
        let mut rx = bus.subscribe();

        for i in 0..5 {
            bus.publish(event(
                EventSource::Engine("alpha".into()),
                StatusKind::Backoff {
                    attempt: i,
                    next_try_at: chrono::Utc::now(),
                },
            ))
            .unwrap();
        }

        match rx.recv().await {
            Ok(_) => {
                while rx.recv().await.is_ok() {}
            }
            Err(RecvError::Lagged(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
