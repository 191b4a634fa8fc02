//! src/eventbus/mod.rs
//!
//! The single in-process queue every stream event goes through. Webhook
//! callbacks and the reconciler's synthetic events are published here, and
//! exactly one consumer (the event router) drains it, so all changes to the
//! notification registry happen in one place and in arrival order.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tracing::trace;

use clubstream_common::models::{Broadcaster, BroadcasterId, StreamMeta};

use crate::Error;

/// Decoded provider notification, or a synthetic one emitted by the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Broadcaster went live (or was found live at startup).
    Online {
        broadcaster: Broadcaster,
        stream: StreamMeta,
    },
    Offline {
        broadcaster: Broadcaster,
    },
    /// Title or category changed while live.
    Update {
        broadcaster: Broadcaster,
        stream: StreamMeta,
    },
    /// Broadcaster dropped out of the roster.
    Unsubscribed {
        broadcaster_id: BroadcasterId,
    },
}

impl StreamEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::Online { .. } => "stream.online",
            StreamEvent::Offline { .. } => "stream.offline",
            StreamEvent::Update { .. } => "channel.update",
            StreamEvent::Unsubscribed { .. } => "unsubscribed",
        }
    }

    pub fn broadcaster_id(&self) -> &BroadcasterId {
        match self {
            StreamEvent::Online { broadcaster, .. }
            | StreamEvent::Offline { broadcaster }
            | StreamEvent::Update { broadcaster, .. } => &broadcaster.id,
            StreamEvent::Unsubscribed { broadcaster_id } => broadcaster_id,
        }
    }
}

/// Default queue depth. Publishers wait when it is full (backpressure).
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Cloneable handle to the queue plus the process-wide shutdown flag.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<StreamEvent>,
    rx: Arc<Mutex<Option<mpsc::Receiver<StreamEvent>>>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    pub shutdown_rx: watch::Receiver<bool>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(buffer_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            tx,
            rx: Arc::new(Mutex::new(Some(rx))),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Hands out the consuming end. Only the first caller gets it.
    pub async fn take_receiver(&self) -> Option<mpsc::Receiver<StreamEvent>> {
        self.rx.lock().await.take()
    }

    pub async fn publish(&self, event: StreamEvent) -> Result<(), Error> {
        trace!("(EventBus) publish {} for {}", event.event_type(), event.broadcaster_id());
        self.tx
            .send(event)
            .await
            .map_err(|e| Error::EventBus(format!("event queue closed, dropped {}", e.0.event_type())))
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Fresh receiver for tasks that need to stop when the bus shuts down.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout, Duration};

    fn offline(id: &str) -> StreamEvent {
        StreamEvent::Offline {
            broadcaster: Broadcaster::new(id, id, id),
        }
    }

    #[tokio::test]
    async fn receiver_can_only_be_taken_once() {
        let bus = EventBus::new();
        assert!(bus.take_receiver().await.is_some());
        assert!(bus.take_receiver().await.is_none());
        // clones share the same queue
        assert!(bus.clone().take_receiver().await.is_none());
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let bus = EventBus::new();
        let mut rx = bus.take_receiver().await.unwrap();

        bus.publish(offline("1")).await.unwrap();
        bus.publish(StreamEvent::Unsubscribed { broadcaster_id: "2".into() }).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().broadcaster_id().as_str(), "1");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.event_type(), "unsubscribed");
        assert_eq!(second.broadcaster_id().as_str(), "2");
    }

    #[tokio::test]
    async fn publish_waits_for_space() {
        let bus = EventBus::with_capacity(1);
        let mut rx = bus.take_receiver().await.unwrap();

        bus.publish(offline("first")).await.unwrap();

        let handle = tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            let a = rx.recv().await.unwrap();
            let b = rx.recv().await.unwrap();
            (a, b)
        });

        let res = timeout(Duration::from_millis(500), bus.publish(offline("second"))).await;
        assert!(res.is_ok(), "publish should eventually unblock");

        let (a, b) = handle.await.unwrap();
        assert_eq!(a.broadcaster_id().as_str(), "first");
        assert_eq!(b.broadcaster_id().as_str(), "second");
    }

    #[tokio::test]
    async fn publish_fails_once_consumer_is_gone() {
        let bus = EventBus::new();
        drop(bus.take_receiver().await);
        let err = bus.publish(offline("1")).await.unwrap_err();
        assert!(matches!(err, Error::EventBus(_)));
    }

    #[tokio::test]
    async fn shutdown_flag_reaches_all_clones() {
        let bus = EventBus::new();
        let mut signal = bus.clone().shutdown_signal();
        assert!(!bus.is_shutdown());

        bus.shutdown();
        signal.changed().await.unwrap();
        assert!(*signal.borrow());
        assert!(bus.is_shutdown());
    }
}
