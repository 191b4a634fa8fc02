// File: src/services/event_router.rs

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::eventbus::EventBus;
use crate::services::notification_manager::NotificationManager;
use crate::Error;

/// The only consumer of the event bus. Owns the notification manager, so
/// every webhook event, synthetic reconciler event and sweep tick is applied
/// one at a time.
pub struct EventRouter {
    bus: EventBus,
    manager: NotificationManager,
    sweep_interval: Duration,
    shutdown_timeout: Duration,
}

impl EventRouter {
    pub fn new(
        bus: EventBus,
        manager: NotificationManager,
        sweep_interval: Duration,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            bus,
            manager,
            sweep_interval,
            shutdown_timeout,
        }
    }

    /// Runs until the bus shuts down or the manager reports a fatal error,
    /// then removes every message it still holds. The fatal error, if any,
    /// is returned after that final sweep.
    pub async fn run(mut self) -> Result<(), Error> {
        let mut rx = self
            .bus
            .take_receiver()
            .await
            .ok_or_else(|| Error::EventBus("event receiver already taken".into()))?;
        let mut shutdown_rx = self.bus.shutdown_signal();

        let mut sweep = interval_at(Instant::now() + self.sweep_interval, self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("event router started (sweep every {:?})", self.sweep_interval);
        let mut outcome = Ok(());

        while !self.bus.is_shutdown() {
            tokio::select! {
                biased;
                // Polled before the queue; a busy queue must not starve expiry.
                _ = sweep.tick() => {
                    let removed = self.manager.sweep(Utc::now(), false).await;
                    debug!("sweep tick: {} removed, {} remaining", removed, self.manager.len());
                }
                maybe_event = rx.recv() => {
                    let Some(event) = maybe_event else {
                        info!("event queue closed; stopping router");
                        break;
                    };
                    if let Err(e) = self.manager.handle(event, Utc::now()).await {
                        error!("fatal error while handling event: {}", e);
                        outcome = Err(e);
                        self.bus.shutdown();
                        break;
                    }
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("event router received shutdown");
                        break;
                    }
                },
            }
        }

        self.final_sweep().await;
        outcome
    }

    async fn final_sweep(&mut self) {
        let pending = self.manager.len();
        info!("final cleanup: removing {} message(s)", pending);
        let result = timeout(self.shutdown_timeout, self.manager.sweep(Utc::now(), true)).await;
        match result {
            Ok(removed) => info!("final cleanup removed {} message(s)", removed),
            Err(_) => warn!(
                "final cleanup did not finish within {:?}; {} of {} message(s) may remain",
                self.shutdown_timeout,
                self.manager.len(),
                pending
            ),
        }
    }
}

/// Spawns the router on its own task. The handle resolves once the final
/// cleanup has run.
pub fn spawn_event_router(router: EventRouter) -> JoinHandle<Result<(), Error>> {
    tokio::spawn(router.run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use clubstream_common::models::{Broadcaster, MessageContent, MessageHandle, StreamMeta};
    use clubstream_common::traits::PresentationSink;

    use crate::config::ExpiryPolicy;
    use crate::eventbus::StreamEvent;
    use crate::test_utils::{FakeEventSource, RecordingSink, SinkCall};

    fn router(bus: &EventBus) -> (EventRouter, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let source = Arc::new(FakeEventSource::new());
        let manager = NotificationManager::new(sink.clone(), source, ExpiryPolicy::default());
        let router = EventRouter::new(
            bus.clone(),
            manager,
            Duration::from_secs(3600),
            Duration::from_secs(5),
        );
        (router, sink)
    }

    fn online(id: &str) -> StreamEvent {
        StreamEvent::Online {
            broadcaster: Broadcaster::new(id, id, id),
            stream: StreamMeta {
                title: "live".into(),
                game_name: "Trackmania".into(),
                started_at: Some(Utc::now()),
            },
        }
    }

    #[tokio::test]
    async fn queued_events_are_handled_then_cleaned_up_on_shutdown() {
        let bus = EventBus::new();
        let (router, sink) = router(&bus);

        bus.publish(online("1")).await.unwrap();
        bus.publish(online("2")).await.unwrap();
        let handle = spawn_event_router(router);

        // Wait for both posts before pulling the plug.
        for _ in 0..100 {
            if sink.posts().await == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        bus.shutdown();

        handle.await.unwrap().unwrap();
        assert_eq!(sink.posts().await, 2);
        assert_eq!(sink.deletes().await, 2);
        assert!(sink.visible().await.is_empty());
    }

    #[tokio::test]
    async fn fatal_error_stops_router_and_shuts_bus_down() {
        let bus = EventBus::new();
        let (router, sink) = router(&bus);
        sink.fail_posts_fatally(true).await;

        bus.publish(online("1")).await.unwrap();
        let err = spawn_event_router(router).await.unwrap().unwrap_err();

        assert!(err.is_fatal());
        assert!(bus.is_shutdown());
        let calls = sink.calls().await;
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], SinkCall::Post(_)));
    }

    #[tokio::test]
    async fn router_needs_the_event_receiver() {
        let bus = EventBus::new();
        let (first, _) = router(&bus);
        let (second, _) = router(&bus);

        let _ = bus.take_receiver().await;
        assert!(matches!(first.run().await, Err(Error::EventBus(_))));
        assert!(matches!(second.run().await, Err(Error::EventBus(_))));
    }

    #[tokio::test]
    async fn sweep_ticks_run_while_the_queue_stays_busy() {
        let bus = EventBus::new();
        let sink = Arc::new(RecordingSink::new());
        let expiry = ExpiryPolicy {
            max_age: chrono::Duration::zero(),
            offline_max_age: chrono::Duration::zero(),
        };
        let manager = NotificationManager::new(sink.clone(), Arc::new(FakeEventSource::new()), expiry);
        let router = EventRouter::new(
            bus.clone(),
            manager,
            Duration::from_millis(20),
            Duration::from_secs(5),
        );
        let handle = spawn_event_router(router);

        let started = Utc::now();
        let producer = {
            let bus = bus.clone();
            tokio::spawn(async move {
                loop {
                    let event = StreamEvent::Online {
                        broadcaster: Broadcaster::new("1", "1", "1"),
                        stream: StreamMeta {
                            title: "live".into(),
                            game_name: "Trackmania".into(),
                            started_at: Some(started),
                        },
                    };
                    if bus.publish(event).await.is_err() {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..200 {
            if sink.deletes().await > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let swept = sink.deletes().await;
        producer.abort();
        bus.shutdown();
        handle.await.unwrap().unwrap();

        assert!(swept > 0, "no sweep ran while events kept arriving");
    }

    /// Posts fine, but its deletes never complete.
    struct StalledSink {
        posts: std::sync::atomic::AtomicU64,
    }

    #[async_trait::async_trait]
    impl PresentationSink for StalledSink {
        async fn post(&self, _content: &MessageContent) -> Result<MessageHandle, Error> {
            let n = self.posts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(MessageHandle(format!("stalled-{n}")))
        }

        async fn edit(&self, _handle: &MessageHandle, _content: &MessageContent) -> Result<(), Error> {
            Ok(())
        }

        async fn delete(&self, _handle: &MessageHandle) -> Result<(), Error> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn final_cleanup_gives_up_after_the_shutdown_timeout() {
        let bus = EventBus::new();
        let sink = Arc::new(StalledSink {
            posts: std::sync::atomic::AtomicU64::new(0),
        });
        let manager = NotificationManager::new(
            sink.clone(),
            Arc::new(FakeEventSource::new()),
            ExpiryPolicy::default(),
        );
        let router = EventRouter::new(
            bus.clone(),
            manager,
            Duration::from_secs(3600),
            Duration::from_millis(50),
        );

        bus.publish(online("1")).await.unwrap();
        let handle = spawn_event_router(router);
        for _ in 0..100 {
            if sink.posts.load(std::sync::atomic::Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        bus.shutdown();

        let finished = timeout(Duration::from_secs(5), handle).await;
        assert!(matches!(finished, Ok(Ok(Ok(())))));
    }
}
