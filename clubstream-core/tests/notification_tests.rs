// File: clubstream-core/tests/notification_tests.rs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use mockall::{mock, predicate::*, Sequence};

use clubstream_common::models::{
    Broadcaster, BroadcasterId, DiscordColor, MessageContent, MessageHandle, StreamMeta,
    SubscriptionKind,
};
use clubstream_common::traits::PresentationSink;
use clubstream_core::services::NotificationManager;
use clubstream_core::test_utils::{FakeEventSource, RecordingSink, SinkCall, SourceCall};
use clubstream_core::{Error, ExpiryPolicy, StreamEvent};

mock! {
    pub Sink {}

    #[async_trait]
    impl PresentationSink for Sink {
        async fn post(&self, content: &MessageContent) -> Result<MessageHandle, Error>;
        async fn edit(&self, handle: &MessageHandle, content: &MessageContent) -> Result<(), Error>;
        async fn delete(&self, handle: &MessageHandle) -> Result<(), Error>;
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap()
}

fn racer() -> Broadcaster {
    Broadcaster::new("42", "turbo_racer", "Turbo_Racer")
}

fn stream(title: &str, started_at: Option<DateTime<Utc>>) -> StreamMeta {
    StreamMeta {
        title: title.into(),
        game_name: "Trackmania".into(),
        started_at,
    }
}

fn with_recording_sink() -> (NotificationManager, Arc<RecordingSink>, Arc<FakeEventSource>) {
    let sink = Arc::new(RecordingSink::new());
    let source = Arc::new(FakeEventSource::new());
    let manager = NotificationManager::new(sink.clone(), source.clone(), ExpiryPolicy::default());
    (manager, sink, source)
}

fn with_mock_sink(sink: MockSink) -> NotificationManager {
    NotificationManager::new(
        Arc::new(sink),
        Arc::new(FakeEventSource::new()),
        ExpiryPolicy::default(),
    )
}

fn id() -> BroadcasterId {
    BroadcasterId::from("42")
}

#[tokio::test]
async fn online_update_offline_lifecycle() {
    let (mut mgr, sink, source) = with_recording_sink();

    mgr.on_online(racer(), stream("X", Some(t0())), t0()).await.unwrap();
    let t1 = t0() + Duration::minutes(20);
    mgr.on_update(racer(), stream("Y", None), t1).await.unwrap();

    let visible = sink.visible().await;
    assert_eq!(visible.len(), 1);
    let shown = visible.values().next().unwrap();
    assert_eq!(shown.description.as_deref(), Some("Y\nTrackmania"));
    assert_eq!(shown.timestamp, t0());
    assert_eq!(shown.color, DiscordColor::GREEN);

    let entry = mgr.get(&id()).unwrap();
    assert!(entry.is_online);
    assert_eq!(entry.session_started_at, t0());
    assert_eq!(entry.last_changed_at, t1);
    assert!(mgr.has_update_subscription(&id()));

    let t2 = t0() + Duration::hours(2);
    mgr.on_offline(racer(), t2).await.unwrap();

    let visible = sink.visible().await;
    assert_eq!(visible.len(), 1);
    let shown = visible.values().next().unwrap();
    assert_eq!(shown.footer, "ended");
    assert_eq!(shown.timestamp, t2);
    assert_eq!(shown.color, DiscordColor::RED);

    let entry = mgr.get(&id()).unwrap();
    assert!(!entry.is_online);
    assert_eq!(entry.last_changed_at, t2);
    assert!(!mgr.has_update_subscription(&id()));

    assert_eq!(sink.posts().await, 1);
    assert_eq!(sink.edits().await, 2);
    assert_eq!(sink.deletes().await, 0);

    let calls = source.calls().await;
    assert!(matches!(calls.first(), Some(SourceCall::CreateUpdate(b)) if b == &id()));
    assert!(matches!(calls.last(), Some(SourceCall::Delete(_))));
}

#[tokio::test]
async fn long_running_online_entry_expires() {
    let (mut mgr, sink, _) = with_recording_sink();
    mgr.on_online(racer(), stream("marathon", Some(t0())), t0()).await.unwrap();

    assert_eq!(mgr.sweep(t0() + Duration::hours(47), false).await, 0);
    assert_eq!(mgr.sweep(t0() + Duration::hours(50), false).await, 1);

    assert!(mgr.is_empty());
    assert!(sink.visible().await.is_empty());
    assert_eq!(sink.deletes().await, 1);
}

#[tokio::test]
async fn ended_notice_expires_after_six_hours() {
    let (mut mgr, sink, _) = with_recording_sink();
    mgr.on_online(racer(), stream("short", Some(t0())), t0()).await.unwrap();
    mgr.on_offline(racer(), t0() + Duration::hours(1)).await.unwrap();

    assert_eq!(mgr.sweep(t0() + Duration::hours(4), false).await, 0);
    assert_eq!(mgr.len(), 1);

    assert_eq!(mgr.sweep(t0() + Duration::hours(8), false).await, 1);
    assert!(mgr.is_empty());
    assert!(sink.visible().await.is_empty());
}

#[tokio::test]
async fn updates_keep_an_entry_fresh() {
    let (mut mgr, _, _) = with_recording_sink();
    mgr.on_online(racer(), stream("a", Some(t0())), t0()).await.unwrap();
    mgr.on_update(racer(), stream("b", None), t0() + Duration::hours(30)).await.unwrap();

    assert_eq!(mgr.sweep(t0() + Duration::hours(50), false).await, 0);
    assert_eq!(mgr.len(), 1);
}

#[tokio::test]
async fn forced_sweep_deletes_every_message_once() {
    let (mut mgr, sink, _) = with_recording_sink();
    for n in 0..3 {
        let b = Broadcaster::new(format!("{n}"), format!("racer{n}"), format!("Racer{n}"));
        mgr.on_online(b, stream("cotd", Some(t0())), t0()).await.unwrap();
    }
    mgr.on_offline(Broadcaster::new("9", "late", "Late"), t0()).await.unwrap();
    sink.reset_calls().await;

    assert_eq!(mgr.sweep(t0(), true).await, 4);

    let calls = sink.calls().await;
    assert_eq!(calls.len(), 4);
    assert!(calls.iter().all(|c| matches!(c, SinkCall::Delete(_))));
    assert!(sink.visible().await.is_empty());
    assert!(mgr.is_empty());

    // nothing left to remove
    assert_eq!(mgr.sweep(t0(), true).await, 0);
}

#[tokio::test]
async fn failed_delete_still_drops_the_entry() {
    let (mut mgr, sink, _) = with_recording_sink();
    mgr.on_online(racer(), stream("x", Some(t0())), t0()).await.unwrap();
    sink.fail_deletes(true).await;

    assert_eq!(mgr.sweep(t0(), true).await, 1);
    assert!(mgr.is_empty());
}

#[tokio::test]
async fn duplicate_online_posts_once() {
    let (mut mgr, sink, source) = with_recording_sink();
    mgr.on_online(racer(), stream("x", Some(t0())), t0()).await.unwrap();
    mgr.on_online(racer(), stream("x", Some(t0())), t0() + Duration::seconds(3))
        .await
        .unwrap();

    assert_eq!(sink.posts().await, 1);
    assert_eq!(sink.deletes().await, 0);
    assert_eq!(sink.visible().await.len(), 1);
    let creates = source
        .calls()
        .await
        .into_iter()
        .filter(SourceCall::is_create)
        .count();
    assert_eq!(creates, 1);
}

#[tokio::test]
async fn webhook_and_lookup_start_times_of_one_session_post_once() {
    let (mut mgr, sink, _) = with_recording_sink();
    let from_webhook = t0() + Duration::milliseconds(123);

    mgr.on_online(racer(), stream("x", Some(from_webhook)), t0()).await.unwrap();
    mgr.on_online(racer(), stream("x", Some(t0())), t0() + Duration::seconds(2))
        .await
        .unwrap();

    assert_eq!(sink.posts().await, 1);
    assert_eq!(sink.deletes().await, 0);
    assert_eq!(mgr.get(&id()).unwrap().session_started_at, from_webhook);
}

#[tokio::test]
async fn failed_update_unsubscribe_is_retried_by_the_sweep() {
    let (mut mgr, _, source) = with_recording_sink();
    mgr.on_online(racer(), stream("x", Some(t0())), t0()).await.unwrap();

    source.fail_deletes(true).await;
    mgr.on_offline(racer(), t0() + Duration::hours(1)).await.unwrap();
    assert!(!mgr.has_update_subscription(&id()));
    assert_eq!(source.count_subscriptions("42", SubscriptionKind::ChannelUpdate).await, 1);

    // still failing: kept for the next tick
    mgr.sweep(t0() + Duration::hours(1), false).await;
    assert_eq!(source.count_subscriptions("42", SubscriptionKind::ChannelUpdate).await, 1);

    source.clear_failures().await;
    mgr.sweep(t0() + Duration::hours(2), false).await;
    assert_eq!(source.count_subscriptions("42", SubscriptionKind::ChannelUpdate).await, 0);

    // the next go-live gets a fresh subscription
    let back = t0() + Duration::hours(3);
    mgr.on_online(racer(), stream("y", Some(back)), back).await.unwrap();
    assert!(mgr.has_update_subscription(&id()));
    assert_eq!(source.count_subscriptions("42", SubscriptionKind::ChannelUpdate).await, 1);
}

#[tokio::test]
async fn at_most_one_entry_per_broadcaster() {
    let (mut mgr, sink, _) = with_recording_sink();
    let mut now = t0();
    let events = vec![
        StreamEvent::Offline { broadcaster: racer() },
        StreamEvent::Online {
            broadcaster: racer(),
            stream: stream("a", Some(t0() + Duration::minutes(1))),
        },
        StreamEvent::Update {
            broadcaster: racer(),
            stream: stream("b", None),
        },
        StreamEvent::Online {
            broadcaster: racer(),
            stream: stream("c", Some(t0() + Duration::hours(1))),
        },
        StreamEvent::Offline { broadcaster: racer() },
        StreamEvent::Offline { broadcaster: racer() },
    ];
    for event in events {
        now += Duration::minutes(5);
        mgr.handle(event, now).await.unwrap();
        assert!(mgr.len() <= 1);
        assert!(sink.visible().await.len() <= 1);
    }
    assert_eq!(mgr.len(), 1);
}

#[tokio::test]
async fn unsubscribed_removes_message_and_update_subscription() {
    let (mut mgr, sink, source) = with_recording_sink();
    mgr.on_online(racer(), stream("x", Some(t0())), t0()).await.unwrap();
    source.reset_calls().await;

    mgr.handle(StreamEvent::Unsubscribed { broadcaster_id: id() }, t0()).await.unwrap();

    assert!(mgr.is_empty());
    assert!(sink.visible().await.is_empty());
    assert!(!mgr.has_update_subscription(&id()));
    assert!(source.calls().await.iter().any(SourceCall::is_delete));

    // unknown broadcaster is a no-op
    mgr.handle(StreamEvent::Unsubscribed { broadcaster_id: "nobody".into() }, t0())
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_post_leaves_no_entry() {
    let (mut mgr, sink, source) = with_recording_sink();
    sink.fail_posts(true).await;

    mgr.on_online(racer(), stream("x", Some(t0())), t0()).await.unwrap();

    assert!(mgr.is_empty());
    assert!(!mgr.has_update_subscription(&id()));
    assert!(source.calls().await.is_empty());
}

#[tokio::test]
async fn fatal_sink_error_is_returned() {
    let (mut mgr, sink, _) = with_recording_sink();
    sink.fail_posts_fatally(true).await;

    let err = mgr.on_online(racer(), stream("x", Some(t0())), t0()).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(mgr.is_empty());
}

#[tokio::test]
async fn online_then_offline_posts_once_and_edits_once() {
    let mut sink = MockSink::new();
    sink.expect_post()
        .withf(|c: &MessageContent| c.footer == "started" && c.timestamp == t0())
        .times(1)
        .returning(|_| Ok(MessageHandle("111".into())));
    sink.expect_edit()
        .withf(|h: &MessageHandle, c: &MessageContent| h.0 == "111" && c.footer == "ended")
        .times(1)
        .returning(|_, _| Ok(()));
    sink.expect_delete().times(0);

    let mut mgr = with_mock_sink(sink);
    mgr.on_online(racer(), stream("x", Some(t0())), t0()).await.unwrap();
    mgr.on_offline(racer(), t0() + Duration::hours(1)).await.unwrap();
}

#[tokio::test]
async fn offline_then_online_replaces_the_message() {
    let mut seq = Sequence::new();
    let mut sink = MockSink::new();
    sink.expect_post()
        .withf(|c: &MessageContent| c.footer == "ended")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(MessageHandle("200".into())));
    sink.expect_delete()
        .with(eq(MessageHandle("200".into())))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    sink.expect_post()
        .withf(|c: &MessageContent| c.footer == "started")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(MessageHandle("201".into())));
    sink.expect_edit().times(0);

    let mut mgr = with_mock_sink(sink);
    mgr.on_offline(racer(), t0()).await.unwrap();
    mgr.on_online(racer(), stream("back", Some(t0() + Duration::minutes(10))), t0() + Duration::minutes(10))
        .await
        .unwrap();

    let entry = mgr.get(&id()).unwrap();
    assert_eq!(entry.message, MessageHandle("201".into()));
    assert!(entry.is_online);
}

#[tokio::test]
async fn new_session_after_missed_offline_reposts() {
    let mut seq = Sequence::new();
    let mut sink = MockSink::new();
    sink.expect_post()
        .withf(|c: &MessageContent| c.timestamp == t0())
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(MessageHandle("300".into())));
    sink.expect_delete()
        .with(eq(MessageHandle("300".into())))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    sink.expect_post()
        .withf(|c: &MessageContent| c.timestamp == t0() + Duration::hours(5))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(MessageHandle("301".into())));

    let mut mgr = with_mock_sink(sink);
    mgr.on_online(racer(), stream("a", Some(t0())), t0()).await.unwrap();
    let later = t0() + Duration::hours(5);
    mgr.on_online(racer(), stream("b", Some(later)), later).await.unwrap();

    assert_eq!(mgr.get(&id()).unwrap().session_started_at, later);
}

#[tokio::test]
async fn update_for_offline_entry_is_ignored() {
    let mut sink = MockSink::new();
    sink.expect_post()
        .times(1)
        .returning(|_| Ok(MessageHandle("400".into())));
    sink.expect_edit().times(0);
    sink.expect_delete().times(0);

    let mut mgr = with_mock_sink(sink);
    mgr.on_offline(racer(), t0()).await.unwrap();
    mgr.on_update(racer(), stream("ignored", None), t0() + Duration::minutes(1))
        .await
        .unwrap();
}
