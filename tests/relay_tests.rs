// ABOUTME: End-to-end relay tests wiring mock backends through buses, router, bridges and supervisor
// ABOUTME: Covers cross-backend delivery, loop prevention, unbound rooms, attachments and fail-fast shutdown

use std::sync::Arc;
use std::time::Duration;

use shoal::config::Config;
use shoal::error::TaskFailure;
use shoal::message::ChannelType;
use shoal::relay::{wire, Relay};
use shoal_core::testing::{MockBackend, RecordingNotifier, SentItem};
use shoal_core::traits::{ChatBackend, EventPayload, InboundEvent};

const GIF_PIXEL: &[u8] = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";

const BINDINGS: &str = r#"
[bindings.generalChat]
wechat = "wechatRoomA"
telegram = "generalChat"
"#;

struct Harness {
    wechat: Arc<MockBackend>,
    telegram: Arc<MockBackend>,
    notifier: Arc<RecordingNotifier>,
    watch: tokio::task::JoinHandle<TaskFailure>,
}

/// Wire both mocks and start supervising; returns once every subscriber is live
async fn start(config_src: &str) -> Harness {
    let config: Config = toml::from_str(config_src).unwrap();
    let wechat = Arc::new(MockBackend::new(ChannelType::Wechat, "wechat-bot"));
    let telegram = Arc::new(MockBackend::new(ChannelType::Telegram, "tg-bot"));
    let notifier = Arc::new(RecordingNotifier::default());

    let backends: Vec<(ChannelType, Arc<dyn ChatBackend>)> = vec![
        (ChannelType::Wechat, wechat.clone() as Arc<dyn ChatBackend>),
        (ChannelType::Telegram, telegram.clone() as Arc<dyn ChatBackend>),
    ];
    let Relay {
        im_to_hub,
        hub_to_im,
        supervisor,
        ..
    } = wire(&config, backends, notifier.clone()).unwrap();

    let watch = tokio::spawn(supervisor.watch());
    // router on im2hub, one outbound per bridge on hub2im
    while im_to_hub.subscriber_count() < 1 || hub_to_im.subscriber_count() < 2 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    Harness {
        wechat,
        telegram,
        notifier,
        watch,
    }
}

#[tokio::test]
async fn test_message_reaches_other_backend_with_sender() {
    let h = start(BINDINGS).await;

    h.wechat
        .inject(InboundEvent::text("wechatRoomA", "u1", "Alice", "hello"));

    let sent = h.telegram.wait_for_sent(1, Duration::from_secs(2)).await;
    assert_eq!(
        sent,
        vec![SentItem::Message {
            target: "generalChat".to_string(),
            content: "hello".to_string(),
            sender: Some("Alice".to_string()),
        }]
    );

    // Originating backend never gets its own message back
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.wechat.sent().is_empty());
    h.watch.abort();
}

#[tokio::test]
async fn test_own_and_unbound_messages_are_not_relayed() {
    let h = start(BINDINGS).await;

    h.wechat
        .inject(InboundEvent::text("wechatRoomA", "wechat-bot", "Bot", "echo"));
    h.wechat
        .inject(InboundEvent::text("randomRoom", "u1", "Alice", "psst"));
    h.wechat
        .inject(InboundEvent::text("wechatRoomA", "u1", "Alice", "marker"));

    let sent = h.telegram.wait_for_sent(1, Duration::from_secs(2)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let sent_after = h.telegram.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent_after.len(), 1);
    assert!(matches!(&sent_after[0], SentItem::Message { content, .. } if content == "marker"));
    h.watch.abort();
}

#[tokio::test]
async fn test_unsupported_kind_is_relayed_as_placeholder() {
    let h = start(BINDINGS).await;

    h.telegram.inject(InboundEvent {
        room: "generalChat".to_string(),
        author_id: "555".to_string(),
        author_name: "Bob".to_string(),
        payload: EventPayload::Video,
    });

    let sent = h.wechat.wait_for_sent(1, Duration::from_secs(2)).await;
    assert_eq!(
        sent,
        vec![SentItem::Message {
            target: "wechatRoomA".to_string(),
            content: "(Video message received)".to_string(),
            sender: Some("Bob".to_string()),
        }]
    );
    h.watch.abort();
}

#[tokio::test]
async fn test_photo_travels_through_store() {
    let dir = tempfile::tempdir().unwrap();
    let config_src = format!(
        "{}\n[localstore]\npath = \"{}\"\nbase_url = \"https://files.example.com\"\n",
        BINDINGS,
        dir.path().display()
    );
    let h = start(&config_src).await;

    h.wechat.inject(InboundEvent {
        room: "wechatRoomA".to_string(),
        author_id: "u1".to_string(),
        author_name: "Alice".to_string(),
        payload: EventPayload::Photo(GIF_PIXEL.to_vec()),
    });

    let sent = h.telegram.wait_for_sent(1, Duration::from_secs(2)).await;
    assert_eq!(
        sent,
        vec![SentItem::Photo {
            target: "generalChat".to_string(),
            bytes: GIF_PIXEL.to_vec(),
            sender: Some("Alice".to_string()),
        }]
    );
    let stored: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].ends_with(".gif"));
    h.watch.abort();
}

#[tokio::test]
async fn test_dead_backend_stops_relay_and_notifies_once() {
    let h = start(BINDINGS).await;

    h.wechat.close_events();

    let failure = tokio::time::timeout(Duration::from_secs(2), h.watch)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failure.task(), "wechat-inbound");
    assert!(matches!(failure, TaskFailure::Failed { .. }));

    let reports = h.notifier.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("wechat-inbound"));
}

#[tokio::test]
async fn test_absent_backend_contributes_no_tasks() {
    let config: Config = toml::from_str(BINDINGS).unwrap();
    let telegram = Arc::new(MockBackend::new(ChannelType::Telegram, "tg-bot"));
    let relay = wire(
        &config,
        vec![(ChannelType::Telegram, telegram as Arc<dyn ChatBackend>)],
        Arc::new(RecordingNotifier::default()),
    )
    .unwrap();

    assert_eq!(relay.bridges.len(), 2);
    assert_eq!(
        relay.supervisor.task_names(),
        vec![
            "router",
            "telegram-inbound",
            "telegram-outbound",
            "telegram-driver"
        ]
    );
}
