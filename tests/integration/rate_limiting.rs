//! End-to-end: the per-connection EVENT budget rejects the first message
//! over the cap with a `blocked:` reply, while other connections keep
//! their own window.

use std::sync::Arc;
use std::time::Duration;

use nostr_proto::{ClientMessage, RelayMessage};
use relay::storage::Storage;
use relay::{build_router, RelayConfig, RelayState};
use relay_test_utils::fixtures::{signed_event, EventSpec, TestKeys};
use relay_test_utils::RelayClient;
use tempfile::TempDir;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn start_relay(mut config: RelayConfig, dir: &TempDir) -> (String, RelayState) {
    config.data_dir = dir.path().to_path_buf();
    let storage = Arc::new(Storage::mount(config.storage_config()).unwrap());
    let state = RelayState::new(config, storage);
    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("ws://{addr}/"), state)
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

#[tokio::test]
async fn fourth_event_in_the_window_is_blocked() {
    let dir = TempDir::new().unwrap();
    let mut config = RelayConfig::default();
    config.events_per_minute = 3;
    let (url, _state) = start_relay(config, &dir).await;

    let alice = TestKeys::alice();
    let t = now();
    let mut client = RelayClient::connect(&url).await.unwrap();

    for i in 0..4 {
        let event = signed_event(
            &alice,
            EventSpec {
                kind: 1,
                created_at: t + i,
                content: format!("burst {i}"),
                tags: vec![],
            },
        );
        client
            .send(&ClientMessage::Event(Box::new(event.clone())))
            .await
            .unwrap();
        let reply = client.recv_timeout(RECV_TIMEOUT).await.unwrap();
        if i < 3 {
            assert_eq!(reply, RelayMessage::ok(event.id.to_hex(), true, ""));
        } else {
            match reply {
                RelayMessage::Ok {
                    event_id,
                    accepted,
                    message,
                } => {
                    assert_eq!(event_id, event.id.to_hex());
                    assert!(!accepted);
                    assert!(
                        message.starts_with(nostr_proto::message::ok_prefix::BLOCKED),
                        "expected blocked prefix, got {message:?}"
                    );
                }
                other => panic!("expected OK, got {other:?}"),
            }
        }
    }
}

#[tokio::test]
async fn each_connection_gets_its_own_budget() {
    let dir = TempDir::new().unwrap();
    let mut config = RelayConfig::default();
    config.events_per_minute = 1;
    let (url, _state) = start_relay(config, &dir).await;

    let alice = TestKeys::alice();
    let t = now();

    let mut first = RelayClient::connect(&url).await.unwrap();
    let event_a = signed_event(
        &alice,
        EventSpec {
            kind: 1,
            created_at: t,
            content: "a".to_owned(),
            tags: vec![],
        },
    );
    first
        .send(&ClientMessage::Event(Box::new(event_a.clone())))
        .await
        .unwrap();
    assert_eq!(
        first.recv_timeout(RECV_TIMEOUT).await.unwrap(),
        RelayMessage::ok(event_a.id.to_hex(), true, "")
    );

    // The same connection is now out of budget.
    let event_b = signed_event(
        &alice,
        EventSpec {
            kind: 1,
            created_at: t + 1,
            content: "b".to_owned(),
            tags: vec![],
        },
    );
    first
        .send(&ClientMessage::Event(Box::new(event_b.clone())))
        .await
        .unwrap();
    match first.recv_timeout(RECV_TIMEOUT).await.unwrap() {
        RelayMessage::Ok { accepted, message, .. } => {
            assert!(!accepted);
            assert!(message.starts_with(nostr_proto::message::ok_prefix::BLOCKED));
        }
        other => panic!("expected OK, got {other:?}"),
    }

    // A fresh connection publishes immediately.
    let mut second = RelayClient::connect(&url).await.unwrap();
    second
        .send(&ClientMessage::Event(Box::new(event_b.clone())))
        .await
        .unwrap();
    assert_eq!(
        second.recv_timeout(RECV_TIMEOUT).await.unwrap(),
        RelayMessage::ok(event_b.id.to_hex(), true, "")
    );
}

#[tokio::test]
async fn req_budget_closes_subscriptions_over_the_cap() {
    let dir = TempDir::new().unwrap();
    let mut config = RelayConfig::default();
    config.reqs_per_minute = 2;
    let (url, _state) = start_relay(config, &dir).await;

    let mut client = RelayClient::connect(&url).await.unwrap();
    for i in 0..2 {
        client
            .send(&ClientMessage::Req {
                sub_id: format!("s{i}"),
                filters: vec![nostr_proto::Filter::default()],
            })
            .await
            .unwrap();
        assert_eq!(
            client.recv_timeout(RECV_TIMEOUT).await.unwrap(),
            RelayMessage::Eose {
                sub_id: format!("s{i}")
            }
        );
    }

    client
        .send(&ClientMessage::Req {
            sub_id: "s2".to_owned(),
            filters: vec![nostr_proto::Filter::default()],
        })
        .await
        .unwrap();
    assert_eq!(
        client.recv_timeout(RECV_TIMEOUT).await.unwrap(),
        RelayMessage::closed("s2", "blocked: rate limit exceeded")
    );
}
