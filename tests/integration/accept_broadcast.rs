//! End-to-end: accept a signed event from one client and fan it out to a
//! matching subscription on another, plus the router's reply surface for
//! rejected, malformed, and unimplemented messages.

use std::sync::Arc;
use std::time::Duration;

use nostr_proto::{ClientMessage, Filter, RelayMessage};
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
async fn accepted_event_reaches_a_live_subscription() {
    let dir = TempDir::new().unwrap();
    let (url, _state) = start_relay(RelayConfig::default(), &dir).await;

    // Client A subscribes to kind 1 on an empty relay.
    let mut client_a = RelayClient::connect(&url).await.unwrap();
    client_a
        .send(&ClientMessage::Req {
            sub_id: "sub1".to_owned(),
            filters: vec![Filter {
                kinds: vec![1],
                ..Filter::default()
            }],
        })
        .await
        .unwrap();
    assert_eq!(
        client_a.recv_timeout(RECV_TIMEOUT).await.unwrap(),
        RelayMessage::Eose {
            sub_id: "sub1".to_owned()
        }
    );

    // Client B publishes a valid kind-1 event.
    let event = signed_event(
        &TestKeys::bob(),
        EventSpec {
            kind: 1,
            created_at: now(),
            content: "hello relay".to_owned(),
            tags: vec![],
        },
    );
    let mut client_b = RelayClient::connect(&url).await.unwrap();
    client_b
        .send(&ClientMessage::Event(Box::new(event.clone())))
        .await
        .unwrap();

    assert_eq!(
        client_b.recv_timeout(RECV_TIMEOUT).await.unwrap(),
        RelayMessage::ok(event.id.to_hex(), true, "")
    );

    // Client A receives the broadcast.
    match client_a.recv_timeout(RECV_TIMEOUT).await.unwrap() {
        RelayMessage::Event {
            sub_id,
            event: received,
        } => {
            assert_eq!(sub_id, "sub1");
            assert_eq!(received.id, event.id);
            assert_eq!(received.content, "hello relay");
        }
        other => panic!("expected EVENT, got {other:?}"),
    }
}

#[tokio::test]
async fn tampered_signature_is_rejected_and_nothing_is_stored() {
    let dir = TempDir::new().unwrap();
    let (url, state) = start_relay(RelayConfig::default(), &dir).await;

    let mut event = signed_event(
        &TestKeys::alice(),
        EventSpec {
            kind: 1,
            created_at: now(),
            content: "forged".to_owned(),
            tags: vec![],
        },
    );
    event.sig.0[0] ^= 0x01;

    let mut client = RelayClient::connect(&url).await.unwrap();
    client
        .send(&ClientMessage::Event(Box::new(event.clone())))
        .await
        .unwrap();

    assert_eq!(
        client.recv_timeout(RECV_TIMEOUT).await.unwrap(),
        RelayMessage::ok(event.id.to_hex(), false, "invalid: bad signature")
    );
    assert_eq!(state.storage.stats().total_events, 0);
}

#[tokio::test]
async fn malformed_frames_get_a_parse_notice_and_the_connection_survives() {
    let dir = TempDir::new().unwrap();
    let (url, _state) = start_relay(RelayConfig::default(), &dir).await;

    let mut client = RelayClient::connect(&url).await.unwrap();
    client.send_raw("this is not json").await.unwrap();
    assert_eq!(
        client.recv_timeout(RECV_TIMEOUT).await.unwrap(),
        RelayMessage::notice("error: failed to parse message")
    );

    // Still alive: AUTH is acknowledged with a notice.
    client.send_raw(r#"["AUTH", "challenge"]"#).await.unwrap();
    assert_eq!(
        client.recv_timeout(RECV_TIMEOUT).await.unwrap(),
        RelayMessage::notice("AUTH not implemented")
    );

    client.send_raw(r#"["FROBNICATE"]"#).await.unwrap();
    assert_eq!(
        client.recv_timeout(RECV_TIMEOUT).await.unwrap(),
        RelayMessage::notice("unknown message type")
    );
}

#[tokio::test]
async fn ephemeral_events_are_broadcast_but_not_persisted() {
    let dir = TempDir::new().unwrap();
    let (url, state) = start_relay(RelayConfig::default(), &dir).await;

    let mut subscriber = RelayClient::connect(&url).await.unwrap();
    subscriber
        .send(&ClientMessage::Req {
            sub_id: "eph".to_owned(),
            filters: vec![Filter {
                kinds: vec![21_000],
                ..Filter::default()
            }],
        })
        .await
        .unwrap();
    subscriber.recv_timeout(RECV_TIMEOUT).await.unwrap(); // EOSE

    let event = signed_event(
        &TestKeys::carol(),
        EventSpec {
            kind: 21_000,
            created_at: now(),
            content: String::new(),
            tags: vec![],
        },
    );
    let mut publisher = RelayClient::connect(&url).await.unwrap();
    publisher
        .send(&ClientMessage::Event(Box::new(event.clone())))
        .await
        .unwrap();
    assert_eq!(
        publisher.recv_timeout(RECV_TIMEOUT).await.unwrap(),
        RelayMessage::ok(event.id.to_hex(), true, "")
    );

    match subscriber.recv_timeout(RECV_TIMEOUT).await.unwrap() {
        RelayMessage::Event { event: received, .. } => assert_eq!(received.id, event.id),
        other => panic!("expected EVENT, got {other:?}"),
    }
    assert!(!state.storage.exists(&event.id));
}

#[tokio::test]
async fn duplicate_submission_is_an_idempotent_accept() {
    let dir = TempDir::new().unwrap();
    let (url, _state) = start_relay(RelayConfig::default(), &dir).await;

    let event = signed_event(
        &TestKeys::alice(),
        EventSpec {
            kind: 1,
            created_at: now(),
            content: "once".to_owned(),
            tags: vec![],
        },
    );

    let mut client = RelayClient::connect(&url).await.unwrap();
    for expected_message in ["", "duplicate: already have this event"] {
        client
            .send(&ClientMessage::Event(Box::new(event.clone())))
            .await
            .unwrap();
        assert_eq!(
            client.recv_timeout(RECV_TIMEOUT).await.unwrap(),
            RelayMessage::ok(event.id.to_hex(), true, expected_message)
        );
    }
}
