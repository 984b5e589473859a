//! End-to-end: historical replay with per-filter limits, newest first,
//! and the router's REQ admission rules.

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
async fn limited_query_returns_the_newest_matches_first() {
    let dir = TempDir::new().unwrap();
    let (url, _state) = start_relay(RelayConfig::default(), &dir).await;
    let alice = TestKeys::alice();
    let t = now();

    // Preload five kind-1 events at T-100..T-96 from the same author.
    let mut publisher = RelayClient::connect(&url).await.unwrap();
    for i in 0..5 {
        let event = signed_event(
            &alice,
            EventSpec {
                kind: 1,
                created_at: t - 100 + i,
                content: format!("note {i}"),
                tags: vec![],
            },
        );
        publisher
            .send(&ClientMessage::Event(Box::new(event)))
            .await
            .unwrap();
        match publisher.recv_timeout(RECV_TIMEOUT).await.unwrap() {
            RelayMessage::Ok { accepted: true, .. } => {}
            other => panic!("preload rejected: {other:?}"),
        }
    }

    let mut reader = RelayClient::connect(&url).await.unwrap();
    reader
        .send(&ClientMessage::Req {
            sub_id: "hist".to_owned(),
            filters: vec![Filter {
                kinds: vec![1],
                authors: vec![alice.pubkey_hex()[..8].to_owned()],
                limit: Some(3),
                ..Filter::default()
            }],
        })
        .await
        .unwrap();

    let mut stamps = Vec::new();
    loop {
        match reader.recv_timeout(RECV_TIMEOUT).await.unwrap() {
            RelayMessage::Event { sub_id, event } => {
                assert_eq!(sub_id, "hist");
                stamps.push(event.created_at);
            }
            RelayMessage::Eose { sub_id } => {
                assert_eq!(sub_id, "hist");
                break;
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
    assert_eq!(stamps, vec![t - 96, t - 97, t - 98]);
}

#[tokio::test]
async fn resubscribing_with_the_same_id_replaces_the_filters() {
    let dir = TempDir::new().unwrap();
    let (url, state) = start_relay(RelayConfig::default(), &dir).await;

    let mut client = RelayClient::connect(&url).await.unwrap();
    for kinds in [vec![1], vec![7]] {
        client
            .send(&ClientMessage::Req {
                sub_id: "same".to_owned(),
                filters: vec![Filter {
                    kinds,
                    ..Filter::default()
                }],
            })
            .await
            .unwrap();
        assert_eq!(
            client.recv_timeout(RECV_TIMEOUT).await.unwrap(),
            RelayMessage::Eose {
                sub_id: "same".to_owned()
            }
        );
    }
    assert_eq!(state.subscriptions.total(), 1, "replaced, not duplicated");
}

#[tokio::test]
async fn req_admission_rules_reply_with_closed() {
    let dir = TempDir::new().unwrap();
    let (url, _state) = start_relay(RelayConfig::default(), &dir).await;
    let mut client = RelayClient::connect(&url).await.unwrap();

    // Subscription id longer than 64 characters.
    let long_id = "x".repeat(65);
    client
        .send(&ClientMessage::Req {
            sub_id: long_id.clone(),
            filters: vec![Filter::default()],
        })
        .await
        .unwrap();
    assert_eq!(
        client.recv_timeout(RECV_TIMEOUT).await.unwrap(),
        RelayMessage::closed(long_id, "error: invalid subscription id")
    );

    // More than four filters.
    client
        .send(&ClientMessage::Req {
            sub_id: "crowded".to_owned(),
            filters: vec![Filter::default(); 5],
        })
        .await
        .unwrap();
    assert_eq!(
        client.recv_timeout(RECV_TIMEOUT).await.unwrap(),
        RelayMessage::closed("crowded", "error: too many filters")
    );

    // No filters at all.
    client.send_raw(r#"["REQ", "bare"]"#).await.unwrap();
    assert_eq!(
        client.recv_timeout(RECV_TIMEOUT).await.unwrap(),
        RelayMessage::closed("bare", "error: no filters")
    );
}

#[tokio::test]
async fn close_acknowledges_and_stops_delivery() {
    let dir = TempDir::new().unwrap();
    let (url, state) = start_relay(RelayConfig::default(), &dir).await;

    let mut client = RelayClient::connect(&url).await.unwrap();
    client
        .send(&ClientMessage::Req {
            sub_id: "short-lived".to_owned(),
            filters: vec![Filter::default()],
        })
        .await
        .unwrap();
    client.recv_timeout(RECV_TIMEOUT).await.unwrap(); // EOSE

    client
        .send(&ClientMessage::Close {
            sub_id: "short-lived".to_owned(),
        })
        .await
        .unwrap();
    assert_eq!(
        client.recv_timeout(RECV_TIMEOUT).await.unwrap(),
        RelayMessage::closed("short-lived", "")
    );
    assert_eq!(state.subscriptions.total(), 0);
}
