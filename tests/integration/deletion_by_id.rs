//! End-to-end: kind-5 deletion requests are authorized by pubkey; a
//! foreign deleter is ignored while the author's request removes the
//! target.

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

/// REQ for the target id and return how many EVENT frames come back
/// before EOSE.
async fn count_matches(client: &mut RelayClient, sub_id: &str, id_hex: String) -> usize {
    client
        .send(&ClientMessage::Req {
            sub_id: sub_id.to_owned(),
            filters: vec![Filter {
                ids: vec![id_hex],
                ..Filter::default()
            }],
        })
        .await
        .unwrap();
    let mut events = 0;
    loop {
        match client.recv_timeout(RECV_TIMEOUT).await.unwrap() {
            RelayMessage::Event { .. } => events += 1,
            RelayMessage::Eose { .. } => return events,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

#[tokio::test]
async fn deletion_requires_the_original_authors_key() {
    let dir = TempDir::new().unwrap();
    let (url, state) = start_relay(RelayConfig::default(), &dir).await;
    let alice = TestKeys::alice();
    let t = now();

    // Alice publishes the target event X.
    let target = signed_event(
        &alice,
        EventSpec {
            kind: 1,
            created_at: t - 10,
            content: "to be deleted".to_owned(),
            tags: vec![],
        },
    );
    let mut client = RelayClient::connect(&url).await.unwrap();
    client
        .send(&ClientMessage::Event(Box::new(target.clone())))
        .await
        .unwrap();
    client.recv_timeout(RECV_TIMEOUT).await.unwrap();

    // Bob submits a kind-5 pointing at X: accepted and stored, but X
    // survives the authorization check.
    let bobs_deletion = signed_event(
        &TestKeys::bob(),
        EventSpec {
            kind: 5,
            created_at: t - 5,
            content: String::new(),
            tags: vec![vec!["e".to_owned(), target.id.to_hex()]],
        },
    );
    client
        .send(&ClientMessage::Event(Box::new(bobs_deletion.clone())))
        .await
        .unwrap();
    assert_eq!(
        client.recv_timeout(RECV_TIMEOUT).await.unwrap(),
        RelayMessage::ok(bobs_deletion.id.to_hex(), true, "")
    );
    assert!(state.storage.exists(&bobs_deletion.id));
    assert_eq!(count_matches(&mut client, "check1", target.id.to_hex()).await, 1);

    // Alice submits the same deletion: X is gone.
    let alices_deletion = signed_event(
        &alice,
        EventSpec {
            kind: 5,
            created_at: t,
            content: String::new(),
            tags: vec![vec!["e".to_owned(), target.id.to_hex()]],
        },
    );
    client
        .send(&ClientMessage::Event(Box::new(alices_deletion.clone())))
        .await
        .unwrap();
    assert_eq!(
        client.recv_timeout(RECV_TIMEOUT).await.unwrap(),
        RelayMessage::ok(alices_deletion.id.to_hex(), true, "")
    );
    assert_eq!(count_matches(&mut client, "check2", target.id.to_hex()).await, 0);
    assert!(!state.storage.exists(&target.id));
}

#[tokio::test]
async fn deletion_by_kind_clears_the_authors_back_catalog() {
    let dir = TempDir::new().unwrap();
    let (url, state) = start_relay(RelayConfig::default(), &dir).await;
    let alice = TestKeys::alice();
    let t = now();

    let mut client = RelayClient::connect(&url).await.unwrap();
    let mut ids = Vec::new();
    for i in 0..3 {
        let event = signed_event(
            &alice,
            EventSpec {
                kind: 7,
                created_at: t - 10 + i,
                content: "+".to_owned(),
                tags: vec![],
            },
        );
        ids.push(event.id);
        client
            .send(&ClientMessage::Event(Box::new(event)))
            .await
            .unwrap();
        client.recv_timeout(RECV_TIMEOUT).await.unwrap();
    }

    let deletion = signed_event(
        &alice,
        EventSpec {
            kind: 5,
            created_at: t,
            content: String::new(),
            tags: vec![vec!["k".to_owned(), "7".to_owned()]],
        },
    );
    client
        .send(&ClientMessage::Event(Box::new(deletion)))
        .await
        .unwrap();
    client.recv_timeout(RECV_TIMEOUT).await.unwrap();

    for id in ids {
        assert!(!state.storage.exists(&id));
    }
}
