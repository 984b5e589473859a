//! Kind-5 deletion requests (NIP-09).
//!
//! Three target forms, all authorized against the deleter's pubkey:
//! - `e` tags name event ids directly;
//! - `a` tags name an addressable `kind:pubkey:d` triple;
//! - `k` tags name whole kinds (authorization implicit via the author
//!   filter, capped at 32 kinds per request).
//!
//! Unauthorized targets are skipped with a warning, never an error.

use nostr_proto::{Event, EventId, Filter};
use tracing::{debug, info, warn};

use crate::storage::Storage;

const MAX_KINDS_PER_DELETION: usize = 32;
const ADDRESS_QUERY_LIMIT: usize = 100;
const KIND_QUERY_LIMIT: usize = 500;

/// Apply a kind-5 event against storage. Returns how many events were
/// actually deleted.
pub fn process(storage: &Storage, delete_event: &Event) -> usize {
    if !delete_event.is_deletion() {
        return 0;
    }

    let mut deleted = 0;
    deleted += delete_by_event_ids(storage, delete_event);
    deleted += delete_by_addresses(storage, delete_event);
    deleted += delete_by_kinds(storage, delete_event);
    deleted
}

fn delete_by_event_ids(storage: &Storage, delete_event: &Event) -> usize {
    let mut deleted = 0;
    for id_hex in delete_event.tag_values("e") {
        let Ok(id) = EventId::from_hex(id_hex) else {
            continue;
        };
        let Some(target) = storage.get(&id) else {
            continue;
        };
        if target.pubkey != delete_event.pubkey {
            warn!(id = %id, "unauthorized deletion skipped");
            continue;
        }
        if storage.delete(&id).is_ok() {
            deleted += 1;
            info!(id = %id, "deleted event");
        }
    }
    deleted
}

fn delete_by_addresses(storage: &Storage, delete_event: &Event) -> usize {
    let deleter_hex = delete_event.pubkey.to_hex();
    let mut deleted = 0;

    for addr in delete_event.tag_values("a") {
        // `kind:pubkey:d`; the `d` part may itself contain colons. Two
        // fields are accepted with an empty `d`, matching NIP-33 bare
        // addresses for replaceable kinds.
        let mut parts = addr.splitn(3, ':');
        let (Some(kind_str), Some(pubkey_hex)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(kind) = kind_str.parse::<u16>() else {
            continue;
        };
        let d_value = parts.next().unwrap_or("");

        if pubkey_hex != deleter_hex {
            warn!(addr, "unauthorized address deletion skipped");
            continue;
        }

        let filter = Filter {
            kinds: vec![kind],
            authors: vec![deleter_hex.clone()],
            until: Some(delete_event.created_at),
            ..Filter::default()
        };
        for candidate in storage.query(&filter, ADDRESS_QUERY_LIMIT) {
            if candidate.d_tag() == d_value && storage.delete(&candidate.id).is_ok() {
                deleted += 1;
                info!(addr, "deleted addressable event");
            }
        }
    }
    deleted
}

fn delete_by_kinds(storage: &Storage, delete_event: &Event) -> usize {
    let kinds: Vec<u16> = delete_event
        .tag_values("k")
        .filter_map(|v| v.parse().ok())
        .take(MAX_KINDS_PER_DELETION)
        .collect();
    if kinds.is_empty() {
        return 0;
    }

    let author_hex = delete_event.pubkey.to_hex();
    let mut deleted = 0;
    for kind in kinds {
        let filter = Filter {
            kinds: vec![kind],
            authors: vec![author_hex.clone()],
            until: Some(delete_event.created_at),
            ..Filter::default()
        };
        let mut kind_deleted = 0;
        for candidate in storage.query(&filter, KIND_QUERY_LIMIT) {
            if storage.delete(&candidate.id).is_ok() {
                kind_deleted += 1;
            }
        }
        if kind_deleted > 0 {
            info!(kind, deleted = kind_deleted, "deleted events by kind");
        }
        deleted += kind_deleted;
    }

    debug!(deleted, "kind deletion pass complete");
    deleted
}
