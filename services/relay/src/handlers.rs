//! Protocol message handlers: the glue between router dispatch and the
//! core components. Each handler takes the shared relay context and a
//! connection handle and returns a typed result; all locking is inside
//! the components, never across a send.

use std::collections::HashSet;

use nostr_proto::{Event, RelayMessage};
use tracing::{debug, info, warn};

use crate::broadcaster;
use crate::deletion;
use crate::rate_limit::RateKind;
use crate::router;
use crate::state::RelayState;
use crate::storage::{StorageError, MAX_QUERY_LIMIT};
use crate::subscriptions::SubscriptionError;
use crate::validator::{self, ValidationError};
use crate::ws::ConnFd;

/// The fate of one submitted event, as reported in the `OK` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Accepted,
    /// Already stored; accepted idempotently, not re-broadcast.
    Duplicate,
    RateLimited,
    Invalid(ValidationError),
    StorageFull,
    StorageFailed,
}

/// Ingest one EVENT: admission, validation, persistence, deletion
/// semantics, then fan-out.
pub fn handle_event(state: &RelayState, fd: ConnFd, event: &Event) -> EventOutcome {
    if !state.rate_limiter.check(fd, RateKind::Event) {
        return EventOutcome::RateLimited;
    }

    let validator_config = state.config.validator_config();
    match validator::check_event(event, &validator_config, Some(&state.storage)) {
        Ok(()) => {}
        Err(ValidationError::Duplicate) => return EventOutcome::Duplicate,
        Err(e) => {
            debug!(fd, ?e, "event rejected");
            return EventOutcome::Invalid(e);
        }
    }

    if !event.is_ephemeral() {
        match state.storage.save(event) {
            Ok(()) => {}
            Err(StorageError::Duplicate) => return EventOutcome::Duplicate,
            Err(StorageError::Full) => return EventOutcome::StorageFull,
            Err(e) => {
                warn!(fd, error = %e, "could not save event");
                return EventOutcome::StorageFailed;
            }
        }
    }

    if event.is_deletion() {
        let deleted = deletion::process(&state.storage, event);
        if deleted > 0 {
            info!(fd, deleted, "processed deletion request");
        }
    }

    broadcaster::fanout(state, event);
    EventOutcome::Accepted
}

/// Install or replace a subscription, then replay matching history and
/// close the stored set with EOSE.
pub fn handle_req(state: &RelayState, fd: ConnFd, sub_id: &str, filters: Vec<nostr_proto::Filter>) {
    if !state.rate_limiter.check(fd, RateKind::Req) {
        router::send(
            state,
            fd,
            &RelayMessage::closed(sub_id, "blocked: rate limit exceeded"),
        );
        return;
    }

    // Install before replay so a broadcast arriving mid-replay is not lost.
    match state.subscriptions.add(fd, sub_id, filters.clone()) {
        Ok(()) => {}
        Err(SubscriptionError::TooManyForConnection) => {
            router::send(
                state,
                fd,
                &RelayMessage::closed(sub_id, "error: too many subscriptions"),
            );
            return;
        }
        Err(e) => {
            warn!(fd, sub_id, error = %e, "subscription rejected");
            router::send(
                state,
                fd,
                &RelayMessage::closed(sub_id, "error: subscription registry full"),
            );
            return;
        }
    }

    // Historical replay: per-filter limits, de-duplicated by id within this
    // REQ, newest first.
    let mut seen = HashSet::new();
    let mut historical = Vec::new();
    for filter in &filters {
        let limit = filter
            .limit
            .map_or(MAX_QUERY_LIMIT, |l| (l as usize).min(MAX_QUERY_LIMIT));
        for event in state.storage.query(filter, limit) {
            if seen.insert(event.id) {
                historical.push(event);
            }
        }
    }
    historical.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    for event in historical {
        router::send(
            state,
            fd,
            &RelayMessage::Event {
                sub_id: sub_id.to_owned(),
                event: Box::new(event),
            },
        );
    }
    router::send(
        state,
        fd,
        &RelayMessage::Eose {
            sub_id: sub_id.to_owned(),
        },
    );
}

/// Remove a subscription; unknown ids are reported to the caller, which
/// stays silent about them.
pub fn handle_close(state: &RelayState, fd: ConnFd, sub_id: &str) -> Result<(), SubscriptionError> {
    state.subscriptions.remove(fd, sub_id)
}

/// Connection teardown hook: single source of truth for per-fd cleanup.
pub fn on_disconnect(state: &RelayState, fd: ConnFd) {
    state.subscriptions.remove_all(fd);
    state.rate_limiter.reset(fd);
}
