//! Frame router: parse inbound messages, dispatch to handlers, serialize
//! replies. Owns no long-lived state; it is the translator between the
//! frame layer and the core.

use nostr_proto::{ClientMessage, RelayMessage};
use tracing::{debug, error, warn};

use crate::handlers::{self, EventOutcome};
use crate::state::RelayState;
use crate::subscriptions::MAX_SUB_ID_LEN;
use crate::validator::ValidationError;
use crate::ws::ConnFd;

/// Entry point for one inbound text frame.
pub fn handle_frame(state: &RelayState, fd: ConnFd, text: &str) {
    let msg = match ClientMessage::parse(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(fd, error = %e, "parse failed");
            send(state, fd, &RelayMessage::notice("error: failed to parse message"));
            return;
        }
    };
    dispatch(state, fd, msg);
}

fn dispatch(state: &RelayState, fd: ConnFd, msg: ClientMessage) {
    match msg {
        ClientMessage::Event(event) => {
            debug!(fd, kind = event.kind, "EVENT");
            let outcome = handlers::handle_event(state, fd, &event);
            let (accepted, message) = describe_outcome(&outcome);
            send(
                state,
                fd,
                &RelayMessage::ok(event.id.to_hex(), accepted, message),
            );
        }

        ClientMessage::Req { sub_id, filters } => {
            debug!(fd, sub_id, filters = filters.len(), "REQ");
            if sub_id.is_empty() || sub_id.len() > MAX_SUB_ID_LEN {
                send(
                    state,
                    fd,
                    &RelayMessage::closed(sub_id, "error: invalid subscription id"),
                );
                return;
            }
            if filters.is_empty() {
                send(state, fd, &RelayMessage::closed(sub_id, "error: no filters"));
                return;
            }
            if filters.len() > crate::subscriptions::MAX_FILTERS {
                send(
                    state,
                    fd,
                    &RelayMessage::closed(sub_id, "error: too many filters"),
                );
                return;
            }
            handlers::handle_req(state, fd, &sub_id, filters);
        }

        ClientMessage::Close { sub_id } => {
            debug!(fd, sub_id, "CLOSE");
            if handlers::handle_close(state, fd, &sub_id).is_ok() {
                send(state, fd, &RelayMessage::closed(sub_id, ""));
            }
        }

        ClientMessage::Auth => {
            send(state, fd, &RelayMessage::notice("AUTH not implemented"));
        }

        ClientMessage::Unknown(tag) => {
            debug!(fd, tag, "unknown message type");
            send(state, fd, &RelayMessage::notice("unknown message type"));
        }
    }
}

/// Map an event outcome to the `OK` reply pair (accepted, message).
fn describe_outcome(outcome: &EventOutcome) -> (bool, &'static str) {
    match outcome {
        EventOutcome::Accepted => (true, ""),
        // Idempotent accept: the client's event is stored, just not newly.
        EventOutcome::Duplicate => (true, "duplicate: already have this event"),
        EventOutcome::RateLimited => (false, "blocked: rate limit exceeded"),
        EventOutcome::Invalid(e) => match e {
            ValidationError::BadSignature => (false, "invalid: bad signature"),
            ValidationError::IdMismatch => (false, "invalid: bad event id"),
            ValidationError::Future => (false, "invalid: event too far in future"),
            ValidationError::Expired | ValidationError::TooOld => (false, "invalid: event expired"),
            ValidationError::InsufficientPow => (false, "pow: insufficient proof of work"),
            // Reported through EventOutcome::Duplicate instead.
            ValidationError::Duplicate => (true, "duplicate: already have this event"),
        },
        EventOutcome::StorageFull | EventOutcome::StorageFailed => {
            (false, "error: could not save event")
        }
    }
}

/// Serialize and queue one outbound message. Failures are logged, never
/// propagated: a dead connection is cleaned up by its own socket task.
pub fn send(state: &RelayState, fd: ConnFd, msg: &RelayMessage) {
    let text = match msg.to_json() {
        Ok(text) => text,
        Err(e) => {
            error!(fd, error = %e, "serialize failed");
            return;
        }
    };
    if !state.sink.send_text(fd, text) {
        debug!(fd, "send to closed connection skipped");
    }
}
