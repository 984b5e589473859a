//! Live fan-out: pair an accepted event against the subscription registry
//! and queue one EVENT frame per match.
//!
//! Stateless by design. The match set is gathered under the subscription
//! lock, which is released before any frame is queued; each send is
//! independent and a failed one never stops the rest.

use nostr_proto::{Event, RelayMessage};
use tracing::debug;

use crate::router;
use crate::state::RelayState;

pub fn fanout(state: &RelayState, event: &Event) {
    let matches = state.subscriptions.matches(event);
    if matches.is_empty() {
        debug!(kind = event.kind, "no subscribers");
        return;
    }

    debug!(kind = event.kind, subscribers = matches.len(), "broadcasting");
    for m in matches {
        router::send(
            state,
            m.conn_fd,
            &RelayMessage::Event {
                sub_id: m.sub_id,
                event: Box::new(event.clone()),
            },
        );
    }
}
