//! WebSocket frame-layer adapter.
//!
//! Bridges axum's WebSocket upgrade to the relay core: assigns an opaque
//! connection handle per socket, owns one outbound channel per connection
//! (a writer task drains it, so no core lock is ever held across a send),
//! and invokes the disconnect hook exactly once before a handle could be
//! observed again. A plain GET without the upgrade header serves the
//! relay information document instead.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use nostr_proto::MAX_FRAME_SIZE;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::RelayState;
use crate::{handlers, nip11, router};

/// Opaque connection handle issued by the frame layer, valid until the
/// disconnect hook runs for it.
pub type ConnFd = u64;

/// Outbound frame capability handed to router and broadcaster.
pub trait FrameSink: Send + Sync {
    /// Queue one text frame. Returns false when the connection is gone;
    /// callers treat that as a skipped send, never a fatal error.
    fn send_text(&self, fd: ConnFd, text: String) -> bool;
}

// ---------------------------------------------------------------------------
// Connection registry
// ---------------------------------------------------------------------------

pub struct ConnectionRegistry {
    max_connections: usize,
    next_fd: AtomicU64,
    senders: Mutex<HashMap<ConnFd, mpsc::UnboundedSender<String>>>,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            next_fd: AtomicU64::new(1),
            senders: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a handle and its outbound queue; `None` when at capacity.
    fn register(&self) -> Option<(ConnFd, mpsc::UnboundedReceiver<String>)> {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        if senders.len() >= self.max_connections {
            return None;
        }
        let fd = self.next_fd.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        senders.insert(fd, tx);
        Some((fd, rx))
    }

    fn unregister(&self, fd: ConnFd) {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders.remove(&fd);
    }

    pub fn connection_count(&self) -> usize {
        let senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders.len()
    }
}

impl FrameSink for ConnectionRegistry {
    fn send_text(&self, fd: ConnFd, text: String) -> bool {
        let senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        match senders.get(&fd) {
            Some(tx) => tx.send(text).is_ok(),
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// axum handler
// ---------------------------------------------------------------------------

pub async fn ws_handler(
    ws: Option<WebSocketUpgrade>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    State(state): State<RelayState>,
) -> Response {
    let peer = connect_info.map_or_else(|| "unknown".to_owned(), |ConnectInfo(a)| a.to_string());
    match ws {
        Some(upgrade) => upgrade
            .max_message_size(MAX_FRAME_SIZE)
            .on_upgrade(move |socket| handle_socket(socket, state, peer)),
        // Plain HTTP GET on the relay root: NIP-11 information document.
        None => nip11::info_response(&state.config, &headers).into_response(),
    }
}

async fn handle_socket(socket: WebSocket, state: RelayState, peer: String) {
    let Some((fd, mut outbound)) = state.connections.register() else {
        warn!(peer, "connection rejected: at capacity");
        let mut socket = socket;
        let _ = socket.send(Message::Close(None)).await;
        return;
    };
    info!(
        fd,
        peer,
        total = state.connections.connection_count(),
        "connection opened"
    );

    let (mut write, mut read) = socket.split();

    // Writer: the only task touching the sink side of this socket.
    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if write.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = write.close().await;
    });

    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if text.len() > MAX_FRAME_SIZE {
                    warn!(fd, len = text.len(), "dropping oversized frame");
                    continue;
                }
                router::handle_frame(&state, fd, &text);
            }
            Ok(Message::Close(_)) => {
                debug!(fd, "client closed");
                break;
            }
            // Ping/Pong are answered by the transport.
            Ok(_) => {}
            Err(e) => {
                debug!(fd, error = %e, "socket error");
                break;
            }
        }
    }

    // Disconnect hook before the handle could ever be reissued.
    state.connections.unregister(fd);
    handlers::on_disconnect(&state, fd);
    writer.abort();
    info!(fd, "connection closed");
}
