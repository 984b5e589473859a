pub mod broadcaster;
pub mod config;
pub mod deletion;
pub mod handlers;
pub mod nip11;
pub mod rate_limit;
pub mod router;
pub mod state;
pub mod storage;
pub mod subscriptions;
pub mod validator;
pub mod ws;

pub use config::RelayConfig;
pub use state::RelayState;

use axum::{routing::get, Router};

/// The relay's entire HTTP surface: one route that either upgrades to the
/// WebSocket protocol or serves the information document.
pub fn build_router(state: RelayState) -> Router {
    Router::new()
        .route("/", get(ws::ws_handler))
        .with_state(state)
}
