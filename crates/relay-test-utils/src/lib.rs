// relay-test-utils: shared test utilities for the relay suite.
//
// Provides deterministic signing fixtures (the relay itself never signs)
// and a small WebSocket client speaking the relay's wire protocol.

pub mod fixtures;
pub mod ws_client;

pub use fixtures::{signed_event, EventSpec, TestKeys};
pub use ws_client::RelayClient;
