//! Waxwing workspace root.
//!
//! The relay itself lives in `services/relay`; protocol types in
//! `crates/nostr-proto`. This package hosts the end-to-end integration
//! suites under `tests/integration/`, which drive a real relay instance
//! over a WebSocket client.
