//! NIP-11 relay information document, served on a plain HTTP GET of the
//! WebSocket endpoint with `application/nostr+json` content negotiation.

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::config::RelayConfig;
use crate::storage::{DEFAULT_TTL_SECS, MAX_QUERY_LIMIT};
use crate::subscriptions::{MAX_FILTERS, MAX_PER_CONNECTION, MAX_SUB_ID_LEN};
use nostr_proto::message::{MAX_CONTENT_LENGTH, MAX_EVENT_TAGS};
use nostr_proto::MAX_FRAME_SIZE;

pub const SUPPORTED_NIPS: [u16; 5] = [1, 9, 11, 20, 40];

#[derive(Debug, Serialize)]
pub struct RelayInformation {
    pub name: String,
    pub description: String,
    pub supported_nips: Vec<u16>,
    pub software: &'static str,
    pub version: &'static str,
    pub limitation: Limitation,
    pub retention: Vec<Retention>,
}

#[derive(Debug, Serialize)]
pub struct Limitation {
    pub max_message_length: usize,
    pub max_subscriptions: usize,
    pub max_filters: usize,
    pub max_limit: usize,
    pub max_subid_length: usize,
    pub max_event_tags: usize,
    pub max_content_length: usize,
    pub min_pow_difficulty: u32,
    pub auth_required: bool,
    pub payment_required: bool,
}

#[derive(Debug, Serialize)]
pub struct Retention {
    pub kinds: Vec<u16>,
    pub time: u32,
}

pub fn document(config: &RelayConfig) -> RelayInformation {
    RelayInformation {
        name: config.name.clone(),
        description: config.description.clone(),
        supported_nips: SUPPORTED_NIPS.to_vec(),
        software: "waxwing",
        version: env!("CARGO_PKG_VERSION"),
        limitation: Limitation {
            max_message_length: MAX_FRAME_SIZE,
            max_subscriptions: MAX_PER_CONNECTION,
            max_filters: MAX_FILTERS,
            max_limit: MAX_QUERY_LIMIT,
            max_subid_length: MAX_SUB_ID_LEN,
            max_event_tags: MAX_EVENT_TAGS,
            max_content_length: MAX_CONTENT_LENGTH,
            min_pow_difficulty: config.min_pow_difficulty,
            auth_required: false,
            payment_required: false,
        },
        retention: vec![Retention {
            kinds: vec![0, 1, 2, 3, 4, 5, 6, 7],
            time: DEFAULT_TTL_SECS,
        }],
    }
}

/// Build the HTTP response, honoring the `Accept` header and the
/// permissive CORS contract expected by web clients.
pub fn info_response(config: &RelayConfig, headers: &HeaderMap) -> Response {
    let wants_nostr_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/nostr+json"));
    let content_type = if wants_nostr_json {
        "application/nostr+json"
    } else {
        "application/json"
    };

    let body = match serde_json::to_string(&document(config)) {
        Ok(body) => body,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Accept"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS"),
        ],
        body,
    )
        .into_response()
}
