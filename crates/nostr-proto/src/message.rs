//! Positional JSON array messages exchanged over the text-frame transport.
//!
//! Client -> relay:
//! ```json
//! ["EVENT", <event>]
//! ["REQ", <sub_id>, <filter>, ...]
//! ["CLOSE", <sub_id>]
//! ["AUTH", ...]
//! ```
//!
//! Relay -> client:
//! ```json
//! ["OK", <id-hex>, <bool>, <prefixed-message>]
//! ["EVENT", <sub_id>, <event>]
//! ["EOSE", <sub_id>]
//! ["CLOSED", <sub_id>, <message>]
//! ["NOTICE", <message>]
//! ```

use serde_json::{json, Value};

use crate::error::ProtocolError;
use crate::event::Event;
use crate::filter::Filter;

/// Upper bound on a serialized text frame, matching the transport limit.
pub const MAX_FRAME_SIZE: usize = 65_536;

/// Most tags accepted on one inbound event.
pub const MAX_EVENT_TAGS: usize = 100;

/// Longest accepted event content, in bytes.
pub const MAX_CONTENT_LENGTH: usize = 32_768;

/// Machine-readable prefixes for `OK` messages.
pub mod ok_prefix {
    pub const DUPLICATE: &str = "duplicate:";
    pub const POW: &str = "pow:";
    pub const BLOCKED: &str = "blocked:";
    pub const INVALID: &str = "invalid:";
    pub const ERROR: &str = "error:";
}

// ---------------------------------------------------------------------------
// Client -> relay
// ---------------------------------------------------------------------------

/// A parsed inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Event(Box<Event>),
    Req {
        sub_id: String,
        filters: Vec<Filter>,
    },
    Close {
        sub_id: String,
    },
    /// Recognized but not implemented; replied to with a NOTICE.
    Auth,
    /// An array with an unrecognized string tag.
    Unknown(String),
}

impl ClientMessage {
    /// Parse a single UTF-8 frame. Errors here mean "failed to parse
    /// message" (the caller replies with a NOTICE and does not dispatch).
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let arr = value.as_array().ok_or(ProtocolError::NotAnArray)?;
        let tag = arr
            .first()
            .and_then(Value::as_str)
            .ok_or(ProtocolError::NotAnArray)?;

        match tag {
            "EVENT" => {
                let raw = arr.get(1).ok_or(ProtocolError::MissingElement("event"))?;
                let event: Event = serde_json::from_value(raw.clone())?;
                if event.tags.len() > MAX_EVENT_TAGS {
                    return Err(ProtocolError::InvalidField("too many tags"));
                }
                if event.content.len() > MAX_CONTENT_LENGTH {
                    return Err(ProtocolError::InvalidField("content too long"));
                }
                Ok(ClientMessage::Event(Box::new(event)))
            }
            "REQ" => {
                let sub_id = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or(ProtocolError::MissingElement("subscription id"))?
                    .to_owned();
                let filters = arr[2..]
                    .iter()
                    .map(Filter::from_value)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ClientMessage::Req { sub_id, filters })
            }
            "CLOSE" => {
                let sub_id = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or(ProtocolError::MissingElement("subscription id"))?
                    .to_owned();
                Ok(ClientMessage::Close { sub_id })
            }
            "AUTH" => Ok(ClientMessage::Auth),
            other => Ok(ClientMessage::Unknown(other.to_owned())),
        }
    }

    /// Serialize back to the wire form. Used by clients and round-trip tests.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let value = match self {
            ClientMessage::Event(event) => json!(["EVENT", event]),
            ClientMessage::Req { sub_id, filters } => {
                let mut arr = vec![json!("REQ"), json!(sub_id)];
                arr.extend(filters.iter().map(Filter::to_value));
                Value::Array(arr)
            }
            ClientMessage::Close { sub_id } => json!(["CLOSE", sub_id]),
            ClientMessage::Auth => json!(["AUTH"]),
            ClientMessage::Unknown(tag) => json!([tag]),
        };
        bounded_frame(value)
    }
}

// ---------------------------------------------------------------------------
// Relay -> client
// ---------------------------------------------------------------------------

/// An outbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    Event {
        sub_id: String,
        event: Box<Event>,
    },
    Eose {
        sub_id: String,
    },
    Closed {
        sub_id: String,
        message: String,
    },
    Notice {
        message: String,
    },
}

impl RelayMessage {
    pub fn ok(event_id: impl Into<String>, accepted: bool, message: impl Into<String>) -> Self {
        RelayMessage::Ok {
            event_id: event_id.into(),
            accepted,
            message: message.into(),
        }
    }

    pub fn notice(message: impl Into<String>) -> Self {
        RelayMessage::Notice {
            message: message.into(),
        }
    }

    pub fn closed(sub_id: impl Into<String>, message: impl Into<String>) -> Self {
        RelayMessage::Closed {
            sub_id: sub_id.into(),
            message: message.into(),
        }
    }

    /// Serialize to a single text frame, enforcing the transport bound.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let value = match self {
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => json!(["OK", event_id, accepted, message]),
            RelayMessage::Event { sub_id, event } => json!(["EVENT", sub_id, event]),
            RelayMessage::Eose { sub_id } => json!(["EOSE", sub_id]),
            RelayMessage::Closed { sub_id, message } => json!(["CLOSED", sub_id, message]),
            RelayMessage::Notice { message } => json!(["NOTICE", message]),
        };
        bounded_frame(value)
    }

    /// Parse a relay frame. Used by test clients and round-trip tests.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let arr = value.as_array().ok_or(ProtocolError::NotAnArray)?;
        let tag = arr
            .first()
            .and_then(Value::as_str)
            .ok_or(ProtocolError::NotAnArray)?;

        let str_at = |i: usize, name: &'static str| -> Result<String, ProtocolError> {
            arr.get(i)
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
                .ok_or(ProtocolError::MissingElement(name))
        };

        match tag {
            "OK" => Ok(RelayMessage::Ok {
                event_id: str_at(1, "event id")?,
                accepted: arr
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or(ProtocolError::MissingElement("accepted flag"))?,
                message: str_at(3, "message")?,
            }),
            "EVENT" => {
                let sub_id = str_at(1, "subscription id")?;
                let raw = arr.get(2).ok_or(ProtocolError::MissingElement("event"))?;
                let event: Event = serde_json::from_value(raw.clone())?;
                Ok(RelayMessage::Event {
                    sub_id,
                    event: Box::new(event),
                })
            }
            "EOSE" => Ok(RelayMessage::Eose {
                sub_id: str_at(1, "subscription id")?,
            }),
            "CLOSED" => Ok(RelayMessage::Closed {
                sub_id: str_at(1, "subscription id")?,
                message: str_at(2, "message")?,
            }),
            "NOTICE" => Ok(RelayMessage::Notice {
                message: str_at(1, "message")?,
            }),
            _ => Err(ProtocolError::InvalidField("relay message tag")),
        }
    }
}

fn bounded_frame(value: Value) -> Result<String, ProtocolError> {
    let text = value.to_string();
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            max: MAX_FRAME_SIZE,
            got: text.len(),
        });
    }
    Ok(text)
}
