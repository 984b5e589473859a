//! Subscription filters and the event-matching predicate.
//!
//! A filter matches an event iff every non-empty constraint admits it;
//! empty constraint sets are "don't care". `ids` and `authors` entries are
//! hex *prefixes*; kinds are exact; `#<x>` tag constraints compare exact
//! values against the event's tags of the single-letter name `x`.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::error::ProtocolError;
use crate::event::Event;

/// Declarative event filter, as carried in `REQ` messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// Hex id prefixes.
    pub ids: Vec<String>,
    /// Hex author (pubkey) prefixes.
    pub authors: Vec<String>,
    /// Exact kinds.
    pub kinds: Vec<u16>,
    /// Exact tag values keyed by single-letter tag name (`#e`, `#p`, ...).
    pub tags: BTreeMap<char, Vec<String>>,
    /// Inclusive lower bound on `created_at`.
    pub since: Option<i64>,
    /// Inclusive upper bound on `created_at`.
    pub until: Option<i64>,
    /// Maximum number of historical events to return.
    pub limit: Option<u32>,
}

impl Filter {
    /// True iff every non-empty constraint admits the event.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if !self.ids.is_empty() {
            let id_hex = event.id.to_hex();
            if !self.ids.iter().any(|p| id_hex.starts_with(p.as_str())) {
                return false;
            }
        }
        if !self.authors.is_empty() {
            let author_hex = event.pubkey.to_hex();
            if !self
                .authors
                .iter()
                .any(|p| author_hex.starts_with(p.as_str()))
            {
                return false;
            }
        }
        for (&name, wanted) in &self.tags {
            if wanted.is_empty() {
                continue;
            }
            let mut buf = [0u8; 4];
            let name_str: &str = name.encode_utf8(&mut buf);
            let found = event
                .tag_values(name_str)
                .any(|v| wanted.iter().any(|w| w == v));
            if !found {
                return false;
            }
        }
        true
    }

    /// Union match over a filter list.
    pub fn any_match(filters: &[Filter], event: &Event) -> bool {
        filters.iter().any(|f| f.matches(event))
    }

    /// Decode from the JSON object form used on the wire.
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let obj = value
            .as_object()
            .ok_or(ProtocolError::InvalidField("filter must be an object"))?;

        let mut filter = Filter::default();
        for (key, val) in obj {
            match key.as_str() {
                "ids" => filter.ids = string_array(val, "ids")?,
                "authors" => filter.authors = string_array(val, "authors")?,
                "kinds" => filter.kinds = kind_array(val)?,
                "since" => filter.since = Some(int_value(val, "since")?),
                "until" => filter.until = Some(int_value(val, "until")?),
                "limit" => {
                    let raw = int_value(val, "limit")?;
                    filter.limit =
                        Some(u32::try_from(raw).map_err(|_| ProtocolError::InvalidField("limit"))?);
                }
                other => {
                    // `#x` single-letter tag constraint; anything else is
                    // ignored for forward compatibility.
                    let mut chars = other.chars();
                    if let (Some('#'), Some(name), None) =
                        (chars.next(), chars.next(), chars.next())
                    {
                        filter.tags.insert(name, string_array(val, "tag filter")?);
                    }
                }
            }
        }
        Ok(filter)
    }

    /// Encode to the JSON object form, omitting empty constraints.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        if !self.ids.is_empty() {
            obj.insert("ids".to_owned(), json!(self.ids));
        }
        if !self.authors.is_empty() {
            obj.insert("authors".to_owned(), json!(self.authors));
        }
        if !self.kinds.is_empty() {
            obj.insert("kinds".to_owned(), json!(self.kinds));
        }
        for (name, values) in &self.tags {
            obj.insert(format!("#{name}"), json!(values));
        }
        if let Some(since) = self.since {
            obj.insert("since".to_owned(), json!(since));
        }
        if let Some(until) = self.until {
            obj.insert("until".to_owned(), json!(until));
        }
        if let Some(limit) = self.limit {
            obj.insert("limit".to_owned(), json!(limit));
        }
        Value::Object(obj)
    }
}

fn string_array(value: &Value, field: &'static str) -> Result<Vec<String>, ProtocolError> {
    let arr = value.as_array().ok_or(ProtocolError::InvalidField(field))?;
    arr.iter()
        .map(|v| {
            v.as_str()
                .map(ToOwned::to_owned)
                .ok_or(ProtocolError::InvalidField(field))
        })
        .collect()
}

fn kind_array(value: &Value) -> Result<Vec<u16>, ProtocolError> {
    let arr = value.as_array().ok_or(ProtocolError::InvalidField("kinds"))?;
    let mut kinds = Vec::with_capacity(arr.len());
    for v in arr {
        let n = v.as_u64().ok_or(ProtocolError::InvalidField("kinds"))?;
        // Out-of-range kinds can never match a u16 event kind; drop them
        // rather than failing the whole filter.
        if let Ok(kind) = u16::try_from(n) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

fn int_value(value: &Value, field: &'static str) -> Result<i64, ProtocolError> {
    value.as_i64().ok_or(ProtocolError::InvalidField(field))
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Filter::from_value(&value).map_err(D::Error::custom)
    }
}
