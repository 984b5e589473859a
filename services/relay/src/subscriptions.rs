//! Fixed-capacity registry of live subscriptions and the in-memory matcher.
//!
//! 64 slots total, at most 8 per connection, at most 4 filters each. All
//! operations hold the single registry mutex; matching is linear in active
//! subscriptions, which is the accepted cost at this capacity.

use std::sync::Mutex;

use nostr_proto::{Event, Filter};
use thiserror::Error;
use tracing::{debug, info};

use crate::ws::ConnFd;

pub const MAX_SUBSCRIPTIONS: usize = 64;
pub const MAX_PER_CONNECTION: usize = 8;
pub const MAX_FILTERS: usize = 4;
pub const MAX_SUB_ID_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("too many subscriptions for this connection")]
    TooManyForConnection,

    #[error("subscription registry full")]
    RegistryFull,

    #[error("unknown subscription id")]
    UnknownSubscription,
}

#[derive(Debug)]
struct Subscription {
    conn_fd: ConnFd,
    sub_id: String,
    filters: Vec<Filter>,
    events_sent: u64,
}

/// One matched (connection, subscription) pair for fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubMatch {
    pub conn_fd: ConnFd,
    pub sub_id: String,
}

pub struct SubscriptionManager {
    slots: Mutex<Vec<Option<Subscription>>>,
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionManager {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_SUBSCRIPTIONS);
        slots.resize_with(MAX_SUBSCRIPTIONS, || None);
        Self {
            slots: Mutex::new(slots),
        }
    }

    /// Install or replace the subscription (fd, sub_id).
    ///
    /// Replacement swaps the filters in place and resets the sent counter.
    /// More than [`MAX_FILTERS`] filters are clamped, not rejected.
    pub fn add(
        &self,
        conn_fd: ConnFd,
        sub_id: &str,
        mut filters: Vec<Filter>,
    ) -> Result<(), SubscriptionError> {
        filters.truncate(MAX_FILTERS);

        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = slots
            .iter_mut()
            .flatten()
            .find(|s| s.conn_fd == conn_fd && s.sub_id == sub_id)
        {
            existing.filters = filters;
            existing.events_sent = 0;
            debug!(fd = conn_fd, sub_id, "subscription replaced");
            return Ok(());
        }

        let per_conn = slots
            .iter()
            .flatten()
            .filter(|s| s.conn_fd == conn_fd)
            .count();
        if per_conn >= MAX_PER_CONNECTION {
            return Err(SubscriptionError::TooManyForConnection);
        }

        let Some(free) = slots.iter_mut().find(|s| s.is_none()) else {
            return Err(SubscriptionError::RegistryFull);
        };
        *free = Some(Subscription {
            conn_fd,
            sub_id: sub_id.to_owned(),
            filters,
            events_sent: 0,
        });
        debug!(fd = conn_fd, sub_id, "subscription added");
        Ok(())
    }

    /// Remove the subscription (fd, sub_id), if present.
    pub fn remove(&self, conn_fd: ConnFd, sub_id: &str) -> Result<(), SubscriptionError> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slots
            .iter_mut()
            .find(|s| {
                s.as_ref()
                    .is_some_and(|s| s.conn_fd == conn_fd && s.sub_id == sub_id)
            })
            .ok_or(SubscriptionError::UnknownSubscription)?;
        *slot = None;
        Ok(())
    }

    /// Drop every subscription held by a connection (disconnect cleanup).
    pub fn remove_all(&self, conn_fd: ConnFd) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let mut removed = 0;
        for slot in slots.iter_mut() {
            if slot.as_ref().is_some_and(|s| s.conn_fd == conn_fd) {
                *slot = None;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(fd = conn_fd, removed, "removed subscriptions on disconnect");
        }
    }

    /// Every active subscription whose filter list matches the event.
    pub fn matches(&self, event: &Event) -> Vec<SubMatch> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let mut matched = Vec::new();
        for sub in slots.iter_mut().flatten() {
            if Filter::any_match(&sub.filters, event) {
                sub.events_sent += 1;
                matched.push(SubMatch {
                    conn_fd: sub.conn_fd,
                    sub_id: sub.sub_id.clone(),
                });
            }
        }
        matched
    }

    /// Active subscription count for one connection.
    pub fn count(&self, conn_fd: ConnFd) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .iter()
            .flatten()
            .filter(|s| s.conn_fd == conn_fd)
            .count()
    }

    /// Active subscriptions across all connections.
    pub fn total(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.iter().flatten().count()
    }
}
