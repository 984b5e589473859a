//! Event acceptance predicate.
//!
//! Checks run in a fixed order and the first failure wins:
//! crypto (id hash + signature), future bound, age bound, NIP-40
//! expiration, proof of work, then the optional duplicate probe.

use std::time::{SystemTime, UNIX_EPOCH};

use nostr_proto::event::VerifyError;
use nostr_proto::Event;
use tracing::debug;

use crate::storage::Storage;

/// Knobs for the acceptance pipeline. Zeroed limits disable their check.
#[derive(Debug, Clone, Copy)]
pub struct ValidatorConfig {
    /// Reject events older than this many seconds (0 disables).
    pub max_event_age_secs: u64,
    /// Reject events more than this many seconds in the future.
    pub max_future_secs: i64,
    /// Minimum leading-zero bits of the id (0 disables).
    pub min_pow_difficulty: u32,
    /// Probe storage for an existing id before accepting.
    pub check_duplicates: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_event_age_secs: 0,
            max_future_secs: 900,
            min_pow_difficulty: 0,
            check_duplicates: true,
        }
    }
}

/// Why an event was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    IdMismatch,
    BadSignature,
    Future,
    TooOld,
    Expired,
    InsufficientPow,
    /// Already stored; treated as an idempotent accept by the caller.
    Duplicate,
}

/// Run the full pipeline against the wall clock.
pub fn check_event(
    event: &Event,
    config: &ValidatorConfig,
    storage: Option<&Storage>,
) -> Result<(), ValidationError> {
    check_event_at(event, config, storage, now_secs())
}

fn check_event_at(
    event: &Event,
    config: &ValidatorConfig,
    storage: Option<&Storage>,
    now: i64,
) -> Result<(), ValidationError> {
    event.verify().map_err(|e| match e {
        VerifyError::IdMismatch => ValidationError::IdMismatch,
        VerifyError::BadSignature => ValidationError::BadSignature,
    })?;

    if event.created_at > now + config.max_future_secs {
        debug!(created_at = event.created_at, now, "event too far in future");
        return Err(ValidationError::Future);
    }

    if config.max_event_age_secs > 0 {
        let age = now - event.created_at;
        if age > config.max_event_age_secs as i64 {
            debug!(age, max = config.max_event_age_secs, "event too old");
            return Err(ValidationError::TooOld);
        }
    }

    if let Some(expiration) = event.expiration() {
        if expiration <= now {
            debug!(expiration, now, "event already expired");
            return Err(ValidationError::Expired);
        }
    }

    if config.min_pow_difficulty > 0 && event.pow_difficulty() < config.min_pow_difficulty {
        debug!(
            difficulty = event.pow_difficulty(),
            required = config.min_pow_difficulty,
            "insufficient proof of work"
        );
        return Err(ValidationError::InsufficientPow);
    }

    if config.check_duplicates && !event.is_ephemeral() {
        if let Some(storage) = storage {
            if storage.exists(&event.id) {
                return Err(ValidationError::Duplicate);
            }
        }
    }

    Ok(())
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
