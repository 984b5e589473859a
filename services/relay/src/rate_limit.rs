//! Per-connection sliding-window admission control.
//!
//! A fixed pool of 16 buckets, one per active connection, each holding
//! separate EVENT and REQ counters over a 60-second window. Lookup is
//! linear; the pool is small enough that this is the right trade.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::ws::ConnFd;

const MAX_BUCKETS: usize = 16;
const WINDOW_SECS: u64 = 60;

/// Which counter a check applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateKind {
    Event,
    Req,
}

/// Counter caps per 60-second window.
#[derive(Debug, Clone, Copy)]
pub struct RateConfig {
    pub events_per_minute: u32,
    pub reqs_per_minute: u32,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            events_per_minute: 30,
            reqs_per_minute: 60,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    fd: ConnFd,
    event_count: u32,
    req_count: u32,
    window_start: u64,
}

pub struct RateLimiter {
    config: RateConfig,
    buckets: Mutex<[Option<Bucket>; MAX_BUCKETS]>,
}

impl RateLimiter {
    pub fn new(config: RateConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new([None; MAX_BUCKETS]),
        }
    }

    /// Record one message of the given kind for `fd`. Returns whether the
    /// message is admitted. All buckets held by other connections counts as
    /// a rejection.
    pub fn check(&self, fd: ConnFd, kind: RateKind) -> bool {
        self.check_at(fd, kind, now_secs())
    }

    fn check_at(&self, fd: ConnFd, kind: RateKind, now: u64) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());

        let Some(bucket) = find_or_allocate(&mut buckets, fd, now) else {
            warn!(fd, "no free rate buckets");
            return false;
        };

        if now.saturating_sub(bucket.window_start) >= WINDOW_SECS {
            bucket.event_count = 0;
            bucket.req_count = 0;
            bucket.window_start = now;
        }

        let (count, cap) = match kind {
            RateKind::Event => (&mut bucket.event_count, self.config.events_per_minute),
            RateKind::Req => (&mut bucket.req_count, self.config.reqs_per_minute),
        };
        if *count >= cap {
            warn!(fd, ?kind, count = *count, "rate limited");
            return false;
        }
        *count += 1;
        true
    }

    /// Buckets currently held by connections.
    pub fn active_buckets(&self) -> usize {
        let buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets.iter().flatten().count()
    }

    /// Release the bucket held by `fd`, making it reusable.
    pub fn reset(&self, fd: ConnFd) {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = buckets
            .iter()
            .position(|b| b.is_some_and(|b| b.fd == fd))
        {
            buckets[slot] = None;
        }
    }
}

fn find_or_allocate(
    buckets: &mut [Option<Bucket>; MAX_BUCKETS],
    fd: ConnFd,
    now: u64,
) -> Option<&mut Bucket> {
    let slot = match buckets.iter().position(|b| b.is_some_and(|b| b.fd == fd)) {
        Some(existing) => existing,
        None => {
            let free = buckets.iter().position(Option::is_none)?;
            buckets[free] = Some(Bucket {
                fd,
                event_count: 0,
                req_count: 0,
                window_start: now,
            });
            free
        }
    };
    buckets[slot].as_mut()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
