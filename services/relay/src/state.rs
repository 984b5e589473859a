//! Shared relay state: one instance of each core component behind `Arc`,
//! cloned into every connection task. Replaces the file-scope singletons
//! of a classic embedded relay with an explicit context struct.

use std::sync::Arc;

use crate::config::RelayConfig;
use crate::rate_limit::RateLimiter;
use crate::storage::Storage;
use crate::subscriptions::SubscriptionManager;
use crate::ws::{ConnectionRegistry, FrameSink};

#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<RelayConfig>,
    pub storage: Arc<Storage>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub connections: Arc<ConnectionRegistry>,
    /// Outbound frame capability; the connection registry in production,
    /// a recording stub in tests.
    pub sink: Arc<dyn FrameSink>,
}

impl RelayState {
    /// Wire the components together around a mounted storage engine.
    pub fn new(config: RelayConfig, storage: Arc<Storage>) -> Self {
        let connections = Arc::new(ConnectionRegistry::new(config.max_connections));
        Self {
            rate_limiter: Arc::new(RateLimiter::new(config.rate_config())),
            subscriptions: Arc::new(SubscriptionManager::new()),
            sink: connections.clone(),
            connections,
            storage,
            config: Arc::new(config),
        }
    }

    /// Swap in an alternative frame sink (test harnesses).
    pub fn with_sink(mut self, sink: Arc<dyn FrameSink>) -> Self {
        self.sink = sink;
        self
    }
}
