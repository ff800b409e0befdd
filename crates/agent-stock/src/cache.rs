//! Idempotency gate in front of the research pipeline
//!
//! [`ResultCache`] answers "has this key already been computed" from a
//! TTL-bounded in-process cache first and the durable [`StateStore`] second.
//! A hit is replayed as a fixed sequence of wire lines.

use agent_core::{Envelope, Phase, WireLine};
use cached::{Cached, TimedCache};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::request::IdempotencyKey;
use crate::store::{AggregatedState, StateStore, StoredRecord};

/// Node name of the synthesis output in replays and persisted state
pub const CONCLUSION: &str = "conclusion";

/// Lookup and persistence of aggregated results
pub struct ResultCache {
    store: Arc<dyn StateStore>,
    hot: Arc<RwLock<TimedCache<IdempotencyKey, AggregatedState>>>,
}

impl ResultCache {
    /// Create a cache over an injected store
    pub fn new(store: Arc<dyn StateStore>, hot_ttl: Duration) -> Self {
        Self {
            store,
            hot: Arc::new(RwLock::new(TimedCache::with_lifespan(hot_ttl))),
        }
    }

    /// Persisted state for the key, if any
    ///
    /// A failing store read is logged and treated as a miss.
    pub async fn lookup(&self, key: &IdempotencyKey) -> Option<AggregatedState> {
        if let Some(state) = self.hot.write().await.cache_get(key).cloned() {
            debug!(subject = %key.subject_id, date = %key.as_of_date, "hot cache hit");
            return Some(state);
        }

        match self.store.latest(key).await {
            Ok(Some(record)) => {
                info!(subject = %key.subject_id, date = %key.as_of_date, "result cache hit");
                let _ = self.hot.write().await.cache_set(key.clone(), record.state.clone());
                Some(record.state)
            }
            Ok(None) => {
                info!(subject = %key.subject_id, date = %key.as_of_date, "result cache miss");
                None
            }
            Err(e) => {
                warn!(subject = %key.subject_id, error = %e, "result lookup failed, treating as miss");
                None
            }
        }
    }

    /// Persist a finished run; failures are logged and swallowed
    pub async fn persist(&self, record: StoredRecord) {
        let key = record.key();
        let state = record.state.clone();

        match self.store.save(record).await {
            Ok(true) => {
                info!(subject = %key.subject_id, date = %key.as_of_date, "research state persisted");
                let _ = self.hot.write().await.cache_set(key, state);
            }
            Ok(false) => {
                // Another run stored this key first; its row stays authoritative.
                warn!(subject = %key.subject_id, date = %key.as_of_date, "research state already stored");
                let _ = self.hot.write().await.cache_remove(&key);
            }
            Err(e) => {
                error!(subject = %key.subject_id, error = %e, "failed to persist research state");
            }
        }
    }

    /// Replay lines: one output line per node in `order`, the conclusion,
    /// then the end-of-stream sentinel
    pub fn replay(state: &AggregatedState, order: &[&str]) -> Vec<WireLine> {
        let mut lines: Vec<WireLine> = order
            .iter()
            .map(|node| (*node, state.output(node)))
            .chain(std::iter::once((CONCLUSION, state.conclusion())))
            .zip(0u64..)
            .map(|((node, text), index)| {
                WireLine::in_progress(node, Envelope::new(Phase::Output, text).with_index(index))
            })
            .collect();
        let next = lines.len() as u64;
        lines.push(WireLine::end_of_stream(next));
        info!(replayed = next, "replayed persisted result");
        lines
    }
}

impl Clone for ResultCache {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            hot: Arc::clone(&self.hot),
        }
    }
}
