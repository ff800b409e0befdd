//! Blocking LLM provider trait definition

use crate::{CompletionRequest, CompletionResponse, EventNormalizer, Result};
use serde_json::Value;

/// Raw events of one streaming call, pulled on the bridge worker thread
pub type EventIter = Box<dyn Iterator<Item = Result<Value>> + Send>;

/// Trait for LLM providers
///
/// Vendor SDK calls block, so every method here is synchronous and is only
/// ever invoked from a [`StreamBridge`](crate::StreamBridge) worker thread.
pub trait BlockingProvider: Send + Sync {
    /// Provider name used in logs (e.g. "ark", "moonshot")
    fn name(&self) -> &str;

    /// One non-streaming completion
    fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;

    /// Open a streaming completion and return its raw events
    fn stream(&self, request: &CompletionRequest) -> Result<EventIter>;

    /// Fresh normaliser for this provider's event shapes
    fn normalizer(&self) -> EventNormalizer;
}
