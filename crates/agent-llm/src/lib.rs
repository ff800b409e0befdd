//! LLM provider layer for agent-rs
//!
//! Vendor calls are blocking. This crate turns them into asynchronous streams
//! of canonical envelopes:
//!
//! - Message, completion and tool types shared by both wire dialects
//! - [`BlockingProvider`] and the concrete Responses / Chat Completions
//!   providers (behind the `responses` and `chat` features)
//! - [`EventNormalizer`] mapping raw events to [`agent_core::Envelope`]s
//! - [`StreamBridge`] running a blocking call on a worker thread
//! - [`stream_with_tool_hop`] for the single tool round-trip

pub mod bridge;
pub mod completion;
pub mod error;
pub mod events;
pub mod messages;
pub mod normalize;
pub mod provider;
pub mod tool_hop;
pub mod tools;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types
pub use bridge::{BridgeEvent, StreamBridge};
pub use completion::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};
pub use error::{LLMError, Result};
pub use events::{ChatChunk, Dialect, ResponsesEvent};
pub use messages::{ContentBlock, Message, MessageContent, Role};
pub use normalize::{EventNormalizer, Normalized};
pub use provider::{BlockingProvider, EventIter};
pub use tool_hop::stream_with_tool_hop;
pub use tools::{ToolExecutor, ToolSpec};

// Provider implementations (feature-gated)
#[cfg(any(feature = "responses", feature = "chat"))]
pub mod providers;
