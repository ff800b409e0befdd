//! Multi-agent orchestration for the streaming research pipeline
//!
//! This crate wires [`AgentNode`]s over the provider bridge, fans them out
//! concurrently under one [`SessionContext`], merges their wire lines through
//! a shared queue and runs the dependent [`SynthesisStage`] over their results.

pub mod fanout;
pub mod node;
pub mod synthesis;

// Re-export for convenience
pub use fanout::{
    DEFAULT_DRAIN_INTERVAL, FanOutCoordinator, FanOutCoordinatorBuilder, QueueRecord,
    SessionContext,
};
pub use node::{AgentNode, AgentNodeBuilder};
pub use synthesis::{PromptBuilder, ReferenceSource, SynthesisStage};
