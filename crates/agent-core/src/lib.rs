//! Core abstractions for the streaming research agents
//!
//! This crate defines the wire model shared by every other crate in the
//! workspace: the canonical [`Envelope`] produced by provider normalisation,
//! the [`WireLine`] pushed to clients, per-node [`NodeResult`] accumulators
//! and the [`StreamingAgent`] trait implemented by fan-out nodes.

pub mod agent;
pub mod envelope;
pub mod error;
pub mod result;

pub use agent::{StreamingAgent, WireStream};
pub use envelope::{Annotation, Envelope, NodeState, Phase, WireLine};
pub use error::{Error, Result};
pub use result::{NodeResult, NodeStatus};
