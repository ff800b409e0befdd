//! A single streaming analysis node
//!
//! An [`AgentNode`] owns one provider client, one prompt and its
//! [`NodeResult`]. Running it starts a bridged vendor call, normalises every
//! raw event and yields one wire line per envelope. The node stops at the
//! first terminal envelope and finalises its result just before emitting it.

use agent_core::{NodeResult, NodeStatus, Phase, StreamingAgent, WireLine, WireStream};
use agent_llm::{
    BlockingProvider, BridgeEvent, CompletionRequest, Message, StreamBridge, ToolExecutor,
    ToolSpec, stream_with_tool_hop,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Streaming node over one provider
pub struct AgentNode {
    name: String,
    provider: Arc<dyn BlockingProvider>,
    model: String,
    system_prompt: String,
    tools: Vec<ToolSpec>,
    reasoning_effort: Option<String>,
    tool_hop: Option<Arc<ToolExecutor>>,
    bridge: StreamBridge,
    result: Mutex<NodeResult>,
}

impl AgentNode {
    /// Create a new node builder
    pub fn builder(
        name: impl Into<String>,
        provider: Arc<dyn BlockingProvider>,
        model: impl Into<String>,
    ) -> AgentNodeBuilder {
        AgentNodeBuilder::new(name, provider, model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Stream a run with an explicit system prompt and conversation
    pub fn run_with(self: Arc<Self>, system: String, messages: Vec<Message>) -> WireStream {
        let mut builder = CompletionRequest::builder(self.model.clone())
            .system(system)
            .messages(messages);
        if !self.tools.is_empty() {
            builder = builder.tools(self.tools.clone());
        }
        if let Some(effort) = &self.reasoning_effort {
            builder = builder.reasoning_effort(effort.clone());
        }
        let request = builder.build();

        let provider = Arc::clone(&self.provider);
        let tool_hop = self.tool_hop.clone();
        let events = self.bridge.spawn(move || match tool_hop {
            Some(tools) => stream_with_tool_hop(provider.as_ref(), request, &tools),
            None => provider.stream(&request),
        });

        let mut normalizer = self.provider.normalizer();
        let node = self;

        async_stream::stream! {
            let mut events = events;
            let mut thinking: Vec<String> = Vec::new();
            let mut output: Vec<String> = Vec::new();
            let mut finished = false;

            while !finished {
                // The bridge always ends with a terminal event, which the
                // normaliser turns into a terminal envelope; the fallback covers
                // a bridge stream that ends early.
                let event = events.next().await.unwrap_or(BridgeEvent::Done);

                for normalized in normalizer.normalize(event) {
                    let envelope = normalized.envelope;
                    match envelope.phase {
                        Phase::Thinking => thinking.push(envelope.content.clone()),
                        Phase::Output => output.push(envelope.content.clone()),
                        _ => {}
                    }

                    if normalized.terminal {
                        let status = if envelope.phase == Phase::Error {
                            NodeStatus::Error
                        } else {
                            NodeStatus::Ok
                        };
                        let result = NodeResult::finalize(&thinking, &output, status);
                        info!(
                            node = %node.name,
                            output_len = result.output_text.chars().count(),
                            status = ?status,
                            "node finished"
                        );
                        *node.result.lock().await = result;
                        finished = true;
                    }

                    yield Ok(WireLine::for_envelope(node.name.clone(), envelope));

                    if finished {
                        break;
                    }
                }
            }
            debug!(node = %node.name, "node stream closed");
        }
        .boxed()
    }
}

#[async_trait]
impl StreamingAgent for AgentNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Arc<Self>, input: String) -> WireStream {
        let system = self.system_prompt.clone();
        self.run_with(system, vec![Message::user(input)])
    }

    async fn result(&self) -> NodeResult {
        self.result.lock().await.clone()
    }
}

/// Builder for [`AgentNode`]
pub struct AgentNodeBuilder {
    name: String,
    provider: Arc<dyn BlockingProvider>,
    model: String,
    system_prompt: String,
    tools: Vec<ToolSpec>,
    reasoning_effort: Option<String>,
    tool_hop: Option<Arc<ToolExecutor>>,
    timeout: Duration,
    join_grace: Duration,
}

impl AgentNodeBuilder {
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn BlockingProvider>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            model: model.into(),
            system_prompt: String::new(),
            tools: Vec::new(),
            reasoning_effort: None,
            tool_hop: None,
            timeout: StreamBridge::DEFAULT_TIMEOUT,
            join_grace: StreamBridge::DEFAULT_JOIN_GRACE,
        }
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Tools sent with every request
    pub fn tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn reasoning_effort(mut self, effort: impl Into<String>) -> Self {
        self.reasoning_effort = Some(effort.into());
        self
    }

    /// Run one non-streaming tool round-trip before streaming
    pub fn tool_hop(mut self, executor: Arc<ToolExecutor>) -> Self {
        self.tool_hop = Some(executor);
        self
    }

    /// Per-retrieval timeout of the bridge
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn join_grace(mut self, grace: Duration) -> Self {
        self.join_grace = grace;
        self
    }

    pub fn build(self) -> AgentNode {
        let bridge = StreamBridge::new(self.name.clone())
            .with_timeout(self.timeout)
            .with_join_grace(self.join_grace);
        AgentNode {
            name: self.name,
            provider: self.provider,
            model: self.model,
            system_prompt: self.system_prompt,
            tools: self.tools,
            reasoning_effort: self.reasoning_effort,
            tool_hop: self.tool_hop,
            bridge,
            result: Mutex::new(NodeResult::default()),
        }
    }
}
