//! Scripted provider for tests in this and downstream crates
//!
//! Enabled by `cfg(test)` here and by the `testing` feature elsewhere.

use agent_core::Phase;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::provider::{BlockingProvider, EventIter};
use crate::{
    CompletionRequest, CompletionResponse, ContentBlock, Dialect, EventNormalizer, LLMError,
    Message, MessageContent, Result, Role, StopReason, TokenUsage,
};

/// Provider that replays canned raw events and records its calls
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    dialect: Dialect,
    completed_phase: Phase,
    tool_call: Option<(String, String, Value)>,
    events: Vec<Value>,
    failure: Option<String>,
    delay: Option<Duration>,
    complete_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    last_stream_request: Mutex<Option<CompletionRequest>>,
}

impl ScriptedProvider {
    fn with_dialect(name: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            name: name.into(),
            dialect,
            completed_phase: Phase::Completed,
            tool_call: None,
            events: Vec::new(),
            failure: None,
            delay: None,
            complete_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            last_stream_request: Mutex::new(None),
        }
    }

    /// Responses-API dialect provider
    pub fn responses(name: impl Into<String>) -> Self {
        Self::with_dialect(name, Dialect::Responses)
    }

    /// Chat-completions dialect provider
    pub fn chat(name: impl Into<String>) -> Self {
        Self::with_dialect(name, Dialect::ChatCompletions)
    }

    pub fn with_completed_phase(mut self, phase: Phase) -> Self {
        self.completed_phase = phase;
        self
    }

    /// Make the non-streaming call stop for one tool call
    pub fn with_tool_call(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        input: Value,
    ) -> Self {
        self.tool_call = Some((id.into(), name.into(), input));
        self
    }

    /// Raw events replayed by every streaming call
    pub fn with_chunks(mut self, events: Vec<Value>) -> Self {
        self.events = events;
        self
    }

    /// Alias of [`with_chunks`](Self::with_chunks) for Responses events
    pub fn with_events(self, events: Vec<Value>) -> Self {
        self.with_chunks(events)
    }

    /// Fail every streaming call before any event
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Sleep before each event on the worker thread
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// Total calls of either kind
    pub fn calls(&self) -> usize {
        self.complete_calls() + self.stream_calls()
    }

    pub fn last_stream_request(&self) -> Option<CompletionRequest> {
        self.last_stream_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BlockingProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);

        let (blocks, stop_reason) = match &self.tool_call {
            Some((id, name, input)) => (
                vec![ContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }],
                StopReason::ToolUse,
            ),
            None => (
                vec![ContentBlock::Text {
                    text: String::new(),
                }],
                StopReason::EndTurn,
            ),
        };

        Ok(CompletionResponse {
            message: Message {
                role: Role::Assistant,
                content: Some(MessageContent::Blocks(blocks)),
            },
            stop_reason,
            usage: TokenUsage::default(),
        })
    }

    fn stream(&self, request: &CompletionRequest) -> Result<EventIter> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_stream_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(request.clone());

        if let Some(message) = &self.failure {
            return Err(LLMError::ProviderError(message.clone()));
        }

        let delay = self.delay;
        let events = self.events.clone().into_iter().map(move |event| {
            if let Some(delay) = delay {
                std::thread::sleep(delay);
            }
            Ok(event)
        });
        Ok(Box::new(events))
    }

    fn normalizer(&self) -> EventNormalizer {
        EventNormalizer::new(self.dialect).with_completed_phase(self.completed_phase)
    }
}

/// Canned Responses-API stream: created, reasoning deltas, output deltas, completed
pub fn responses_events(model: &str, thinking: &[&str], output: &[&str]) -> Vec<Value> {
    let mut events = vec![json!({
        "type": "response.created",
        "response": {"id": format!("resp_{model}"), "model": model}
    })];
    events.extend(thinking.iter().map(|delta| {
        json!({"type": "response.reasoning_summary_text.delta", "delta": delta})
    }));
    events.extend(
        output
            .iter()
            .map(|delta| json!({"type": "response.output_text.delta", "delta": delta})),
    );
    events.push(json!({"type": "response.completed", "response": {"id": format!("resp_{model}")}}));
    events
}

/// Canned chat-completions stream ending with `finish_reason: stop`
pub fn chat_chunks(model: &str, output: &[&str]) -> Vec<Value> {
    let mut chunks: Vec<Value> = output
        .iter()
        .map(|content| {
            json!({
                "id": format!("chatcmpl_{model}"),
                "model": model,
                "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
            })
        })
        .collect();
    chunks.push(json!({
        "id": format!("chatcmpl_{model}"),
        "model": model,
        "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
    }));
    chunks
}
