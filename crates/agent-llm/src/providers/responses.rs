//! Responses API provider
//!
//! Speaks `POST {api_base}/responses` for vendors that expose typed stream
//! events (Volcengine Ark, OpenAI-compatible gateways). The vendors disagree on
//! what `response.completed` means for a node: Ark streams citations after the
//! text and reports completion as `completed`, while the reasoning gateway
//! treats it as the end of the stream. The mapping is part of the config.

use agent_core::Phase;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::BufReader;
use tracing::{debug, instrument};

use super::sse::SseEvents;
use super::{blocking_client, env_key, status_error};
use crate::provider::{BlockingProvider, EventIter};
use crate::{
    CompletionRequest, CompletionResponse, ContentBlock, Dialect, EventNormalizer, LLMError,
    Message, MessageContent, Result, Role, StopReason, TokenUsage, ToolSpec,
};

const ARK_API_BASE: &str = "https://ark.cn-beijing.volces.com/api/v3";
const AIONLY_API_BASE: &str = "https://api.aiionly.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Configuration for a Responses API provider
#[derive(Debug, Clone)]
pub struct ResponsesConfig {
    /// Provider name used in logs
    pub name: String,
    pub api_key: String,
    pub api_base: String,
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
    /// Phase emitted for `response.completed`
    pub completed_phase: Phase,
}

impl ResponsesConfig {
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            name: "responses".to_string(),
            api_key: api_key.into(),
            api_base: api_base.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            completed_phase: Phase::Completed,
        }
    }

    /// Volcengine Ark: `ARK_API_KEY`, optional `ARK_API_BASE`
    pub fn ark_from_env() -> Result<Self> {
        let api_base = std::env::var("ARK_API_BASE").unwrap_or_else(|_| ARK_API_BASE.to_string());
        Ok(Self::new(env_key("ARK_API_KEY")?, api_base).with_name("ark"))
    }

    /// Reasoning gateway: `AIONLY_API_KEY`, optional `AIONLY_API_BASE`.
    /// `response.completed` ends the stream as `done`.
    pub fn aionly_from_env() -> Result<Self> {
        let api_base =
            std::env::var("AIONLY_API_BASE").unwrap_or_else(|_| AIONLY_API_BASE.to_string());
        Ok(Self::new(env_key("AIONLY_API_KEY")?, api_base)
            .with_name("aionly")
            .with_completed_phase(Phase::Done))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_completed_phase(mut self, phase: Phase) -> Self {
        self.completed_phase = phase;
        self
    }
}

/// Blocking Responses API provider
#[derive(Debug, Clone)]
pub struct ResponsesProvider {
    config: ResponsesConfig,
}

impl ResponsesProvider {
    pub fn new(config: ResponsesConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResponsesConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/responses", self.config.api_base)
    }

    fn post(&self, body: &ResponsesRequest) -> Result<reqwest::blocking::Response> {
        let response = blocking_client(self.config.timeout_secs)?
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text()?;
            return Err(status_error(status, error_text, &body.model));
        }
        Ok(response)
    }
}

impl BlockingProvider for ResponsesProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    #[instrument(skip(self, request), fields(provider = %self.config.name, model = %request.model))]
    fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let body = ResponsesRequest::from_request(request, false);
        let response: ResponsesResponse = self.post(&body)?.json().map_err(|e| {
            LLMError::UnexpectedResponse(format!("Failed to parse response: {e}"))
        })?;
        Ok(parse_response(response))
    }

    #[instrument(skip(self, request), fields(provider = %self.config.name, model = %request.model))]
    fn stream(&self, request: &CompletionRequest) -> Result<EventIter> {
        let body = ResponsesRequest::from_request(request, true);
        let response = self.post(&body)?;
        debug!("responses stream opened");
        Ok(Box::new(SseEvents::new(
            BufReader::new(response),
            self.config.name.clone(),
        )))
    }

    fn normalizer(&self) -> EventNormalizer {
        EventNormalizer::new(Dialect::Responses).with_completed_phase(self.config.completed_phase)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ResponsesRequest {
    model: String,
    input: Vec<Value>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<Reasoning>,
}

#[derive(Debug, Serialize)]
struct Reasoning {
    effort: String,
}

impl ResponsesRequest {
    fn from_request(request: &CompletionRequest, stream: bool) -> Self {
        Self {
            model: request.model.clone(),
            input: build_input(request.system.as_deref(), &request.messages),
            stream,
            max_output_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: request.tools.clone().filter(|t| !t.is_empty()),
            reasoning: request
                .reasoning_effort
                .clone()
                .map(|effort| Reasoning { effort }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: ResponsesUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<OutputContent>,
    },
    FunctionCall {
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputContent {
    OutputText {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct ResponsesUsage {
    #[serde(default)]
    input_tokens: usize,
    #[serde(default)]
    output_tokens: usize,
}

// ============================================================================
// Conversion functions
// ============================================================================

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

/// Input items: the system prompt, then text messages, function calls and
/// function call outputs in conversation order
fn build_input(system: Option<&str>, messages: &[Message]) -> Vec<Value> {
    let mut input = Vec::new();
    if let Some(sys) = system {
        input.push(serde_json::json!({"role": "system", "content": sys}));
    }

    for msg in messages {
        let role = role_name(msg.role);
        match &msg.content {
            Some(MessageContent::Text(text)) => {
                input.push(serde_json::json!({"role": role, "content": text}));
            }
            Some(MessageContent::Blocks(blocks)) => {
                for block in blocks {
                    input.push(match block {
                        ContentBlock::Text { text } => {
                            serde_json::json!({"role": role, "content": text})
                        }
                        ContentBlock::ToolUse { id, name, input: args } => serde_json::json!({
                            "type": "function_call",
                            "call_id": id,
                            "name": name,
                            "arguments": args.to_string(),
                        }),
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            ..
                        } => serde_json::json!({
                            "type": "function_call_output",
                            "call_id": tool_use_id,
                            "output": content,
                        }),
                    });
                }
            }
            None => {}
        }
    }
    input
}

fn parse_response(response: ResponsesResponse) -> CompletionResponse {
    let mut text = String::new();
    let mut tool_uses = Vec::new();

    for item in response.output {
        match item {
            OutputItem::Message { content } => {
                for part in content {
                    if let OutputContent::OutputText { text: t } = part {
                        text.push_str(&t);
                    }
                }
            }
            OutputItem::FunctionCall {
                call_id,
                name,
                arguments,
            } => {
                let input = serde_json::from_str(&arguments).unwrap_or(Value::String(arguments));
                tool_uses.push(ContentBlock::ToolUse {
                    id: call_id,
                    name,
                    input,
                });
            }
            OutputItem::Other => {}
        }
    }

    let stop_reason = if tool_uses.is_empty() {
        StopReason::EndTurn
    } else {
        StopReason::ToolUse
    };

    let mut blocks = vec![ContentBlock::Text { text }];
    blocks.extend(tool_uses);

    CompletionResponse {
        message: Message {
            role: Role::Assistant,
            content: Some(MessageContent::Blocks(blocks)),
        },
        stop_reason,
        usage: TokenUsage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_body_shape() {
        let request = CompletionRequest::builder("gpt-5")
            .system("You summarise research")
            .add_message(Message::user("fundamental_A: 稳健"))
            .reasoning_effort("medium")
            .build();
        let body = serde_json::to_value(ResponsesRequest::from_request(&request, true)).unwrap();

        assert_eq!(body["model"], "gpt-5");
        assert_eq!(body["stream"], true);
        assert_eq!(body["reasoning"]["effort"], "medium");
        assert_eq!(body["input"][0]["role"], "system");
        assert_eq!(body["input"][1]["content"], "fundamental_A: 稳健");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_web_search_tool_in_body() {
        let request = CompletionRequest::builder("doubao-seed-1-6-251015")
            .add_message(Message::user("600519"))
            .tools(vec![ToolSpec::web_search(15)])
            .build();
        let body = serde_json::to_value(ResponsesRequest::from_request(&request, true)).unwrap();
        assert_eq!(body["tools"], json!([{"type": "web_search", "limit": 15}]));
        assert!(body.get("reasoning").is_none());
    }

    #[test]
    fn test_normalizer_follows_completed_phase() {
        let ark = ResponsesProvider::new(ResponsesConfig::new("k", ARK_API_BASE));
        let gateway = ResponsesProvider::new(
            ResponsesConfig::new("k", AIONLY_API_BASE).with_completed_phase(Phase::Done),
        );

        let done = crate::BridgeEvent::Event(json!({"type": "response.completed"}));
        let again = crate::BridgeEvent::Event(json!({"type": "response.completed"}));
        assert_eq!(ark.normalizer().normalize(done)[0].envelope.phase, Phase::Completed);
        assert_eq!(gateway.normalizer().normalize(again)[0].envelope.phase, Phase::Done);
    }

    #[test]
    fn test_parse_response_text_and_calls() {
        let raw = json!({
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "content": [{"type": "output_text", "text": "上涨"}]},
                {"type": "function_call", "call_id": "fc_1", "name": "lookup", "arguments": "{\"code\":\"600519\"}"}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 3}
        });
        let response = parse_response(serde_json::from_value(raw).unwrap());

        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.message.text(), Some("上涨"));
        assert_eq!(response.message.tool_uses().len(), 1);
        assert_eq!(response.usage.total(), 15);
    }

    #[test]
    fn test_ark_from_env() {
        unsafe {
            std::env::set_var("ARK_API_KEY", "ark-key");
            std::env::remove_var("ARK_API_BASE");
        }
        let config = ResponsesConfig::ark_from_env().unwrap();
        assert_eq!(config.api_base, ARK_API_BASE);
        assert_eq!(config.completed_phase, Phase::Completed);
        unsafe {
            std::env::remove_var("ARK_API_KEY");
        }
    }
}
