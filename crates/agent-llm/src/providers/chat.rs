//! Chat Completions provider
//!
//! Speaks `POST {api_base}/chat/completions` for OpenAI-compatible vendors
//! such as Moonshot. Streaming responses are read as SSE chunks and
//! normalised by [`Dialect::ChatCompletions`].
//!
//! ```no_run
//! use agent_llm::providers::{ChatConfig, ChatProvider};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = ChatProvider::new(ChatConfig::moonshot_from_env()?);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::io::BufReader;
use tracing::{debug, instrument};

use super::sse::SseEvents;
use super::{blocking_client, env_key, status_error};
use crate::provider::{BlockingProvider, EventIter};
use crate::{
    CompletionRequest, CompletionResponse, ContentBlock, Dialect, EventNormalizer, LLMError,
    Message, MessageContent, Result, Role, StopReason, TokenUsage, ToolSpec,
};

const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const MOONSHOT_API_BASE: &str = "https://api.moonshot.cn/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Configuration for a chat-completions provider
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Provider name used in logs
    pub name: String,

    /// API key for authentication
    pub api_key: String,

    /// Base URL of the OpenAI-compatible API
    pub api_base: String,

    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
}

impl ChatConfig {
    /// Create a new config with the given API key and default settings
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            name: "openai".to_string(),
            api_key: api_key.into(),
            api_base: DEFAULT_OPENAI_API_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Read `OPENAI_API_KEY` and optionally `OPENAI_API_BASE`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(env_key("OPENAI_API_KEY")?);
        if let Ok(base) = std::env::var("OPENAI_API_BASE") {
            config.api_base = base;
        }
        Ok(config)
    }

    /// Moonshot (Kimi): reads `KIMI_API_KEY` and optionally `KIMI_API_BASE`
    pub fn moonshot_from_env() -> Result<Self> {
        let api_base =
            std::env::var("KIMI_API_BASE").unwrap_or_else(|_| MOONSHOT_API_BASE.to_string());
        Ok(Self::new(env_key("KIMI_API_KEY")?)
            .with_name("moonshot")
            .with_api_base(api_base))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set custom API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Set request timeout in seconds
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Blocking chat-completions provider
#[derive(Debug, Clone)]
pub struct ChatProvider {
    config: ChatConfig,
}

impl ChatProvider {
    pub fn new(config: ChatConfig) -> Self {
        Self { config }
    }

    /// Get the current configuration
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_base)
    }

    fn post(&self, body: &ChatRequest) -> Result<reqwest::blocking::Response> {
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

impl BlockingProvider for ChatProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    #[instrument(skip(self, request), fields(provider = %self.config.name, model = %request.model))]
    fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let body = ChatRequest::from_request(request, false);
        let chat_response: ChatResponse = self.post(&body)?.json().map_err(|e| {
            LLMError::UnexpectedResponse(format!("Failed to parse response: {e}"))
        })?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::UnexpectedResponse("No choices in response".to_string()))?;

        debug!(
            finish_reason = %choice.finish_reason,
            input_tokens = chat_response.usage.prompt_tokens,
            output_tokens = chat_response.usage.completion_tokens,
            "chat completion received"
        );

        Ok(CompletionResponse {
            message: parse_response_message(choice.message)?,
            stop_reason: map_stop_reason(&choice.finish_reason),
            usage: TokenUsage {
                input_tokens: chat_response.usage.prompt_tokens,
                output_tokens: chat_response.usage.completion_tokens,
            },
        })
    }

    #[instrument(skip(self, request), fields(provider = %self.config.name, model = %request.model))]
    fn stream(&self, request: &CompletionRequest) -> Result<EventIter> {
        let body = ChatRequest::from_request(request, true);
        let response = self.post(&body)?;
        debug!("chat stream opened");
        Ok(Box::new(SseEvents::new(
            BufReader::new(response),
            self.config.name.clone(),
        )))
    }

    fn normalizer(&self) -> EventNormalizer {
        EventNormalizer::new(Dialect::ChatCompletions)
    }
}

// ============================================================================
// Wire request types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolSpec>>,
}

impl ChatRequest {
    fn from_request(request: &CompletionRequest, stream: bool) -> Self {
        Self {
            model: request.model.clone(),
            messages: build_chat_messages(request.system.clone(), request.messages.clone()),
            stream,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: request.tools.clone().filter(|t| !t.is_empty()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatToolCall {
    id: String,
    #[serde(rename = "type")]
    tool_type: String,
    function: ChatFunctionCall,
}

#[derive(Debug, Serialize)]
struct ChatFunctionCall {
    name: String,
    arguments: String,
}

// ============================================================================
// Wire response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatResponseChoice>,
    #[serde(default)]
    usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseToolCall {
    id: String,
    function: ChatResponseFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ChatResponseFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

// ============================================================================
// Conversion functions
// ============================================================================

/// System prompt first, then each message
fn build_chat_messages(system: Option<String>, messages: Vec<Message>) -> Vec<ChatMessage> {
    let mut result = Vec::new();
    if let Some(sys) = system {
        result.push(ChatMessage::text("system", sys));
    }
    for msg in messages {
        result.extend(convert_message(msg));
    }
    result
}

/// One message may expand into several (each tool result is its own message)
fn convert_message(msg: Message) -> Vec<ChatMessage> {
    let role = match msg.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    };

    match msg.content {
        Some(MessageContent::Text(text)) => vec![ChatMessage::text(role, text)],
        Some(MessageContent::Blocks(blocks)) => convert_blocks(role, blocks),
        None => vec![ChatMessage::text(role, String::new())],
    }
}

fn convert_blocks(role: &str, blocks: Vec<ContentBlock>) -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text } => texts.push(text),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ChatToolCall {
                id,
                tool_type: "function".to_string(),
                function: ChatFunctionCall {
                    name,
                    arguments: input.to_string(),
                },
            }),
            ContentBlock::ToolResult {
                tool_use_id,
                name,
                content,
                ..
            } => messages.push(ChatMessage {
                role: "tool".to_string(),
                content: Some(content),
                tool_calls: None,
                tool_call_id: Some(tool_use_id),
                name,
            }),
        }
    }

    if !texts.is_empty() || !tool_calls.is_empty() {
        let content = texts.concat();
        messages.insert(
            0,
            ChatMessage {
                role: role.to_string(),
                content: Some(content),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: None,
                name: None,
            },
        );
    }

    messages
}

fn parse_response_message(msg: ChatResponseMessage) -> Result<Message> {
    let mut blocks = Vec::new();

    if let Some(content) = msg.content.filter(|c| !c.is_empty()) {
        blocks.push(ContentBlock::Text { text: content });
    }

    for call in msg.tool_calls.unwrap_or_default() {
        let input = serde_json::from_str(&call.function.arguments).map_err(|e| {
            LLMError::UnexpectedResponse(format!("Failed to parse tool arguments: {e}"))
        })?;
        blocks.push(ContentBlock::ToolUse {
            id: call.id,
            name: call.function.name,
            input,
        });
    }

    if blocks.is_empty() {
        blocks.push(ContentBlock::Text {
            text: String::new(),
        });
    }

    Ok(Message {
        role: Role::Assistant,
        content: Some(MessageContent::Blocks(blocks)),
    })
}

fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "stop" => StopReason::EndTurn,
        "length" => StopReason::MaxTokens,
        "tool_calls" => StopReason::ToolUse,
        other => {
            debug!("Unknown stop reason: {}", other);
            StopReason::EndTurn
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::WEB_SEARCH;
    use serde_json::json;

    #[test]
    fn test_provider_creation() {
        let provider = ChatProvider::new(
            ChatConfig::new("test-key")
                .with_name("moonshot")
                .with_api_base("https://api.moonshot.cn/v1"),
        );
        assert_eq!(provider.name(), "moonshot");
        assert_eq!(
            provider.endpoint(),
            "https://api.moonshot.cn/v1/chat/completions"
        );
        assert_eq!(provider.config().timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_moonshot_from_env() {
        unsafe {
            std::env::set_var("KIMI_API_KEY", "kimi-key");
            std::env::remove_var("KIMI_API_BASE");
        }

        let config = ChatConfig::moonshot_from_env().unwrap();
        assert_eq!(config.api_key, "kimi-key");
        assert_eq!(config.api_base, MOONSHOT_API_BASE);
        assert_eq!(config.name, "moonshot");

        unsafe {
            std::env::remove_var("KIMI_API_KEY");
        }
    }

    #[test]
    fn test_system_message_first() {
        let messages = build_chat_messages(
            Some("You are an analyst".to_string()),
            vec![Message::user("600519")],
        );
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content.as_deref(), Some("600519"));
    }

    #[test]
    fn test_tool_result_becomes_tool_message() {
        let msgs = convert_message(Message::tool_result("call_1", WEB_SEARCH, "{\"q\":1}"));
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].role, "tool");
        assert_eq!(msgs[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msgs[0].name.as_deref(), Some(WEB_SEARCH));

        let json = serde_json::to_value(&msgs[0]).unwrap();
        assert_eq!(json["content"], "{\"q\":1}");
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn test_assistant_tool_calls_round_trip() {
        let assistant = parse_response_message(ChatResponseMessage {
            content: None,
            tool_calls: Some(vec![ChatResponseToolCall {
                id: "call_1".to_string(),
                function: ChatResponseFunctionCall {
                    name: WEB_SEARCH.to_string(),
                    arguments: r#"{"query":"茅台"}"#.to_string(),
                },
            }]),
        })
        .unwrap();
        assert!(assistant.has_tool_uses());

        let msgs = convert_message(assistant);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].role, "assistant");
        let calls = msgs[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, WEB_SEARCH);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&calls[0].function.arguments).unwrap(),
            json!({"query": "茅台"})
        );
    }

    #[test]
    fn test_request_body_shape() {
        let request = CompletionRequest::builder("kimi-k2-0711-preview")
            .system("sys")
            .add_message(Message::user("hi"))
            .tools(vec![ToolSpec::builtin(WEB_SEARCH)])
            .build();
        let body = serde_json::to_value(ChatRequest::from_request(&request, true)).unwrap();

        assert_eq!(body["stream"], true);
        assert_eq!(body["tools"][0]["type"], "builtin_function");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_stop_reason_mapping() {
        assert_eq!(map_stop_reason("stop"), StopReason::EndTurn);
        assert_eq!(map_stop_reason("length"), StopReason::MaxTokens);
        assert_eq!(map_stop_reason("tool_calls"), StopReason::ToolUse);
        assert_eq!(map_stop_reason("content_filter"), StopReason::EndTurn);
    }
}
