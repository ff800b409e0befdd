//! Single tool round-trip before a streaming call
//!
//! The first call is non-streaming. If the model stops to call tools, each
//! call is executed locally once, the assistant message and one tool-result
//! message per call are appended, and the conversation is re-issued in
//! streaming mode. Tool calls requested by the streaming follow-up are not
//! executed.

use tracing::{debug, info};

use crate::provider::{BlockingProvider, EventIter};
use crate::{CompletionRequest, ContentBlock, Message, Result, StopReason, ToolExecutor};

/// Run the tool hop and open the follow-up stream. Blocks.
pub fn stream_with_tool_hop(
    provider: &dyn BlockingProvider,
    mut request: CompletionRequest,
    tools: &ToolExecutor,
) -> Result<EventIter> {
    let first = provider.complete(&request)?;

    if first.stop_reason == StopReason::ToolUse {
        let calls: Vec<_> = first
            .message
            .tool_uses()
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.clone(), name.clone(), input.clone()))
                }
                _ => None,
            })
            .collect();

        request.messages.push(first.message);
        for (id, name, input) in calls {
            let result = tools.execute(&name, &input);
            debug!(provider = provider.name(), tool = %name, "tool executed");
            request.messages.push(Message::tool_result(id, name, result));
        }
        info!(provider = provider.name(), "tool round-trip complete");
    }

    provider.stream(&request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use crate::{MessageContent, tools::WEB_SEARCH};
    use serde_json::json;

    fn request() -> CompletionRequest {
        CompletionRequest::builder("kimi-k2-0711-preview")
            .add_message(Message::user("600519"))
            .build()
    }

    #[test]
    fn test_exactly_one_round_trip() {
        let provider = ScriptedProvider::chat("moonshot")
            .with_tool_call("call_1", WEB_SEARCH, json!({"query": "贵州茅台"}))
            .with_chunks(vec![json!({"choices": [{"delta": {"content": "ok"}, "finish_reason": "stop"}]})]);
        let tools = ToolExecutor::with_web_search();

        let events: Vec<_> = stream_with_tool_hop(&provider, request(), &tools)
            .unwrap()
            .collect();

        assert_eq!(events.len(), 1);
        assert_eq!(provider.complete_calls(), 1);
        assert_eq!(provider.stream_calls(), 1);

        let streamed = provider.last_stream_request().unwrap();
        assert_eq!(streamed.messages.len(), 3);
        assert!(streamed.messages[1].has_tool_uses());
        assert!(streamed.messages[2].is_tool_result());
        let Some(MessageContent::Blocks(blocks)) = &streamed.messages[2].content else {
            panic!("expected tool result blocks");
        };
        let ContentBlock::ToolResult { content, name, .. } = &blocks[0] else {
            panic!("expected tool result");
        };
        assert_eq!(name.as_deref(), Some(WEB_SEARCH));
        assert_eq!(serde_json::from_str::<serde_json::Value>(content).unwrap()["query"], "贵州茅台");
    }

    #[test]
    fn test_unknown_tool_result_is_fed_back() {
        let provider = ScriptedProvider::chat("moonshot")
            .with_tool_call("call_9", "calculator", json!({}))
            .with_chunks(vec![]);
        let tools = ToolExecutor::with_web_search();

        stream_with_tool_hop(&provider, request(), &tools).unwrap();

        let streamed = provider.last_stream_request().unwrap();
        let Some(MessageContent::Blocks(blocks)) = &streamed.messages[2].content else {
            panic!("expected tool result blocks");
        };
        assert!(matches!(
            &blocks[0],
            ContentBlock::ToolResult { content, .. } if content == "Error: unknown tool 'calculator'"
        ));
    }

    #[test]
    fn test_no_tool_call_streams_directly() {
        let provider = ScriptedProvider::chat("moonshot").with_chunks(vec![]);
        let tools = ToolExecutor::with_web_search();

        stream_with_tool_hop(&provider, request(), &tools).unwrap();

        assert_eq!(provider.complete_calls(), 1);
        assert_eq!(provider.stream_calls(), 1);
        assert_eq!(provider.last_stream_request().unwrap().messages.len(), 1);
    }
}
