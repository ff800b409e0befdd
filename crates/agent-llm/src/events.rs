//! Raw provider events, decoded once into tagged enums
//!
//! Two wire dialects are supported: the Responses API event stream (typed by a
//! `type` string) and Chat Completions chunks. Decoding distinguishes three
//! outcomes: a recognised event, an event to ignore, and a recognised event
//! whose fields do not match the expected shape.

use agent_core::Annotation;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{LLMError, Result};

/// Wire dialect spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `POST /responses` with typed stream events
    Responses,
    /// `POST /chat/completions` with delta chunks
    ChatCompletions,
}

/// Recognised Responses API stream event
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsesEvent {
    Created { model: String, id: String },
    ReasoningDelta(String),
    OutputDelta(String),
    AnnotationAdded(Annotation),
    Completed,
    Error { code: String, message: String },
}

#[derive(Deserialize)]
struct CreatedPayload {
    response: ResponseMeta,
}

#[derive(Deserialize)]
struct ResponseMeta {
    model: String,
    id: String,
}

#[derive(Deserialize)]
struct DeltaPayload {
    delta: String,
}

#[derive(Deserialize)]
struct AnnotationPayload {
    annotation: Annotation,
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    message: String,
}

fn payload<T: DeserializeOwned>(event_type: &str, raw: Value) -> Result<T> {
    serde_json::from_value(raw).map_err(|e| LLMError::MalformedEvent {
        event_type: event_type.to_string(),
        detail: e.to_string(),
    })
}

impl ResponsesEvent {
    /// Decode one raw event. Unknown types yield `Ok(None)`.
    pub fn decode(raw: Value) -> Result<Option<Self>> {
        let Some(event_type) = raw.get("type").and_then(Value::as_str).map(str::to_owned) else {
            return Ok(None);
        };

        let event = match event_type.as_str() {
            "response.created" => {
                let p: CreatedPayload = payload(&event_type, raw)?;
                Self::Created {
                    model: p.response.model,
                    id: p.response.id,
                }
            }
            "response.reasoning_summary_text.delta" => {
                Self::ReasoningDelta(payload::<DeltaPayload>(&event_type, raw)?.delta)
            }
            "response.output_text.delta" => {
                Self::OutputDelta(payload::<DeltaPayload>(&event_type, raw)?.delta)
            }
            "response.output_text.annotation.added" => {
                Self::AnnotationAdded(payload::<AnnotationPayload>(&event_type, raw)?.annotation)
            }
            "response.completed" => Self::Completed,
            "error" => {
                let p: ErrorPayload = payload(&event_type, raw)?;
                let code = match p.code {
                    Some(Value::String(s)) => s,
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                };
                Self::Error {
                    code,
                    message: p.message,
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(event))
    }
}

/// Chat Completions stream chunk
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub delta: ChatDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

impl ChatChunk {
    /// Decode one raw chunk. Chunks without choices (usage trailers,
    /// keep-alives) yield `Ok(None)`.
    pub fn decode(raw: Value) -> Result<Option<Self>> {
        let chunk: Self = payload("chat.completion.chunk", raw)?;
        if chunk.choices.is_empty() {
            return Ok(None);
        }
        Ok(Some(chunk))
    }

    /// First choice, always present after a successful decode
    pub fn choice(&self) -> Option<&ChatChoice> {
        self.choices.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_created() {
        let raw = json!({
            "type": "response.created",
            "response": {"id": "resp_1", "model": "doubao-seed-1-6-251015", "status": "in_progress"}
        });
        assert_eq!(
            ResponsesEvent::decode(raw).unwrap(),
            Some(ResponsesEvent::Created {
                model: "doubao-seed-1-6-251015".to_string(),
                id: "resp_1".to_string(),
            })
        );
    }

    #[test]
    fn test_decode_unknown_type_is_dropped() {
        let raw = json!({"type": "response.output_item.added", "item": {}});
        assert_eq!(ResponsesEvent::decode(raw).unwrap(), None);

        let untyped = json!({"hello": "world"});
        assert_eq!(ResponsesEvent::decode(untyped).unwrap(), None);
    }

    #[test]
    fn test_decode_malformed_delta() {
        let raw = json!({"type": "response.output_text.delta", "delta": 42});
        let err = ResponsesEvent::decode(raw).unwrap_err();
        assert!(matches!(
            err,
            LLMError::MalformedEvent { ref event_type, .. } if event_type == "response.output_text.delta"
        ));
    }

    #[test]
    fn test_decode_annotation_with_missing_fields() {
        let raw = json!({
            "type": "response.output_text.annotation.added",
            "annotation": {"type": "url_citation", "title": "年报", "url": "https://example.com"}
        });
        let Some(ResponsesEvent::AnnotationAdded(annotation)) = ResponsesEvent::decode(raw).unwrap()
        else {
            panic!("expected annotation");
        };
        assert_eq!(annotation.kind, "url_citation");
        assert_eq!(annotation.title, "年报");
        assert!(annotation.site_name.is_empty());
    }

    #[test]
    fn test_decode_error_with_numeric_code() {
        let raw = json!({"type": "error", "code": 429, "message": "too many requests"});
        assert_eq!(
            ResponsesEvent::decode(raw).unwrap(),
            Some(ResponsesEvent::Error {
                code: "429".to_string(),
                message: "too many requests".to_string(),
            })
        );
    }

    #[test]
    fn test_decode_chat_chunk() {
        let raw = json!({
            "id": "chatcmpl-1",
            "model": "kimi-k2-0711-preview",
            "choices": [{"index": 0, "delta": {"content": "你好"}, "finish_reason": null}]
        });
        let chunk = ChatChunk::decode(raw).unwrap().unwrap();
        let choice = chunk.choice().unwrap();
        assert_eq!(choice.delta.content.as_deref(), Some("你好"));
        assert!(choice.finish_reason.is_none());
    }

    #[test]
    fn test_chat_chunk_without_choices_is_dropped() {
        let raw = json!({"id": "chatcmpl-1", "choices": [], "usage": {"total_tokens": 10}});
        assert_eq!(ChatChunk::decode(raw).unwrap(), None);
    }

    #[test]
    fn test_chat_chunk_malformed() {
        let raw = json!({"id": "chatcmpl-1", "choices": "nope"});
        assert!(ChatChunk::decode(raw).is_err());
    }
}
