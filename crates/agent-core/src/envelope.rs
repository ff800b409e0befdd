//! Canonical stream envelope and client wire lines
//!
//! Every provider event is normalised into an [`Envelope`] before it leaves
//! the provider layer. Nodes wrap envelopes into [`WireLine`]s, which is the
//! exact shape written to the client as a server-sent-event body.

use serde::{Deserialize, Serialize};

/// Discriminator on an [`Envelope`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Reasoning / thinking fragment
    Thinking,
    /// Answer text fragment
    Output,
    /// Citation metadata, content is empty
    Annotation,
    /// Provider reported the response as completed
    Completed,
    /// Failure surfaced as data
    Error,
    /// End of stream
    Done,
}

impl Phase {
    /// Phases that always end a node's stream
    pub fn ends_stream(self) -> bool {
        matches!(self, Self::Completed | Self::Done)
    }
}

/// Citation metadata attached to an annotation-phase envelope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Annotation {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub site_name: String,
    pub publish_time: String,
    pub summary: String,
}

/// Canonical normalised unit of streamed output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub phase: Phase,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Annotation>,
    /// Model identifier reported by the provider
    #[serde(rename = "model", default)]
    pub provider_model: String,
    /// Provider response identifier
    #[serde(rename = "id", default)]
    pub response_id: String,
    /// Strictly increasing per node, starting at 0
    #[serde(rename = "index", default)]
    pub sequence_index: u64,
}

impl Envelope {
    /// Create an envelope with no provider metadata
    pub fn new(phase: Phase, content: impl Into<String>) -> Self {
        Self {
            phase,
            content: content.into(),
            annotation: None,
            provider_model: String::new(),
            response_id: String::new(),
            sequence_index: 0,
        }
    }

    /// Create an error-phase envelope
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Phase::Error, message)
    }

    /// Attach citation metadata
    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotation = Some(annotation);
        self
    }

    /// Attach the provider model and response id
    pub fn with_provider(mut self, model: impl Into<String>, response_id: impl Into<String>) -> Self {
        self.provider_model = model.into();
        self.response_id = response_id.into();
        self
    }

    /// Set the sequence index
    pub fn with_index(mut self, index: u64) -> Self {
        self.sequence_index = index;
        self
    }
}

/// Node progress marker on a wire line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    InProgress,
    Done,
}

/// One line of the client stream: `{node, state, data}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireLine {
    pub node: String,
    pub state: NodeState,
    pub data: Envelope,
}

impl WireLine {
    /// Line for a node that is still streaming
    pub fn in_progress(node: impl Into<String>, data: Envelope) -> Self {
        Self {
            node: node.into(),
            state: NodeState::InProgress,
            data,
        }
    }

    /// Line carrying a node's `done` envelope
    pub fn done(node: impl Into<String>, data: Envelope) -> Self {
        Self {
            node: node.into(),
            state: NodeState::Done,
            data,
        }
    }

    /// Wrap an envelope, marking the line done when the phase is `done`
    pub fn for_envelope(node: impl Into<String>, data: Envelope) -> Self {
        if data.phase == Phase::Done {
            Self::done(node, data)
        } else {
            Self::in_progress(node, data)
        }
    }

    /// Sentinel closing a whole client stream
    pub fn end_of_stream(index: u64) -> Self {
        Self::done("", Envelope::new(Phase::Done, "").with_index(index))
    }

    /// Whether this is the stream-closing sentinel
    pub fn is_end_of_stream(&self) -> bool {
        self.node.is_empty() && self.state == NodeState::Done
    }

    /// Encode as a single JSON line
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Encode as one server-sent-event frame
    pub fn to_sse(&self) -> crate::Result<String> {
        Ok(format!("data: {}\n\n", self.to_json()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_names() {
        let envelope = Envelope::new(Phase::Output, "hello")
            .with_provider("kimi-k2", "chatcmpl-1")
            .with_index(3);
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["phase"], "output");
        assert_eq!(json["model"], "kimi-k2");
        assert_eq!(json["id"], "chatcmpl-1");
        assert_eq!(json["index"], 3);
        assert!(json.get("annotation").is_none());
    }

    #[test]
    fn test_annotation_type_field() {
        let annotation = Annotation {
            title: "Quarterly report".to_string(),
            kind: "url_citation".to_string(),
            ..Default::default()
        };
        let envelope = Envelope::new(Phase::Annotation, "").with_annotation(annotation);
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["annotation"]["type"], "url_citation");
        assert_eq!(json["annotation"]["site_name"], "");
    }

    #[test]
    fn test_state_follows_done_phase() {
        let line = WireLine::for_envelope("fundamental_A", Envelope::new(Phase::Done, ""));
        assert_eq!(line.state, NodeState::Done);

        let line = WireLine::for_envelope("fundamental_A", Envelope::new(Phase::Completed, ""));
        assert_eq!(line.state, NodeState::InProgress);
    }

    #[test]
    fn test_sse_frame_keeps_unicode() {
        let line = WireLine::in_progress("emotional_A", Envelope::new(Phase::Output, "情绪偏暖"));
        let frame = line.to_sse().unwrap();

        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("}\n\n"));
        assert!(frame.contains("情绪偏暖"));
    }

    #[test]
    fn test_end_of_stream() {
        let line = WireLine::end_of_stream(4);
        assert!(line.is_end_of_stream());
        assert_eq!(line.data.sequence_index, 4);
        assert_eq!(line.data.phase, Phase::Done);
    }

    #[test]
    fn test_phase_ends_stream() {
        assert!(Phase::Done.ends_stream());
        assert!(Phase::Completed.ends_stream());
        assert!(!Phase::Error.ends_stream());
        assert!(!Phase::Output.ends_stream());
    }
}
