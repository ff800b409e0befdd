//! Per-provider mapping from raw events to canonical envelopes
//!
//! The normaliser is the only place that knows provider event shapes. It
//! carries the provider model and response id forward from the event that
//! announces them, stamps every emitted envelope with the next sequence index
//! and flags the envelope that ends the node's stream.

use agent_core::{Envelope, Phase};

use crate::bridge::BridgeEvent;
use crate::events::{ChatChunk, Dialect, ResponsesEvent};

/// One normalised envelope plus whether it ends the stream
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub envelope: Envelope,
    pub terminal: bool,
}

/// Stateful raw-event to [`Envelope`] mapper for a single invocation
#[derive(Debug, Clone)]
pub struct EventNormalizer {
    dialect: Dialect,
    completed_phase: Phase,
    model: String,
    response_id: String,
    next_index: u64,
    finished: bool,
}

impl EventNormalizer {
    /// Normaliser for `dialect`; `response.completed` maps to `completed`
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            completed_phase: Phase::Completed,
            model: String::new(),
            response_id: String::new(),
            next_index: 0,
            finished: false,
        }
    }

    /// Phase emitted for a Responses API `response.completed` event
    pub fn with_completed_phase(mut self, phase: Phase) -> Self {
        self.completed_phase = phase;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Whether a terminal envelope has been emitted
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Map one bridge event. Nothing is emitted once the stream is finished.
    pub fn normalize(&mut self, event: BridgeEvent) -> Vec<Normalized> {
        if self.finished {
            return Vec::new();
        }

        let drafts = match event {
            BridgeEvent::Event(raw) => match self.dialect {
                Dialect::Responses => match ResponsesEvent::decode(raw) {
                    Ok(Some(event)) => self.responses_event(event),
                    Ok(None) => Vec::new(),
                    Err(e) => vec![(Envelope::error(format!("错误信息：{e}")), false)],
                },
                Dialect::ChatCompletions => match ChatChunk::decode(raw) {
                    Ok(Some(chunk)) => self.chat_chunk(chunk),
                    Ok(None) => Vec::new(),
                    Err(e) => vec![(Envelope::error(format!("错误信息：{e}")), false)],
                },
            },
            BridgeEvent::Done => vec![(Envelope::new(Phase::Done, ""), true)],
            BridgeEvent::Failed(e) => vec![(Envelope::error(e.to_string()), true)],
        };

        drafts
            .into_iter()
            .map(|(envelope, terminal)| self.stamp(envelope, terminal))
            .collect()
    }

    fn stamp(&mut self, envelope: Envelope, terminal: bool) -> Normalized {
        let envelope = envelope
            .with_provider(self.model.clone(), self.response_id.clone())
            .with_index(self.next_index);
        self.next_index += 1;
        if terminal {
            self.finished = true;
        }
        Normalized { envelope, terminal }
    }

    fn responses_event(&mut self, event: ResponsesEvent) -> Vec<(Envelope, bool)> {
        let draft = match event {
            ResponsesEvent::Created { model, id } => {
                self.model = model;
                self.response_id = id;
                return Vec::new();
            }
            ResponsesEvent::ReasoningDelta(delta) => (Envelope::new(Phase::Thinking, delta), false),
            ResponsesEvent::OutputDelta(delta) => (Envelope::new(Phase::Output, delta), false),
            ResponsesEvent::AnnotationAdded(annotation) => (
                Envelope::new(Phase::Annotation, "").with_annotation(annotation),
                false,
            ),
            ResponsesEvent::Completed => (Envelope::new(self.completed_phase, ""), true),
            ResponsesEvent::Error { code, message } => (
                Envelope::error(format!("错误码：{code}, 错误提示: {message}")),
                true,
            ),
        };
        vec![draft]
    }

    fn chat_chunk(&mut self, chunk: ChatChunk) -> Vec<(Envelope, bool)> {
        if !chunk.id.is_empty() {
            self.response_id.clone_from(&chunk.id);
        }
        if !chunk.model.is_empty() {
            self.model.clone_from(&chunk.model);
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return Vec::new();
        };

        let mut drafts = Vec::new();
        if let Some(reasoning) = choice.delta.reasoning_content.filter(|s| !s.is_empty()) {
            drafts.push((Envelope::new(Phase::Thinking, reasoning), false));
        }
        if let Some(content) = choice.delta.content.filter(|s| !s.is_empty()) {
            drafts.push((Envelope::new(Phase::Output, content), false));
        }
        if choice.finish_reason.as_deref() == Some("stop") {
            drafts.push((Envelope::new(Phase::Done, ""), true));
        }
        drafts
    }
}
