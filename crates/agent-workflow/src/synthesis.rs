//! Dependent synthesis over the fan-out results
//!
//! The synthesis stage asks a read-only reference source for a summary of
//! the subject, renders it into the system prompt, turns every non-empty node
//! output into a `"<node>: <text>"` user message and streams one more node
//! run through the same bridge and normaliser.

use agent_core::{NodeResult, Result, StreamingAgent, WireStream};
use agent_llm::Message;
use async_trait::async_trait;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::AgentNode;

/// Read-only source of the reference summary for a subject
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn summary(&self, subject: &str) -> Result<String>;
}

/// Renders the synthesis system prompt from the reference summary
pub type PromptBuilder = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// One more provider call over every node output
pub struct SynthesisStage {
    node: Arc<AgentNode>,
    reference: Option<Arc<dyn ReferenceSource>>,
    prompt: PromptBuilder,
}

impl SynthesisStage {
    pub fn new(node: Arc<AgentNode>, prompt: PromptBuilder) -> Self {
        Self {
            node,
            reference: None,
            prompt,
        }
    }

    pub fn with_reference(mut self, source: Arc<dyn ReferenceSource>) -> Self {
        self.reference = Some(source);
        self
    }

    pub fn node(&self) -> &Arc<AgentNode> {
        &self.node
    }

    /// Node name carried on synthesis wire lines
    pub fn name(&self) -> &str {
        self.node.name()
    }

    /// Reference summary, empty when the source is missing or fails
    pub async fn reference_summary(&self, subject: &str) -> String {
        let Some(source) = &self.reference else {
            return String::new();
        };
        match source.summary(subject).await {
            Ok(summary) => {
                info!(subject = %subject, "reference summary ready");
                summary
            }
            Err(e) => {
                warn!(subject = %subject, error = %e, "reference summary failed, continuing without it");
                String::new()
            }
        }
    }

    /// One user message per non-empty node output, in the given order
    pub fn context_messages(outputs: &[(String, NodeResult)]) -> Vec<Message> {
        outputs
            .iter()
            .filter_map(|(node, result)| {
                if result.output_text.is_empty() {
                    info!(node = %node, "no output, skipped in synthesis");
                    None
                } else {
                    Some(Message::user(format!("{node}: {}", result.output_text)))
                }
            })
            .collect()
    }

    /// Stream the synthesis run
    pub fn run(&self, subject: &str, outputs: Vec<(String, NodeResult)>) -> WireStream {
        let stage = Self {
            node: Arc::clone(&self.node),
            reference: self.reference.clone(),
            prompt: Arc::clone(&self.prompt),
        };
        let subject = subject.to_string();

        async_stream::stream! {
            let summary = stage.reference_summary(&subject).await;
            let system = (stage.prompt)(&format!("{summary}\n"));
            let messages = Self::context_messages(&outputs);
            info!(node = %stage.name(), context = messages.len(), "synthesis started");

            let mut lines = Arc::clone(&stage.node).run_with(system, messages);
            while let Some(line) = lines.next().await {
                yield line;
            }
        }
        .boxed()
    }

    /// Final synthesis result
    pub async fn result(&self) -> NodeResult {
        self.node.result().await
    }
}

impl fmt::Debug for SynthesisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthesisStage")
            .field("node", &self.node.name())
            .field("has_reference", &self.reference.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{Error, NodeStatus, Phase, WireLine};
    use agent_llm::testing::{ScriptedProvider, responses_events};

    struct FixedSource(Result<String>);

    #[async_trait]
    impl ReferenceSource for FixedSource {
        async fn summary(&self, _subject: &str) -> Result<String> {
            match &self.0 {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(Error::Generic(e.to_string())),
            }
        }
    }

    fn ok(text: &str) -> NodeResult {
        NodeResult::finalize::<&str>(&[], &[text], NodeStatus::Ok)
    }

    fn stage(provider: Arc<ScriptedProvider>, source: Result<String>) -> SynthesisStage {
        let node = Arc::new(AgentNode::builder("conclusion", provider, "gpt-5").build());
        SynthesisStage::new(node, Arc::new(|price: &str| format!("PRICE[{price}]")))
            .with_reference(Arc::new(FixedSource(source)))
    }

    #[test]
    fn test_context_skips_empty_outputs() {
        let messages = SynthesisStage::context_messages(&[
            ("fundamental_A".to_string(), ok("稳健")),
            ("fundamental_B".to_string(), NodeResult::default()),
            ("emotional_A".to_string(), ok("偏暖")),
        ]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), Some("fundamental_A: 稳健"));
        assert_eq!(messages[1].text(), Some("emotional_A: 偏暖"));
    }

    #[tokio::test]
    async fn test_summary_rendered_into_prompt() {
        let provider = Arc::new(
            ScriptedProvider::responses("aionly")
                .with_completed_phase(Phase::Done)
                .with_events(responses_events("gpt-5", &[], &["买入"])),
        );
        let stage = stage(provider.clone(), Ok("0. 基准".to_string()));

        let lines: Vec<WireLine> = stage
            .run("600519", vec![("fundamental_A".to_string(), ok("稳健"))])
            .map(|l| l.unwrap())
            .collect()
            .await;

        assert_eq!(lines.last().unwrap().data.phase, Phase::Done);
        assert!(lines.iter().all(|l| l.node == "conclusion"));
        assert_eq!(stage.result().await.output_text, "买入");

        let request = provider.last_stream_request().unwrap();
        assert_eq!(request.system.as_deref(), Some("PRICE[0. 基准\n]"));
        assert_eq!(request.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_reference_gives_empty_summary() {
        let provider = Arc::new(
            ScriptedProvider::responses("aionly").with_events(responses_events("gpt-5", &[], &[])),
        );
        let stage = stage(
            provider.clone(),
            Err(Error::Generic("bars unavailable".to_string())),
        );

        assert_eq!(stage.reference_summary("600519").await, "");

        let _: Vec<_> = stage.run("600519", vec![]).collect().await;
        assert_eq!(
            provider.last_stream_request().unwrap().system.as_deref(),
            Some("PRICE[\n]")
        );
    }

    #[tokio::test]
    async fn test_failed_synthesis_leaves_conclusion_empty() {
        let provider = Arc::new(ScriptedProvider::responses("aionly").failing("quota exceeded"));
        let stage = stage(provider, Ok(String::new()));

        let lines: Vec<WireLine> = stage
            .run("600519", vec![("fundamental_A".to_string(), ok("稳健"))])
            .map(|l| l.unwrap())
            .collect()
            .await;

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].data.phase, Phase::Error);
        assert!(stage.result().await.output_text.is_empty());
    }
}
