//! Provider wiring and the per-request node set
//!
//! Three fan-out nodes answer the user's request in parallel and a reasoning
//! node concludes over their outputs:
//!
//! - `fundamental_A`: Responses API with hosted `web_search`
//! - `fundamental_B` and `emotional_A`: Chat Completions with the builtin
//!   `$web_search` served through one tool round-trip
//! - `conclusion`: Responses API reasoning model

use agent_core::{NodeResult, StreamingAgent};
use agent_llm::providers::{ChatConfig, ChatProvider, ResponsesConfig, ResponsesProvider};
use agent_llm::tools::WEB_SEARCH;
use agent_llm::{BlockingProvider, ToolExecutor, ToolSpec};
use agent_workflow::{AgentNode, FanOutCoordinator, ReferenceSource, SynthesisStage};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::CONCLUSION;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::prompts::Prompts;

pub const FUNDAMENTAL_A: &str = "fundamental_A";
pub const FUNDAMENTAL_B: &str = "fundamental_B";
pub const EMOTIONAL_A: &str = "emotional_A";

/// Fan-out nodes in replay order
pub const FAN_OUT_ORDER: [&str; 3] = [FUNDAMENTAL_A, FUNDAMENTAL_B, EMOTIONAL_A];

/// Provider clients shared by every request
#[derive(Clone)]
pub struct Providers {
    /// Responses API provider of `fundamental_A`
    pub web_search: Arc<dyn BlockingProvider>,
    /// Chat provider of `fundamental_B` and `emotional_A`
    pub chat: Arc<dyn BlockingProvider>,
    /// Responses API provider of the conclusion
    pub reasoning: Arc<dyn BlockingProvider>,
}

impl Providers {
    pub fn new(
        web_search: Arc<dyn BlockingProvider>,
        chat: Arc<dyn BlockingProvider>,
        reasoning: Arc<dyn BlockingProvider>,
    ) -> Self {
        Self {
            web_search,
            chat,
            reasoning,
        }
    }

    /// Build every provider from `ARK_*`, `KIMI_*` and `AIONLY_*` variables
    pub fn from_env() -> Result<Self> {
        let web_search = ResponsesProvider::new(ResponsesConfig::ark_from_env()?);
        let chat = ChatProvider::new(ChatConfig::moonshot_from_env()?);
        let reasoning = ResponsesProvider::new(ResponsesConfig::aionly_from_env()?);
        info!(
            web_search = %web_search.name(),
            chat = %chat.name(),
            reasoning = %reasoning.name(),
            "providers configured"
        );
        Ok(Self::new(
            Arc::new(web_search),
            Arc::new(chat),
            Arc::new(reasoning),
        ))
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("web_search", &self.web_search.name())
            .field("chat", &self.chat.name())
            .field("reasoning", &self.reasoning.name())
            .finish()
    }
}

/// Fresh node set for one request
pub struct ResearchTeam {
    pub coordinator: FanOutCoordinator,
    pub nodes: Vec<Arc<AgentNode>>,
    pub synthesis: SynthesisStage,
}

impl ResearchTeam {
    /// Build the nodes with prompts dated `today`
    pub fn assemble(
        providers: &Providers,
        prompts: &Arc<Prompts>,
        config: &PipelineConfig,
        reference: Arc<dyn ReferenceSource>,
        today: NaiveDate,
    ) -> Result<Self> {
        let fundamental = prompts.fundamental(today)?;
        let emotional = prompts.emotional(today)?;
        let web_search = Arc::new(ToolExecutor::with_web_search());

        let chat_node = |name: &str, prompt: String| {
            AgentNode::builder(name, Arc::clone(&providers.chat), &config.models.chat)
                .system_prompt(prompt)
                .tools(vec![ToolSpec::builtin(WEB_SEARCH)])
                .tool_hop(Arc::clone(&web_search))
                .timeout(config.node_timeout)
                .join_grace(config.join_grace)
                .build()
        };

        let nodes = vec![
            Arc::new(
                AgentNode::builder(
                    FUNDAMENTAL_A,
                    Arc::clone(&providers.web_search),
                    &config.models.web_search,
                )
                .system_prompt(fundamental.clone())
                .tools(vec![ToolSpec::web_search(config.web_search_limit)])
                .timeout(config.node_timeout)
                .join_grace(config.join_grace)
                .build(),
            ),
            Arc::new(chat_node(FUNDAMENTAL_B, fundamental)),
            Arc::new(chat_node(EMOTIONAL_A, emotional)),
        ];

        let coordinator = nodes
            .iter()
            .fold(FanOutCoordinator::builder(), |builder, node| {
                builder.add_node(Arc::clone(node) as Arc<dyn StreamingAgent>)
            })
            .build()?;

        let conclusion = Arc::new(
            AgentNode::builder(
                CONCLUSION,
                Arc::clone(&providers.reasoning),
                &config.models.reasoning,
            )
            .reasoning_effort(&config.reasoning_effort)
            .timeout(config.synthesis_timeout)
            .join_grace(config.join_grace)
            .build(),
        );
        let prompts = Arc::clone(prompts);
        let synthesis = SynthesisStage::new(
            conclusion,
            Arc::new(move |price_data: &str| {
                prompts.conclusion(price_data).unwrap_or_else(|e| {
                    warn!(error = %e, "conclusion prompt failed to render");
                    String::new()
                })
            }),
        )
        .with_reference(reference);

        Ok(Self {
            coordinator,
            nodes,
            synthesis,
        })
    }

    /// Final result of every fan-out node, in launch order
    pub async fn results(&self) -> Vec<(String, NodeResult)> {
        let mut results = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            results.push((node.name().to_string(), node.result().await));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_llm::testing::ScriptedProvider;

    struct EmptyReference;

    #[async_trait::async_trait]
    impl ReferenceSource for EmptyReference {
        async fn summary(&self, _subject: &str) -> agent_core::Result<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn test_team_layout() {
        let providers = Providers::new(
            Arc::new(ScriptedProvider::responses("ark")),
            Arc::new(ScriptedProvider::chat("moonshot")),
            Arc::new(ScriptedProvider::responses("aionly")),
        );
        let prompts = Arc::new(Prompts::new().unwrap());
        let today = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();

        let team = ResearchTeam::assemble(
            &providers,
            &prompts,
            &PipelineConfig::default(),
            Arc::new(EmptyReference),
            today,
        )
        .unwrap();

        assert_eq!(team.coordinator.node_names(), FAN_OUT_ORDER.to_vec());
        assert_eq!(team.synthesis.name(), CONCLUSION);
        assert_eq!(team.nodes[0].model(), "doubao-seed-1-6-251015");
        assert_eq!(team.nodes[1].model(), "kimi-k2-0711-preview");
        assert!(team.nodes[2].system_prompt().contains("2025-03-07"));
        assert_eq!(team.synthesis.node().model(), "gpt-5");
    }
}
