//! Configuration for the research pipeline

use crate::error::{Result, StockError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Model ids used by the nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelIds {
    /// Responses API model with web search (`fundamental_A`)
    pub web_search: String,
    /// Chat model shared by `fundamental_B` and `emotional_A`
    pub chat: String,
    /// Reasoning model of the `conclusion` stage
    pub reasoning: String,
}

impl Default for ModelIds {
    fn default() -> Self {
        Self {
            web_search: "doubao-seed-1-6-251015".to_string(),
            chat: "kimi-k2-0711-preview".to_string(),
            reasoning: "gpt-5".to_string(),
        }
    }
}

/// Configuration for one pipeline instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Per-retrieval timeout of fan-out nodes
    pub node_timeout: Duration,

    /// Per-retrieval timeout of the synthesis node
    pub synthesis_timeout: Duration,

    /// Delay between two multiplex queue drains
    pub drain_interval: Duration,

    /// How long a finished bridge worker may take to be joined
    pub join_grace: Duration,

    /// Number of recent price bars in the reference summary
    pub bar_count: usize,

    /// Subject ids are truncated to this many characters
    pub subject_prefix_len: usize,

    /// Scenario discriminator of the idempotency key
    pub scenario_type: i64,

    /// SQLite database file
    pub database_path: PathBuf,

    /// Lifetime of entries in the in-process hot cache
    pub hot_cache_ttl: Duration,

    /// Result limit of the `web_search` tool
    pub web_search_limit: u32,

    /// Reasoning effort of the synthesis model
    pub reasoning_effort: String,

    pub models: ModelIds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            node_timeout: Duration::from_secs(60),
            synthesis_timeout: Duration::from_secs(180),
            drain_interval: Duration::from_millis(10),
            join_grace: Duration::from_millis(100),
            bar_count: 20,
            subject_prefix_len: 6,
            scenario_type: 1,
            database_path: PathBuf::from("research_states.db"),
            hot_cache_ttl: Duration::from_secs(3600),
            web_search_limit: 15,
            reasoning_effort: "medium".to_string(),
            models: ModelIds::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.node_timeout.is_zero() || self.synthesis_timeout.is_zero() {
            return Err(StockError::ConfigError(
                "retrieval timeouts must be greater than 0".to_string(),
            ));
        }

        if self.bar_count == 0 {
            return Err(StockError::ConfigError(
                "bar_count must be greater than 0".to_string(),
            ));
        }

        if self.subject_prefix_len == 0 {
            return Err(StockError::ConfigError(
                "subject_prefix_len must be greater than 0".to_string(),
            ));
        }

        if self.models.web_search.is_empty()
            || self.models.chat.is_empty()
            || self.models.reasoning.is_empty()
        {
            return Err(StockError::ConfigError("model ids must not be empty".to_string()));
        }

        Ok(())
    }
}

/// Builder for PipelineConfig
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    node_timeout: Option<Duration>,
    synthesis_timeout: Option<Duration>,
    drain_interval: Option<Duration>,
    join_grace: Option<Duration>,
    bar_count: Option<usize>,
    subject_prefix_len: Option<usize>,
    scenario_type: Option<i64>,
    database_path: Option<PathBuf>,
    hot_cache_ttl: Option<Duration>,
    web_search_limit: Option<u32>,
    reasoning_effort: Option<String>,
    models: Option<ModelIds>,
}

impl PipelineConfigBuilder {
    /// Set the fan-out node timeout
    pub fn node_timeout(mut self, duration: Duration) -> Self {
        self.node_timeout = Some(duration);
        self
    }

    /// Set the synthesis node timeout
    pub fn synthesis_timeout(mut self, duration: Duration) -> Self {
        self.synthesis_timeout = Some(duration);
        self
    }

    pub fn drain_interval(mut self, duration: Duration) -> Self {
        self.drain_interval = Some(duration);
        self
    }

    pub fn join_grace(mut self, duration: Duration) -> Self {
        self.join_grace = Some(duration);
        self
    }

    pub fn bar_count(mut self, count: usize) -> Self {
        self.bar_count = Some(count);
        self
    }

    pub fn subject_prefix_len(mut self, len: usize) -> Self {
        self.subject_prefix_len = Some(len);
        self
    }

    pub fn scenario_type(mut self, scenario: i64) -> Self {
        self.scenario_type = Some(scenario);
        self
    }

    /// Set the SQLite database file
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn hot_cache_ttl(mut self, duration: Duration) -> Self {
        self.hot_cache_ttl = Some(duration);
        self
    }

    pub fn web_search_limit(mut self, limit: u32) -> Self {
        self.web_search_limit = Some(limit);
        self
    }

    pub fn reasoning_effort(mut self, effort: impl Into<String>) -> Self {
        self.reasoning_effort = Some(effort.into());
        self
    }

    pub fn models(mut self, models: ModelIds) -> Self {
        self.models = Some(models);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<PipelineConfig> {
        let defaults = PipelineConfig::default();

        let config = PipelineConfig {
            node_timeout: self.node_timeout.unwrap_or(defaults.node_timeout),
            synthesis_timeout: self.synthesis_timeout.unwrap_or(defaults.synthesis_timeout),
            drain_interval: self.drain_interval.unwrap_or(defaults.drain_interval),
            join_grace: self.join_grace.unwrap_or(defaults.join_grace),
            bar_count: self.bar_count.unwrap_or(defaults.bar_count),
            subject_prefix_len: self.subject_prefix_len.unwrap_or(defaults.subject_prefix_len),
            scenario_type: self.scenario_type.unwrap_or(defaults.scenario_type),
            database_path: self.database_path.unwrap_or(defaults.database_path),
            hot_cache_ttl: self.hot_cache_ttl.unwrap_or(defaults.hot_cache_ttl),
            web_search_limit: self.web_search_limit.unwrap_or(defaults.web_search_limit),
            reasoning_effort: self.reasoning_effort.unwrap_or(defaults.reasoning_effort),
            models: self.models.unwrap_or(defaults.models),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.node_timeout, Duration::from_secs(60));
        assert_eq!(config.synthesis_timeout, Duration::from_secs(180));
        assert_eq!(config.drain_interval, Duration::from_millis(10));
        assert_eq!(config.bar_count, 20);
        assert_eq!(config.subject_prefix_len, 6);
        assert_eq!(config.scenario_type, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::builder()
            .node_timeout(Duration::from_secs(5))
            .bar_count(10)
            .database_path("/tmp/states.db")
            .build()
            .unwrap();

        assert_eq!(config.node_timeout, Duration::from_secs(5));
        assert_eq!(config.bar_count, 10);
        assert_eq!(config.database_path, PathBuf::from("/tmp/states.db"));
        assert_eq!(config.models, ModelIds::default());
    }

    #[test]
    fn test_validation_zero_timeout() {
        let config = PipelineConfig {
            synthesis_timeout: Duration::ZERO,
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_empty_model() {
        let result = PipelineConfig::builder()
            .models(ModelIds {
                reasoning: String::new(),
                ..ModelIds::default()
            })
            .build();

        assert!(matches!(result, Err(StockError::ConfigError(_))));
    }
}
