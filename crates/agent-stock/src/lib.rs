//! Streaming stock research pipeline
//!
//! This crate wires the generic streaming machinery of `agent-workflow` into
//! a multi-analyst research service:
//!
//! - Three analysis nodes (`fundamental_A`, `fundamental_B`, `emotional_A`)
//!   run concurrently and stream through one merged delivery sequence
//! - A `conclusion` node reasons over their outputs and a bar-by-bar
//!   description of recent prices
//! - A [`ResultCache`] in front of a SQLite [`StateStore`] replays finished
//!   results instead of recomputing them
//!
//! # Example
//!
//! ```rust,ignore
//! use agent_stock::{PipelineConfig, Providers, ResearchPipeline, SqliteStateStore, YahooBarSource};
//! use futures::StreamExt;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = PipelineConfig::default();
//! let store = Arc::new(SqliteStateStore::open_at(&config.database_path)?);
//! let pipeline = ResearchPipeline::new(
//!     config,
//!     Providers::from_env()?,
//!     Arc::new(YahooBarSource::new()),
//!     store,
//! )?;
//!
//! let mut lines = pipeline
//!     .handle("分析一下贵州茅台", "600519", "2025-03-07", CancellationToken::new())
//!     .await?;
//! while let Some(line) = lines.next().await {
//!     print!("{}", line.to_sse()?);
//! }
//! ```

pub mod agents;
pub mod api;
pub mod bars;
pub mod cache;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod request;
pub mod store;

// Re-export main types for convenience
pub use agents::{FAN_OUT_ORDER, Providers, ResearchTeam};
pub use api::YahooBarSource;
pub use bars::{PriceBar, PriceBarReference, PriceBarSource, describe_bars};
pub use cache::{CONCLUSION, ResultCache};
pub use config::{ModelIds, PipelineConfig};
pub use error::{Result, StockError};
pub use pipeline::ResearchPipeline;
pub use request::{IdempotencyKey, ResearchRequest, parse_as_of_date};
pub use store::{AggregatedState, SqliteStateStore, StateStore, StoredRecord};
