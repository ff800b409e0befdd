//! Request handling: idempotency gate, fan-out, synthesis, persistence
//!
//! [`ResearchPipeline::handle`] validates the request and consults the
//! [`ResultCache`]. A hit replays the stored texts without touching any
//! provider. A miss assembles a fresh [`ResearchTeam`], streams the merged
//! fan-out lines, then the conclusion, then the end-of-stream sentinel, and
//! finally persists the aggregate.

use agent_core::WireLine;
use agent_workflow::{ReferenceSource, SessionContext};
use chrono::Local;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::pin::pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::agents::{FAN_OUT_ORDER, Providers, ResearchTeam};
use crate::bars::{PriceBarReference, PriceBarSource};
use crate::cache::{CONCLUSION, ResultCache};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::prompts::Prompts;
use crate::request::ResearchRequest;
use crate::store::{AggregatedState, StateStore, StoredRecord};

/// Long-lived pipeline; one [`handle`](Self::handle) call per client request
pub struct ResearchPipeline {
    config: Arc<PipelineConfig>,
    providers: Providers,
    prompts: Arc<Prompts>,
    reference: Arc<dyn ReferenceSource>,
    cache: ResultCache,
}

impl ResearchPipeline {
    /// Wire the pipeline around injected collaborators
    pub fn new(
        config: PipelineConfig,
        providers: Providers,
        bars: Arc<dyn PriceBarSource>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self> {
        config.validate()?;
        let reference = Arc::new(PriceBarReference::new(bars, config.bar_count));
        let cache = ResultCache::new(store, config.hot_cache_ttl);
        Ok(Self {
            config: Arc::new(config),
            providers,
            prompts: Arc::new(Prompts::new()?),
            reference,
            cache,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Handle one request
    ///
    /// Fails only on invalid input. Everything after validation is reported
    /// inside the returned stream. Cancelling `disconnect` stops forwarding
    /// within one drain cycle and skips synthesis and persistence.
    #[instrument(skip(self, user_input, disconnect))]
    pub async fn handle(
        &self,
        user_input: &str,
        subject: &str,
        date: &str,
        disconnect: CancellationToken,
    ) -> Result<BoxStream<'static, WireLine>> {
        let request =
            ResearchRequest::parse(user_input, subject, date, self.config.subject_prefix_len)?;
        let key = request.key(self.config.scenario_type);

        if let Some(state) = self.cache.lookup(&key).await {
            return Ok(stream::iter(ResultCache::replay(&state, &FAN_OUT_ORDER)).boxed());
        }

        let team = ResearchTeam::assemble(
            &self.providers,
            &self.prompts,
            &self.config,
            Arc::clone(&self.reference),
            Local::now().date_naive(),
        )?;

        Ok(live(
            request,
            team,
            self.cache.clone(),
            Arc::clone(&self.config),
            disconnect,
        ))
    }
}

fn live(
    request: ResearchRequest,
    team: ResearchTeam,
    cache: ResultCache,
    config: Arc<PipelineConfig>,
    disconnect: CancellationToken,
) -> BoxStream<'static, WireLine> {
    async_stream::stream! {
        let mut emitted = 0u64;
        let mut session = SessionContext::new(disconnect.clone());
        info!(
            session = %session.id(),
            subject = %request.subject_id,
            date = %request.as_of_date,
            "no stored result, starting fan-out"
        );

        if let Err(e) = team.coordinator.launch(&mut session, &request.user_input) {
            error!(session = %session.id(), error = %e, "fan-out launch failed");
        }
        {
            let mut merged = pin!(session.merge(config.drain_interval));
            while let Some(line) = merged.next().await {
                emitted += 1;
                yield line;
            }
        }
        session.teardown().await;

        let mut connected = !disconnect.is_cancelled();
        let results = team.results().await;

        if connected {
            let lengths: Vec<(&str, usize)> = results
                .iter()
                .map(|(node, result)| (node.as_str(), result.output_text.chars().count()))
                .collect();
            info!(outputs = ?lengths, "fan-out finished");

            let mut lines = team.synthesis.run(&request.subject_id, results.clone());
            loop {
                let next = tokio::select! {
                    biased;
                    () = disconnect.cancelled() => None,
                    next = lines.next() => Some(next),
                };
                match next {
                    None => {
                        connected = false;
                        break;
                    }
                    Some(None) => break,
                    Some(Some(Ok(line))) => {
                        emitted += 1;
                        yield line;
                    }
                    Some(Some(Err(e))) => {
                        error!(node = CONCLUSION, error = %e, "synthesis failed");
                        break;
                    }
                }
            }
        }

        if connected {
            yield WireLine::end_of_stream(emitted);

            let conclusion = team.synthesis.result().await.output_text;
            let state = results
                .into_iter()
                .fold(AggregatedState::new(), |state, (node, result)| {
                    state.with_output(node, result.output_text)
                })
                .with_conclusion(conclusion);

            if state.has_content() {
                cache
                    .persist(StoredRecord::new(&request, config.scenario_type, state))
                    .await;
            } else {
                warn!(subject = %request.subject_id, "every node came back empty, nothing persisted");
            }
        } else {
            info!(subject = %request.subject_id, emitted, "client disconnected, result not persisted");
        }
    }
    .boxed()
}
