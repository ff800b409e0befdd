//! Streaming agent trait

use crate::{NodeResult, Result, WireLine};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Stream of wire lines produced by one agent run
///
/// An `Err` item means the agent itself failed; the stream ends after it.
pub type WireStream = BoxStream<'static, Result<WireLine>>;

/// An independently running analysis unit that streams its output
///
/// Implementations own their [`NodeResult`] and only update it from the
/// stream returned by [`StreamingAgent::run`]. The result is final once the
/// stream has ended.
#[async_trait]
pub trait StreamingAgent: Send + Sync {
    /// Node name used on every wire line
    fn name(&self) -> &str;

    /// Start the agent on the given input
    fn run(self: Arc<Self>, input: String) -> WireStream;

    /// Snapshot of the accumulated result
    async fn result(&self) -> NodeResult;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Envelope, NodeStatus, Phase};
    use futures::StreamExt;
    use tokio::sync::Mutex;

    struct EchoAgent {
        result: Mutex<NodeResult>,
    }

    #[async_trait]
    impl StreamingAgent for EchoAgent {
        fn name(&self) -> &str {
            "echo"
        }

        fn run(self: Arc<Self>, input: String) -> WireStream {
            Box::pin(async_stream_like(self, input))
        }

        async fn result(&self) -> NodeResult {
            self.result.lock().await.clone()
        }
    }

    fn async_stream_like(
        agent: Arc<EchoAgent>,
        input: String,
    ) -> impl futures::Stream<Item = Result<WireLine>> {
        futures::stream::once(async move {
            *agent.result.lock().await =
                NodeResult::finalize(&[] as &[&str], &[input.as_str()], NodeStatus::Ok);
            Ok(WireLine::done("echo", Envelope::new(Phase::Done, input)))
        })
    }

    #[tokio::test]
    async fn test_trait_object_run() {
        let agent = Arc::new(EchoAgent {
            result: Mutex::new(NodeResult::default()),
        });
        let dyn_agent: Arc<dyn StreamingAgent> = agent.clone();

        let lines: Vec<_> = dyn_agent.clone().run("hi".to_string()).collect().await;
        assert_eq!(lines.len(), 1);
        assert_eq!(dyn_agent.result().await.output_text, "hi");
        assert_eq!(dyn_agent.name(), "echo");
    }
}
