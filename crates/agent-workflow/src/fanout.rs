//! Parallel node launch and the merged delivery stream
//!
//! Every launched node gets a forwarding task that writes [`QueueRecord`]s
//! into the session's shared queue. [`SessionContext::merge`] is the only
//! reader: it forwards data lines in receipt order and ends once every
//! launched node has reported `end` or `error`, or the client disconnects.
//! [`SessionContext::teardown`] must run afterwards in every case.

use agent_core::{Error, Result, StreamingAgent, WireLine};
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default pause between queue drains (about 100 records per second)
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(10);

/// One record on the multiplex queue
#[derive(Debug, Clone)]
pub enum QueueRecord {
    /// A wire line produced by `node`
    Data { node: String, line: WireLine },
    /// `node` finished its stream
    End { node: String },
    /// `node` failed outside its own error handling
    Error { node: String, error: String },
}

/// Per-request state: disconnect signal, shared queue and launched tasks
///
/// Never shared across requests. Dropping it aborts any task still running.
pub struct SessionContext {
    id: Uuid,
    disconnect: CancellationToken,
    tx: Option<mpsc::UnboundedSender<QueueRecord>>,
    rx: mpsc::UnboundedReceiver<QueueRecord>,
    tasks: JoinSet<()>,
    launched: Vec<String>,
}

impl SessionContext {
    /// New session observing `disconnect`
    pub fn new(disconnect: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            id: Uuid::new_v4(),
            disconnect,
            tx: Some(tx),
            rx,
            tasks: JoinSet::new(),
            launched: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnect.is_cancelled()
    }

    pub fn disconnect_token(&self) -> &CancellationToken {
        &self.disconnect
    }

    /// Names of the launched nodes, in launch order
    pub fn launched(&self) -> &[String] {
        &self.launched
    }

    /// Number of node tasks not yet reaped
    pub fn running_tasks(&self) -> usize {
        self.tasks.len()
    }

    fn spawn_node(&mut self, node: Arc<dyn StreamingAgent>, input: String) -> Result<()> {
        let tx = self
            .tx
            .clone()
            .ok_or_else(|| Error::ProcessingFailed("session queue already merged".to_string()))?;
        self.launched.push(node.name().to_string());
        self.tasks.spawn(forward(node, input, tx));
        Ok(())
    }

    /// Merged delivery stream over every launched node
    ///
    /// Checks the disconnect signal before each drain and pauses
    /// `drain_interval` after each record.
    pub fn merge(&mut self, drain_interval: Duration) -> impl Stream<Item = WireLine> + Send + '_ {
        // Only the forwarding tasks keep the queue open from here on.
        self.tx.take();

        let Self {
            id,
            disconnect,
            rx,
            launched,
            ..
        } = self;
        let id = *id;
        let expected: HashSet<String> = launched.iter().cloned().collect();

        async_stream::stream! {
            let mut ended: HashSet<String> = HashSet::new();
            let mut forwarded = 0usize;

            while !expected.is_subset(&ended) {
                if disconnect.is_cancelled() {
                    info!(session = %id, forwarded, "client disconnected, stop forwarding");
                    break;
                }

                let record = tokio::select! {
                    biased;
                    () = disconnect.cancelled() => continue,
                    record = rx.recv() => record,
                };
                let Some(record) = record else {
                    debug!(session = %id, "all node tasks gone");
                    break;
                };

                match record {
                    QueueRecord::Data { line, .. } => {
                        forwarded += 1;
                        yield line;
                    }
                    QueueRecord::End { node } => {
                        debug!(session = %id, node = %node, "node ended");
                        ended.insert(node);
                    }
                    QueueRecord::Error { node, error } => {
                        warn!(session = %id, node = %node, error = %error, "node failed");
                        ended.insert(node);
                    }
                }

                tokio::time::sleep(drain_interval).await;
            }
        }
    }

    /// Cancel every node task and wait for all of them
    pub async fn teardown(&mut self) {
        self.tasks.abort_all();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                if !e.is_cancelled() {
                    warn!(session = %self.id, error = %e, "node task panicked");
                }
            }
        }
        debug!(session = %self.id, "session torn down");
    }
}

async fn forward(
    node: Arc<dyn StreamingAgent>,
    input: String,
    tx: mpsc::UnboundedSender<QueueRecord>,
) {
    let name = node.name().to_string();
    let mut lines = node.run(input);

    while let Some(item) = lines.next().await {
        let record = match item {
            Ok(line) => QueueRecord::Data {
                node: name.clone(),
                line,
            },
            Err(e) => {
                let _ = tx.send(QueueRecord::Error {
                    node: name,
                    error: e.to_string(),
                });
                return;
            }
        };
        if tx.send(record).is_err() {
            return;
        }
    }

    let _ = tx.send(QueueRecord::End { node: name });
}

/// Launches a fixed set of nodes into a session
pub struct FanOutCoordinator {
    nodes: Vec<Arc<dyn StreamingAgent>>,
}

impl FanOutCoordinator {
    /// Create a new coordinator builder
    pub fn builder() -> FanOutCoordinatorBuilder {
        FanOutCoordinatorBuilder::new()
    }

    /// Node names in launch order
    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name()).collect()
    }

    pub fn nodes(&self) -> &[Arc<dyn StreamingAgent>] {
        &self.nodes
    }

    /// Start every node on `input` inside `session`
    pub fn launch(&self, session: &mut SessionContext, input: &str) -> Result<()> {
        for node in &self.nodes {
            session.spawn_node(Arc::clone(node), input.to_string())?;
        }
        info!(session = %session.id(), nodes = self.nodes.len(), "fan-out launched");
        Ok(())
    }
}

/// Builder for [`FanOutCoordinator`]
#[derive(Default)]
pub struct FanOutCoordinatorBuilder {
    nodes: Vec<Arc<dyn StreamingAgent>>,
}

impl FanOutCoordinatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the fan-out
    pub fn add_node(mut self, node: Arc<dyn StreamingAgent>) -> Self {
        self.nodes.push(node);
        self
    }

    /// Build the coordinator; node names must be unique
    pub fn build(self) -> Result<FanOutCoordinator> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.name()) {
                return Err(Error::InitializationFailed(format!(
                    "duplicate node name '{}'",
                    node.name()
                )));
            }
        }
        Ok(FanOutCoordinator { nodes: self.nodes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{Envelope, NodeResult, Phase, WireStream};
    use async_trait::async_trait;
    use std::pin::pin;

    /// Agent that replays fixed lines, optionally failing or never ending
    struct ScriptedAgent {
        name: &'static str,
        data: usize,
        fail: bool,
        endless: bool,
    }

    impl ScriptedAgent {
        fn new(name: &'static str, data: usize) -> Arc<dyn StreamingAgent> {
            Arc::new(Self {
                name,
                data,
                fail: false,
                endless: false,
            })
        }

        fn failing(name: &'static str) -> Arc<dyn StreamingAgent> {
            Arc::new(Self {
                name,
                data: 0,
                fail: true,
                endless: false,
            })
        }

        fn endless(name: &'static str) -> Arc<dyn StreamingAgent> {
            Arc::new(Self {
                name,
                data: 0,
                fail: false,
                endless: true,
            })
        }
    }

    #[async_trait]
    impl StreamingAgent for ScriptedAgent {
        fn name(&self) -> &str {
            self.name
        }

        fn run(self: Arc<Self>, _input: String) -> WireStream {
            async_stream::stream! {
                if self.fail {
                    yield Err(Error::ProcessingFailed("boom".to_string()));
                }
                let mut index = 0u64;
                while !self.fail && (self.endless || index < self.data as u64) {
                    let envelope = Envelope::new(Phase::Output, "x").with_index(index);
                    yield Ok(WireLine::in_progress(self.name, envelope));
                    index += 1;
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            }
            .boxed()
        }

        async fn result(&self) -> NodeResult {
            NodeResult::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_nodes_with_one_failure() {
        let coordinator = FanOutCoordinator::builder()
            .add_node(ScriptedAgent::new("A", 2))
            .add_node(ScriptedAgent::failing("B"))
            .add_node(ScriptedAgent::new("C", 1))
            .build()
            .unwrap();
        let mut session = SessionContext::new(CancellationToken::new());
        coordinator.launch(&mut session, "input").unwrap();
        assert_eq!(session.launched(), ["A", "B", "C"]);

        let lines: Vec<WireLine> = session.merge(DEFAULT_DRAIN_INTERVAL).collect().await;
        session.teardown().await;

        assert_eq!(lines.len(), 3);
        assert_eq!(lines.iter().filter(|l| l.node == "A").count(), 2);
        assert_eq!(lines.iter().filter(|l| l.node == "C").count(), 1);
        assert_eq!(session.running_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_node_order_is_kept() {
        let coordinator = FanOutCoordinator::builder()
            .add_node(ScriptedAgent::new("A", 5))
            .add_node(ScriptedAgent::new("B", 5))
            .build()
            .unwrap();
        let mut session = SessionContext::new(CancellationToken::new());
        coordinator.launch(&mut session, "input").unwrap();

        let lines: Vec<WireLine> = session.merge(DEFAULT_DRAIN_INTERVAL).collect().await;
        session.teardown().await;

        for node in ["A", "B"] {
            let indices: Vec<u64> = lines
                .iter()
                .filter(|l| l.node == node)
                .map(|l| l.data.sequence_index)
                .collect();
            assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_forwarding() {
        let coordinator = FanOutCoordinator::builder()
            .add_node(ScriptedAgent::endless("A"))
            .add_node(ScriptedAgent::endless("B"))
            .build()
            .unwrap();
        let disconnect = CancellationToken::new();
        let mut session = SessionContext::new(disconnect.clone());
        coordinator.launch(&mut session, "input").unwrap();

        let mut received = 0;
        {
            let mut merged = pin!(session.merge(DEFAULT_DRAIN_INTERVAL));
            while merged.next().await.is_some() {
                received += 1;
                if received == 3 {
                    disconnect.cancel();
                }
            }
        }
        session.teardown().await;

        assert_eq!(received, 3);
        assert!(session.is_disconnected());
        assert_eq!(session.running_tasks(), 0);
    }

    #[tokio::test]
    async fn test_no_nodes_ends_immediately() {
        let mut session = SessionContext::new(CancellationToken::new());
        let lines: Vec<WireLine> = session.merge(DEFAULT_DRAIN_INTERVAL).collect().await;
        assert!(lines.is_empty());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = FanOutCoordinator::builder()
            .add_node(ScriptedAgent::new("A", 1))
            .add_node(ScriptedAgent::new("A", 1))
            .build();
        assert!(matches!(result, Err(Error::InitializationFailed(_))));
    }

    #[tokio::test]
    async fn test_launch_after_merge_fails() {
        let coordinator = FanOutCoordinator::builder()
            .add_node(ScriptedAgent::new("A", 1))
            .build()
            .unwrap();
        let mut session = SessionContext::new(CancellationToken::new());
        drop(session.merge(DEFAULT_DRAIN_INTERVAL));
        assert!(coordinator.launch(&mut session, "input").is_err());
    }
}
