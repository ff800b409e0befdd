//! Thread-to-async adapter for blocking vendor calls
//!
//! A [`StreamBridge`] runs one blocking call on a dedicated worker thread. The
//! worker pushes every raw event into an unbounded channel; the async side
//! reads it with a per-retrieval timeout. The consumer sees exactly one
//! terminal item per invocation: [`BridgeEvent::Done`] or
//! [`BridgeEvent::Failed`].
//!
//! Once the consumer stops reading (terminal item, timeout, or the stream is
//! dropped) the receiver is gone and the worker's next send fails, which ends
//! its loop. The worker is joined if it finishes within the grace period and
//! is abandoned otherwise.

use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::provider::EventIter;
use crate::{LLMError, Result};

/// Item delivered by a bridge
#[derive(Debug)]
pub enum BridgeEvent {
    /// Raw provider event
    Event(Value),
    /// The vendor stream ended normally
    Done,
    /// The call failed, timed out or the worker died
    Failed(LLMError),
}

impl BridgeEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Event(_))
    }
}

/// Runs blocking vendor calls on worker threads
#[derive(Debug, Clone)]
pub struct StreamBridge {
    name: String,
    timeout: Duration,
    join_grace: Duration,
}

impl StreamBridge {
    /// Default per-retrieval timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Default wait for the worker after the consumer stops
    pub const DEFAULT_JOIN_GRACE: Duration = Duration::from_millis(100);

    /// Bridge whose worker threads are named after `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout: Self::DEFAULT_TIMEOUT,
            join_grace: Self::DEFAULT_JOIN_GRACE,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_join_grace(mut self, grace: Duration) -> Self {
        self.join_grace = grace;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start `call` on a worker thread and stream its events
    pub fn spawn<F>(&self, call: F) -> BoxStream<'static, BridgeEvent>
    where
        F: FnOnce() -> Result<EventIter> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (finished_tx, finished_rx) = oneshot::channel::<()>();

        let spawned = std::thread::Builder::new()
            .name(format!("bridge-{}", self.name))
            .spawn(move || {
                run_worker(call, &tx);
                let _ = finished_tx.send(());
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                let event = BridgeEvent::Failed(LLMError::WorkerFailed(e.to_string()));
                return futures::stream::once(async move { event }).boxed();
            }
        };

        let timeout = self.timeout;
        let grace = self.join_grace;
        let name = self.name.clone();

        async_stream::stream! {
            loop {
                match tokio::time::timeout(timeout, rx.recv()).await {
                    Ok(Some(event)) => {
                        let terminal = event.is_terminal();
                        yield event;
                        if terminal {
                            break;
                        }
                    }
                    Ok(None) => {
                        warn!(bridge = %name, "worker exited without a terminal event");
                        yield BridgeEvent::Failed(LLMError::WorkerFailed(
                            "worker exited without a terminal event".to_string(),
                        ));
                        break;
                    }
                    Err(_) => {
                        warn!(bridge = %name, ?timeout, "no event within retrieval timeout");
                        yield BridgeEvent::Failed(LLMError::Timeout(timeout));
                        break;
                    }
                }
            }

            drop(rx);
            join_worker(handle, finished_rx, grace, &name).await;
        }
        .boxed()
    }
}

fn run_worker<F>(call: F, tx: &mpsc::UnboundedSender<BridgeEvent>)
where
    F: FnOnce() -> Result<EventIter>,
{
    let events = match call() {
        Ok(events) => events,
        Err(e) => {
            let _ = tx.send(BridgeEvent::Failed(e));
            return;
        }
    };

    for item in events {
        let event = match item {
            Ok(raw) => BridgeEvent::Event(raw),
            Err(e) => {
                let _ = tx.send(BridgeEvent::Failed(e));
                return;
            }
        };
        if tx.send(event).is_err() {
            debug!("bridge consumer gone, stopping worker");
            return;
        }
    }

    let _ = tx.send(BridgeEvent::Done);
}

async fn join_worker(
    handle: JoinHandle<()>,
    finished: oneshot::Receiver<()>,
    grace: Duration,
    name: &str,
) {
    // A dropped sender also means the thread is unwinding or gone.
    if tokio::time::timeout(grace, finished).await.is_err() {
        debug!(bridge = %name, ?grace, "worker still running, abandoning it");
        return;
    }
    if let Ok(Err(_)) = tokio::task::spawn_blocking(move || handle.join()).await {
        warn!(bridge = %name, "worker thread panicked");
    }
}
