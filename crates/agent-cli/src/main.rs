//! Command-line interface for the stock research pipeline
//!
//! Runs one research request and writes the server-sent-event body to
//! stdout. Ctrl-C or a closed stdout counts as a client disconnect.

use agent_core::WireLine;
use agent_stock::{PipelineConfig, Providers, ResearchPipeline, SqliteStateStore, YahooBarSource};
use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "agent-cli")]
#[command(about = "Run one multi-analyst stock research request", long_about = None)]
struct Args {
    /// Free-text question for the analysts
    #[arg(short, long)]
    input: String,

    /// Subject id, e.g. 600519
    #[arg(short, long)]
    subject: String,

    /// As-of date (YYYY-MM-DD, YYYY/MM/DD, YYYYMMDD or RFC 3339)
    #[arg(short, long)]
    date: String,

    /// SQLite file holding finished results
    #[arg(long)]
    db: Option<PathBuf>,

    /// Write logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing .env is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let app = agent_utils::Config::from_env();
    agent_utils::init_tracing_with(app.log_filter.as_deref(), args.json_logs || app.json_logs);

    info!(app = %app.app_name, env = %app.environment, "Starting agent-cli");

    let mut config = PipelineConfig::builder();
    if let Some(db) = args.db {
        config = config.database_path(db);
    }
    let config = config.build()?;

    let store = SqliteStateStore::open_at(&config.database_path)
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;
    let pipeline = ResearchPipeline::new(
        config,
        Providers::from_env().context("Failed to configure providers")?,
        Arc::new(YahooBarSource::new()),
        Arc::new(store),
    )?;

    let disconnect = CancellationToken::new();
    let interrupt = tokio::spawn({
        let disconnect = disconnect.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, disconnecting");
                disconnect.cancel();
            }
        }
    });

    let lines = pipeline
        .handle(&args.input, &args.subject, &args.date, disconnect.clone())
        .await?;
    let written = write_sse(lines, tokio::io::stdout(), &disconnect).await;

    interrupt.abort();
    info!(written, "request finished");
    Ok(())
}

/// Write every line as an SSE frame; a failed write cancels `disconnect`
///
/// The stream is drained to its end either way so the pipeline can tear its
/// node tasks down.
async fn write_sse<S, W>(mut lines: S, mut out: W, disconnect: &CancellationToken) -> usize
where
    S: futures::Stream<Item = WireLine> + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    let mut open = true;

    while let Some(line) = lines.next().await {
        if !open {
            continue;
        }
        let result = match line.to_sse() {
            Ok(frame) => match out.write_all(frame.as_bytes()).await {
                Ok(()) => out.flush().await,
                Err(e) => Err(e),
            },
            Err(e) => {
                warn!(node = %line.node, error = %e, "failed to encode line, skipped");
                continue;
            }
        };
        match result {
            Ok(()) => written += 1,
            Err(e) => {
                warn!(error = %e, "client stream closed, disconnecting");
                disconnect.cancel();
                open = false;
            }
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{Envelope, Phase};
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    struct ClosedPipe;

    impl AsyncWrite for ClosedPipe {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn lines() -> Vec<WireLine> {
        vec![
            WireLine::in_progress("fundamental_A", Envelope::new(Phase::Output, "稳健")),
            WireLine::end_of_stream(1),
        ]
    }

    #[tokio::test]
    async fn test_sse_frames_written() {
        let mut out = Vec::new();
        let disconnect = CancellationToken::new();

        let written = write_sse(futures::stream::iter(lines()), &mut out, &disconnect).await;

        assert_eq!(written, 2);
        let body = String::from_utf8(out).unwrap();
        assert!(body.starts_with("data: {\"node\":\"fundamental_A\""));
        assert_eq!(body.matches("\n\n").count(), 2);
        assert!(!disconnect.is_cancelled());
    }

    #[tokio::test]
    async fn test_closed_stdout_disconnects() {
        let disconnect = CancellationToken::new();

        let written = write_sse(futures::stream::iter(lines()), ClosedPipe, &disconnect).await;

        assert_eq!(written, 0);
        assert!(disconnect.is_cancelled());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "agent-cli", "--input", "分析", "--subject", "600519", "--date", "2025-03-07",
            "--json-logs",
        ]);
        assert_eq!(args.subject, "600519");
        assert!(args.json_logs);
        assert!(args.db.is_none());
    }
}
