//! pulseweave: run the task processor over stdin / stdout.
//!
//! Each stdin line is one client request (JSON). Every outbound message,
//! direct replies and lifecycle notifications alike, is written to stdout as
//! one JSON line. On EOF the process waits for active tasks, then shuts down.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

use pulseweave_core::app::{TaskManager, TaskProcessor, handle_message};
use pulseweave_core::config::PulseConfig;
use pulseweave_core::domain::ServerMessage;
use pulseweave_core::impls::{ChannelSink, KeywordPredictor};
use pulseweave_core::ports::{DeliverySink, Predictor};

const DRAIN_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Parser)]
#[command(name = "pulseweave", version, about = "Async inference task queue over stdin/stdout")]
struct Args {
    /// Path to a TOML config file (falls back to $PULSEWEAVE_CONFIG).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the number of workers.
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = PulseConfig::load(args.config.as_deref()).context("failed to load config")?;
    if let Some(workers) = args.workers {
        config.workers.count = workers;
    }

    let predictor = build_predictor(&config)?;
    let manager = Arc::new(TaskManager::new());
    let processor = TaskProcessor::start(Arc::clone(&manager), predictor, &config);

    let (sink, rx) = ChannelSink::new();
    let sink = Arc::new(sink);
    let writer = tokio::spawn(write_messages(rx));
    let connection_id = manager.connect(Arc::clone(&sink) as Arc<dyn DeliverySink>).await;

    let interrupted = tokio::select! {
        res = read_requests(&manager, connection_id, &sink) => {
            res?;
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };

    if !interrupted {
        tokio::select! {
            _ = drain(&manager) => {}
            _ = tokio::signal::ctrl_c() => tracing::info!("interrupted while draining"),
        }
    } else {
        tracing::info!("interrupted");
    }

    processor.stop().await;
    manager.disconnect(connection_id).await;

    // Last sender gone: the writer flushes what is left and exits.
    drop(sink);
    writer.await.context("stdout writer failed")??;
    Ok(())
}

fn build_predictor(config: &PulseConfig) -> Result<Arc<dyn Predictor>> {
    match config.predictor.name.as_str() {
        "keyword" => Ok(Arc::new(KeywordPredictor::with_latency(config.predictor.latency()))),
        other => bail!("unknown predictor: {other}"),
    }
}

async fn read_requests(
    manager: &TaskManager,
    connection_id: pulseweave_core::domain::ConnectionId,
    sink: &ChannelSink,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(reply) = handle_message(manager, connection_id, line).await
            && let Err(e) = sink.deliver(&reply).await
        {
            tracing::warn!(error = %e, "failed to queue reply");
        }
    }
    tracing::info!("stdin closed");
    Ok(())
}

/// Wait until no task is Pending or Processing.
async fn drain(manager: &TaskManager) {
    loop {
        let stats = manager.get_stats().await;
        if stats.active == 0 {
            break;
        }
        tracing::debug!(active = stats.active, "waiting for tasks to finish");
        tokio::time::sleep(DRAIN_POLL).await;
    }
}

async fn write_messages(mut rx: UnboundedReceiver<ServerMessage>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(message) = rx.recv().await {
        let mut line = serde_json::to_vec(&message).context("failed to encode message")?;
        line.push(b'\n');
        stdout.write_all(&line).await?;
        stdout.flush().await?;
    }
    Ok(())
}
