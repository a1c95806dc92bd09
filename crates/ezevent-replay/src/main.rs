//! Replay harness for the EZEvent worker.
//!
//! Reads worker events as NDJSON, runs them through a [`WorkerHost`] whose
//! network is live HTTP and whose other capabilities are in memory, and
//! prints one JSON result line per event on stdout. Logs go to stderr.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ezevent_common::{init_logging, LogConfig, LogFormat};
use ezevent_net::{HttpConfig, HttpNetwork};
use ezevent_sw::memory::{LocalPushManager, MemoryPlatform, StaticToken};
use ezevent_sw::{
    EventOutcome, HostEvent, ServiceWorker, SwResult, WorkerConfig, WorkerEvent, WorkerHost,
};
use serde::Serialize;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(name = "ezevent-replay")]
#[command(about = "Replay service worker events against an EZEvent backend")]
struct Args {
    /// Worker config JSON; defaults apply when omitted
    #[arg(long)]
    config: Option<String>,

    /// NDJSON event log, `-` for stdin
    #[arg(long, default_value = "-")]
    events: String,

    /// Log format: pretty, compact or json
    #[arg(long, default_value = "compact")]
    log_format: LogFormat,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,

    /// Bearer token for the subscription endpoint
    #[arg(long, env = "EZEVENT_TOKEN")]
    token: Option<String>,

    /// Base endpoint for locally minted push subscriptions
    #[arg(long, default_value = "https://push.invalid/ezevent")]
    push_endpoint: String,
}

#[derive(Serialize)]
struct ReplayResult {
    line: usize,
    event: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<EventOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ReplayResult {
    fn new(line: usize, event: impl Into<String>, result: SwResult<EventOutcome>) -> Self {
        let event = event.into();
        match result {
            Ok(outcome) => Self {
                line,
                event,
                status: "ok",
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => Self {
                line,
                event,
                status: "error",
                outcome: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn emit(&self) -> Result<()> {
        println!("{}", serde_json::to_string(self)?);
        Ok(())
    }
}

fn read_events(source: &str) -> Result<Vec<(usize, WorkerEvent)>> {
    let reader: Box<dyn BufRead> = if source == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(source).with_context(|| format!("open event log {source}"))?;
        Box::new(BufReader::new(file))
    };

    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("read event log")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: WorkerEvent = serde_json::from_str(line)
            .with_context(|| format!("line {}: invalid event", index + 1))?;
        events.push((index + 1, event));
    }
    Ok(events)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_config = if args.verbose {
        LogConfig::debug()
    } else {
        LogConfig::default()
    };
    init_logging(log_config.with_format(args.log_format))?;

    let config = match args.config {
        Some(ref path) => WorkerConfig::load(path)?,
        None => WorkerConfig::default(),
    };
    let events = read_events(&args.events)?;
    info!(
        origin = %config.origin,
        cache = %config.cache_name(),
        events = events.len(),
        "Starting replay"
    );

    let network = HttpNetwork::new(HttpConfig::default())?;
    let mut memory = MemoryPlatform::new();
    memory.tokens = Arc::new(StaticToken::new(args.token.clone()));
    memory.push = Arc::new(LocalPushManager::new(args.push_endpoint.clone()));
    let platform = memory.platform_with_network(Arc::new(network));

    let (host, mut host_events) = WorkerHost::new(ServiceWorker::new(config, platform));
    let monitor = tokio::spawn(async move {
        while let Some(event) = host_events.recv().await {
            match event {
                HostEvent::StateChange { worker_id, new_state } => {
                    info!(?worker_id, state = ?new_state, "Worker state")
                }
                HostEvent::Settled { event, ok } => debug!(event, ok, "Event settled"),
            }
        }
    });

    let installed = host.install().await;
    let install_ok = installed.is_ok();
    ReplayResult::new(0, "install", installed).emit()?;
    if !install_ok {
        error!("Install failed, nothing to replay");
        host.shutdown().await;
        std::process::exit(1);
    }
    ReplayResult::new(0, "activate", host.activate().await).emit()?;

    let mut pending = Vec::with_capacity(events.len());
    for (line, event) in events {
        pending.push((line, host.dispatch(event).await));
    }
    host.wait_idle().await;

    let mut failures = 0usize;
    for (line, keep_alive) in pending {
        let event = keep_alive.event();
        let result = keep_alive.settled().await;
        if result.is_err() {
            failures += 1;
        }
        ReplayResult::new(line, event, result).emit()?;
    }

    host.shutdown().await;
    let _ = monitor.await;
    info!(failures, "Replay finished");
    Ok(())
}
