//! Mempool Monitor
//!
//! Subscribes to pending transactions, keeps the ones sent to the monitored
//! contracts and prints summaries, decoded call data and throughput to stdout.
//! Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mempool_monitor::config::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_CONTRACTS_PATH, DEFAULT_MAX_IN_FLIGHT,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SHUTDOWN_GRACE_MS, DEFAULT_THROUGHPUT_INTERVAL_MS,
};
use mempool_monitor::{
    ChainConfig, ContractRegistry, Credentials, PipelineConfig, PipelineOutputs, RpcChainClient,
    TransactionPipeline,
};

#[derive(Parser, Debug)]
#[command(name = "mempool-monitor", version, about = "Watch pending transactions to monitored contracts")]
struct Cli {
    /// WebSocket endpoint for the pending transaction subscription
    #[arg(long, env = "WS_ENDPOINT")]
    ws_endpoint: String,

    /// HTTP endpoint for JSON-RPC calls
    #[arg(long, env = "HTTPS_ENDPOINT")]
    http_endpoint: String,

    /// Basic-auth username
    #[arg(long, env = "USERNAME")]
    username: Option<String>,

    /// Basic-auth password
    #[arg(long, env = "PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// JSON file listing the monitored contracts
    #[arg(long, env = "CONTRACTS_FILE", default_value = DEFAULT_CONTRACTS_PATH)]
    contracts: PathBuf,

    /// Print summaries as JSON lines
    #[arg(long)]
    json: bool,

    /// Skip ERC20 metadata lookups for address arrays
    #[arg(long)]
    no_token_enrichment: bool,

    #[arg(long, default_value_t = DEFAULT_THROUGHPUT_INTERVAL_MS)]
    throughput_interval_ms: u64,

    #[arg(long, default_value_t = DEFAULT_MAX_IN_FLIGHT)]
    max_in_flight: usize,

    #[arg(long, default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    channel_capacity: usize,

    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_MS)]
    request_timeout_ms: u64,

    #[arg(long, default_value_t = DEFAULT_SHUTDOWN_GRACE_MS)]
    shutdown_grace_ms: u64,
}

impl Cli {
    fn chain_config(&self) -> ChainConfig {
        let mut config = ChainConfig::new(&self.ws_endpoint, &self.http_endpoint);
        config.request_timeout_ms = self.request_timeout_ms;
        match credentials(self.username.as_deref(), self.password.as_deref()) {
            Some(credentials) => config.with_credentials(credentials),
            None => config,
        }
    }

    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            throughput_interval_ms: self.throughput_interval_ms,
            max_in_flight: self.max_in_flight,
            channel_capacity: self.channel_capacity,
            shutdown_grace_ms: self.shutdown_grace_ms,
            enrich_tokens: !self.no_token_enrichment,
        }
    }
}

/// Basic-auth credentials, only when both halves are present
fn credentials(username: Option<&str>, password: Option<&str>) -> Option<Credentials> {
    match (username, password) {
        (Some(username), Some(password)) => Some(Credentials::new(username, password)),
        (Some(_), None) => {
            warn!("USERNAME is set without PASSWORD, connecting without credentials");
            None
        }
        (None, Some(_)) => {
            warn!("PASSWORD is set without USERNAME, connecting without credentials");
            None
        }
        (None, None) => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let chain_config = cli.chain_config();
    chain_config.validate().context("invalid node configuration")?;
    let pipeline_config = cli.pipeline_config();

    let registry = ContractRegistry::load(&cli.contracts)
        .with_context(|| format!("failed to load contracts from {}", cli.contracts.display()))?;
    if registry.is_empty() {
        warn!("No monitored contracts configured, nothing will be decoded");
    }

    let client = Arc::new(RpcChainClient::new(chain_config).context("failed to create node client")?);
    let (pipeline, outputs) =
        TransactionPipeline::new(client, registry, pipeline_config).context("failed to build pipeline")?;

    let shutdown = CancellationToken::new();
    let printer = tokio::spawn(print_outputs(outputs, cli.json));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping gracefully"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
        signal_token.cancel();
    });

    info!("Monitoring pending transactions, press Ctrl+C to stop");
    let result = pipeline.run(shutdown).await;

    // The pipeline dropped its senders, the printer drains and exits
    if let Err(e) = printer.await {
        error!(error = %e, "Output printer task panicked");
    }

    match result {
        Ok(()) => {
            eprintln!("=== mempool monitor stopped ===");
            Ok(())
        }
        Err(e) => {
            eprintln!("=== mempool monitor stopped: {} ===", e);
            Err(e).context("pipeline stopped with an error")
        }
    }
}

/// Print every feed to stdout until all of them are closed
async fn print_outputs(outputs: PipelineOutputs, json: bool) {
    let PipelineOutputs {
        mut summaries,
        mut details,
        mut throughput,
        mut state,
    } = outputs;

    let mut summaries_open = true;
    let mut details_open = true;
    let mut throughput_open = true;
    let mut state_open = true;

    while summaries_open || details_open || throughput_open {
        tokio::select! {
            summary = summaries.recv(), if summaries_open => match summary {
                Some(summary) if json => match summary.to_json() {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!(error = %e, "Failed to serialize summary"),
                },
                Some(summary) => print!("{}", summary),
                None => summaries_open = false,
            },
            fragment = details.recv(), if details_open => match fragment {
                Some(fragment) => print!("{}", fragment),
                None => details_open = false,
            },
            sample = throughput.recv(), if throughput_open => match sample {
                Some(sample) => println!("{}", sample),
                None => throughput_open = false,
            },
            changed = state.changed(), if state_open => match changed {
                Ok(()) => {
                    let current = *state.borrow_and_update();
                    info!(state = %current, "Listener state changed");
                }
                Err(_) => state_open = false,
            },
        }
    }
}
