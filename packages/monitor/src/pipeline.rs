//! Transaction Pipeline
//!
//! Owns the pending-transaction subscription. Every notification is dispatched
//! to its own task which fetches the full record, applies the selector filter,
//! matches the recipient against the registry and decodes the call. A ticker
//! task of its own samples the throughput counter, so a saturated worker pool
//! never delays a sample.
//!
//! State machine of the listener:
//! `Disconnected -> Connecting -> Subscribed -> Streaming -> Closed`, falling
//! back to `Disconnected` when the subscription cannot be opened.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::TxHash;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::chain::{ChainClient, ChainError};
use crate::config::{ConfigError, PipelineConfig};
use crate::decoder::{decode_call, header_fragments, render_param, DecodeError, Enrichment};
use crate::filter::is_relevant;
use crate::registry::ContractRegistry;
use crate::summary::TransactionSummary;
use crate::tokens::TokenResolver;

/// Errors that stop the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to open pending transaction subscription: {0}")]
    Subscribe(#[source] ChainError),

    #[error("Subscription stream failed: {0}")]
    StreamRead(#[source] ChainError),

    #[error("Subscription stream ended")]
    StreamEnded,

    #[error("Invalid pipeline configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Lifecycle of the subscription listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Disconnected,
    Connecting,
    Subscribed,
    Streaming,
    Closed,
}

impl ListenerState {
    /// True once the listener has stopped for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, ListenerState::Closed | ListenerState::Disconnected)
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListenerState::Disconnected => "disconnected",
            ListenerState::Connecting => "connecting",
            ListenerState::Subscribed => "subscribed",
            ListenerState::Streaming => "streaming",
            ListenerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Transactions fetched during one sampling window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputSample {
    pub count: u64,
    pub window: Duration,
}

impl fmt::Display for ThroughputSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TPS: {}", self.count)
    }
}

/// Monotonic fetch counter, read-and-reset once per window
#[derive(Debug, Default)]
pub struct ThroughputCounter {
    count: AtomicU64,
}

impl ThroughputCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn current(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Read the count and start a new window at zero
    pub fn take(&self) -> u64 {
        self.count.swap(0, Ordering::AcqRel)
    }
}

/// Receiving ends of the pipeline feeds
pub struct PipelineOutputs {
    /// One summary per matched transaction
    pub summaries: mpsc::Receiver<TransactionSummary>,
    /// Decoded call fragments, emitted as produced
    pub details: mpsc::Receiver<String>,
    /// One sample per throughput window
    pub throughput: mpsc::Receiver<ThroughputSample>,
    /// Current listener state
    pub state: watch::Receiver<ListenerState>,
}

/// Feeds written by per-transaction tasks
#[derive(Clone)]
struct FeedSenders {
    summaries: mpsc::Sender<TransactionSummary>,
    details: mpsc::Sender<String>,
}

/// Everything a per-transaction task needs
pub struct PipelineContext<C> {
    client: Arc<C>,
    registry: Arc<ContractRegistry>,
    tokens: Arc<TokenResolver<C>>,
    counter: ThroughputCounter,
    enrich_tokens: bool,
}

impl<C: ChainClient> PipelineContext<C> {
    pub fn new(client: Arc<C>, registry: Arc<ContractRegistry>, enrich_tokens: bool) -> Self {
        let tokens = Arc::new(TokenResolver::new(Arc::clone(&client)));
        Self {
            client,
            registry,
            tokens,
            counter: ThroughputCounter::new(),
            enrich_tokens,
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    pub fn tokens(&self) -> &TokenResolver<C> {
        &self.tokens
    }

    pub fn counter(&self) -> &ThroughputCounter {
        &self.counter
    }

    pub fn enrichment(&self) -> Enrichment<'_> {
        if self.enrich_tokens {
            Enrichment::Tokens(self.tokens.as_ref())
        } else {
            Enrichment::Disabled
        }
    }

    /// Fetch, filter, match and decode a single notification
    async fn process(&self, hash: TxHash, feeds: &FeedSenders) {
        let record = match self.client.transaction_by_hash(hash).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(hash = %hash, "Transaction not found");
                return;
            }
            Err(e) => {
                warn!(hash = %hash, error = %e, "Failed to fetch transaction");
                return;
            }
        };
        self.counter.record();

        if !is_relevant(&record.input) {
            return;
        }
        let Some(contract) = self.registry.match_recipient(record.to) else {
            debug!(hash = %hash, "Recipient is not a monitored contract");
            return;
        };

        let summary = TransactionSummary::from_record(&contract.name, &record);
        if feeds.summaries.send(summary).await.is_err() {
            return;
        }

        let call = match decode_call(&record.input, contract) {
            Ok(call) => call,
            Err(DecodeError::MethodNotFound(selector)) => {
                warn!(
                    hash = %hash,
                    contract = %contract.name,
                    selector = %hex::encode(selector),
                    "Method not found in contract ABI"
                );
                return;
            }
            Err(e) => {
                warn!(hash = %hash, contract = %contract.name, error = %e, "Failed to decode call data");
                return;
            }
        };

        for fragment in header_fragments(record.hash, &call.name) {
            if feeds.details.send(fragment).await.is_err() {
                return;
            }
        }

        let enrichment = self.enrichment();
        for param in &call.params {
            let fragment = render_param(param, enrichment).await;
            if feeds.details.send(fragment).await.is_err() {
                return;
            }
        }
    }
}

/// Send one throughput sample per window until `stop` fires
async fn report_throughput<C: ChainClient>(
    context: Arc<PipelineContext<C>>,
    feed: mpsc::Sender<ThroughputSample>,
    period: Duration,
    stop: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let sample = ThroughputSample {
                    count: context.counter.take(),
                    window: period,
                };
                if feed.try_send(sample).is_err() {
                    debug!(count = sample.count, "Throughput sample dropped");
                }
            }
        }
    }
}

/// The pending-transaction pipeline
pub struct TransactionPipeline<C> {
    context: Arc<PipelineContext<C>>,
    config: PipelineConfig,
    feeds: FeedSenders,
    throughput: mpsc::Sender<ThroughputSample>,
    state: watch::Sender<ListenerState>,
}

impl<C: ChainClient> TransactionPipeline<C> {
    /// Create a pipeline together with the receiving ends of its feeds
    pub fn new(
        client: Arc<C>,
        registry: ContractRegistry,
        config: PipelineConfig,
    ) -> Result<(Self, PipelineOutputs), PipelineError> {
        config.validate()?;

        let (summaries_tx, summaries_rx) = mpsc::channel(config.channel_capacity);
        let (details_tx, details_rx) = mpsc::channel(config.channel_capacity);
        let (throughput_tx, throughput_rx) = mpsc::channel(config.channel_capacity);
        let (state_tx, state_rx) = watch::channel(ListenerState::Disconnected);

        let context = Arc::new(PipelineContext::new(
            client,
            Arc::new(registry),
            config.enrich_tokens,
        ));

        let pipeline = Self {
            context,
            config,
            feeds: FeedSenders {
                summaries: summaries_tx,
                details: details_tx,
            },
            throughput: throughput_tx,
            state: state_tx,
        };
        let outputs = PipelineOutputs {
            summaries: summaries_rx,
            details: details_rx,
            throughput: throughput_rx,
            state: state_rx,
        };
        Ok((pipeline, outputs))
    }

    pub fn context(&self) -> &Arc<PipelineContext<C>> {
        &self.context
    }

    /// Run until cancelled or until the subscription fails
    ///
    /// Returns `Ok(())` on cancellation. The subscription is closed on the node,
    /// then in-flight tasks get the configured grace period to deliver their
    /// output; whatever is still running after that is abandoned.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), PipelineError> {
        self.state.send_replace(ListenerState::Connecting);

        let mut stream = match self.context.client.subscribe_pending().await {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "Failed to subscribe to pending transactions");
                self.state.send_replace(ListenerState::Disconnected);
                return Err(PipelineError::Subscribe(e));
            }
        };
        self.state.send_replace(ListenerState::Subscribed);
        info!(
            contracts = self.context.registry.len(),
            enrich_tokens = self.config.enrich_tokens,
            "Listening for pending transactions"
        );

        // Cancelled only once the grace period has run out
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let permits = Arc::new(Semaphore::new(self.config.max_in_flight));

        let ticker_stop = CancellationToken::new();
        let ticker = tokio::spawn(report_throughput(
            Arc::clone(&self.context),
            self.throughput.clone(),
            self.config.throughput_interval(),
            ticker_stop.clone(),
        ));

        self.state.send_replace(ListenerState::Streaming);

        let outcome = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Cancellation requested, stopping listener");
                    break Ok(());
                }
                notification = stream.next() => match notification {
                    Some(Ok(hash)) => {
                        let permit = tokio::select! {
                            _ = cancel.cancelled() => break Ok(()),
                            permit = Arc::clone(&permits).acquire_owned() => match permit {
                                Ok(permit) => permit,
                                Err(_) => break Ok(()),
                            },
                        };

                        let context = Arc::clone(&self.context);
                        let feeds = self.feeds.clone();
                        let shutdown = shutdown.clone();
                        tracker.spawn(async move {
                            let _permit = permit;
                            tokio::select! {
                                _ = shutdown.cancelled() => {
                                    debug!(hash = %hash, "Transaction abandoned at shutdown");
                                }
                                _ = context.process(hash, &feeds) => {}
                            }
                        });
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Pending transaction stream failed");
                        break Err(PipelineError::StreamRead(e));
                    }
                    None => {
                        error!("Pending transaction stream ended");
                        break Err(PipelineError::StreamEnded);
                    }
                },
            }
        };

        ticker_stop.cancel();
        if let Err(e) = ticker.await {
            warn!(error = %e, "Throughput ticker task failed");
        }

        drop(stream);
        if let Err(e) = self.context.client.unsubscribe_pending().await {
            warn!(error = %e, "Failed to close pending transaction subscription");
        }

        tracker.close();
        if tokio::time::timeout(self.config.shutdown_grace(), tracker.wait())
            .await
            .is_err()
        {
            warn!(in_flight = tracker.len(), "Shutdown grace period elapsed with work in flight");
            shutdown.cancel();
            tracker.wait().await;
        }

        self.state.send_replace(ListenerState::Closed);
        info!("Transaction pipeline stopped");
        outcome
    }
}
