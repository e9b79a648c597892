//! Chain Client
//!
//! Boundary to the blockchain node: a pending-transaction subscription over WebSocket
//! and JSON-RPC request/response calls over HTTP, both carrying basic-auth credentials.

use std::future::Future;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, TxHash, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider, WsConnect};
use alloy::pubsub::PubSubFrontend;
use alloy::transports::http::{Client, Http};
use alloy::transports::Authorization;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::ChainConfig;
use crate::transaction::TransactionRecord;

/// Stream of pending transaction hashes
pub type PendingTxStream = BoxStream<'static, Result<TxHash, ChainError>>;

/// Errors that can occur while talking to the node
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Stream read failed: {0}")]
    StreamRead(String),
}

/// Capabilities the pipeline needs from a node
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Open the `newPendingTransactions` subscription
    async fn subscribe_pending(&self) -> Result<PendingTxStream, ChainError>;

    /// Close the subscription opened by [`ChainClient::subscribe_pending`]
    ///
    /// Dropping the stream only stops local delivery; this tells the node to
    /// stop pushing notifications. A no-op when nothing is subscribed.
    async fn unsubscribe_pending(&self) -> Result<(), ChainError>;

    /// Fetch the full record for a transaction hash (`eth_getTransactionByHash`)
    ///
    /// Returns `None` when the node no longer knows the transaction.
    async fn transaction_by_hash(&self, hash: TxHash)
        -> Result<Option<TransactionRecord>, ChainError>;

    /// Read-only contract call (`eth_call` against the latest block)
    ///
    /// Returns the raw `0x`-prefixed result string.
    async fn call(&self, to: Address, data: Bytes) -> Result<String, ChainError>;
}

/// Node client backed by alloy WebSocket and HTTP providers
pub struct RpcChainClient {
    config: ChainConfig,
    http: RootProvider<Http<Client>>,
    /// WebSocket provider, dialed on subscribe and kept alive with the client
    ws: Mutex<Option<RootProvider<PubSubFrontend>>>,
    /// Id of the open `newPendingTransactions` subscription
    subscription: Mutex<Option<B256>>,
}

impl RpcChainClient {
    /// Create a client; the HTTP side is ready immediately, the WebSocket side
    /// is dialed by [`ChainClient::subscribe_pending`]
    pub fn new(config: ChainConfig) -> Result<Self, ChainError> {
        let mut http_url = config
            .http_url()
            .map_err(|e| ChainError::InvalidEndpoint(e.to_string()))?;

        if let Some(credentials) = &config.credentials {
            // reqwest turns URL userinfo into a basic-auth header
            http_url
                .set_username(&credentials.username)
                .and_then(|_| http_url.set_password(Some(&credentials.password)))
                .map_err(|_| {
                    ChainError::InvalidEndpoint("HTTP endpoint cannot carry credentials".to_string())
                })?;
        }

        let http = ProviderBuilder::new().on_http(http_url);

        Ok(Self {
            config,
            http,
            ws: Mutex::new(None),
            subscription: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, ChainError>
    where
        F: Future<Output = Result<T, ChainError>>,
    {
        bounded(self.config.request_timeout(), fut).await
    }

    async fn connect_ws(&self) -> Result<RootProvider<PubSubFrontend>, ChainError> {
        let url = self
            .config
            .ws_url()
            .map_err(|e| ChainError::InvalidEndpoint(e.to_string()))?;

        info!("Connecting to WebSocket endpoint {}", redact(url.as_str()));

        let mut connect = WsConnect::new(url.to_string());
        if let Some(credentials) = &self.config.credentials {
            connect = connect.with_auth(Authorization::basic(
                &credentials.username,
                &credentials.password,
            ));
        }

        let provider = self
            .with_timeout(async {
                ProviderBuilder::new()
                    .on_ws(connect)
                    .await
                    .map_err(|e| ChainError::ConnectionFailed(e.to_string()))
            })
            .await?;

        info!("Successfully connected to WebSocket endpoint");
        Ok(provider)
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn subscribe_pending(&self) -> Result<PendingTxStream, ChainError> {
        let mut guard = self.ws.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect_ws().await?);
        }
        let Some(provider) = guard.as_ref() else {
            return Err(ChainError::ConnectionFailed("WebSocket provider unavailable".to_string()));
        };

        let subscription = self
            .with_timeout(async {
                provider
                    .subscribe_pending_transactions()
                    .await
                    .map_err(|e| ChainError::SubscriptionFailed(e.to_string()))
            })
            .await?;

        *self.subscription.lock().await = Some(*subscription.local_id());
        info!("Subscribed to newPendingTransactions");
        Ok(subscription.into_stream().map(Ok).boxed())
    }

    async fn unsubscribe_pending(&self) -> Result<(), ChainError> {
        let Some(id) = self.subscription.lock().await.take() else {
            return Ok(());
        };
        let guard = self.ws.lock().await;
        let Some(provider) = guard.as_ref() else {
            return Ok(());
        };

        provider
            .unsubscribe(id)
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        info!("Closed newPendingTransactions subscription");
        Ok(())
    }

    async fn transaction_by_hash(
        &self,
        hash: TxHash,
    ) -> Result<Option<TransactionRecord>, ChainError> {
        debug!(hash = %hash, "eth_getTransactionByHash");
        self.with_timeout(async {
            self.http
                .raw_request::<_, Option<TransactionRecord>>(
                    "eth_getTransactionByHash".into(),
                    (hash,),
                )
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))
        })
        .await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<String, ChainError> {
        let request = json!({ "to": to, "data": data });
        self.with_timeout(async {
            self.http
                .raw_request::<_, String>("eth_call".into(), (request, "latest"))
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))
        })
        .await
    }
}

/// Run a request future with an upper bound on its duration
pub async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, ChainError>
where
    F: Future<Output = Result<T, ChainError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ChainError::Timeout(limit.as_millis() as u64)),
    }
}

/// Strip userinfo and query from an endpoint before it is logged
pub fn redact(endpoint: &str) -> String {
    let without_query = endpoint.split('?').next().unwrap_or(endpoint);
    match without_query.split_once("://") {
        Some((scheme, rest)) => match rest.rsplit_once('@') {
            Some((_, host)) => format!("{}://{}", scheme, host),
            None => without_query.to_string(),
        },
        None => without_query.to_string(),
    }
}
