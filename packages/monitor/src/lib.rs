//! Mempool Monitor Library
//!
//! This crate watches pending transactions sent to a set of monitored contracts,
//! decodes their call data against the contracts' ABIs and annotates token
//! addresses with ERC20 metadata.

pub mod chain;
pub mod config;
pub mod decoder;
pub mod filter;
pub mod pipeline;
pub mod registry;
pub mod summary;
pub mod tokens;
pub mod transaction;

// Re-export commonly used types
pub use chain::{ChainClient, ChainError, RpcChainClient};
pub use config::{ChainConfig, Credentials, PipelineConfig};
pub use decoder::{decode_call, DecodedMethodCall, Enrichment};
pub use filter::{get_method_name, is_relevant, is_relevant_hex, MethodSelector};
pub use pipeline::{ListenerState, PipelineError, PipelineOutputs, ThroughputSample, TransactionPipeline};
pub use registry::{ContractDescriptor, ContractRegistry};
pub use summary::TransactionSummary;
pub use tokens::{TokenInfo, TokenResolver};
pub use transaction::TransactionRecord;
