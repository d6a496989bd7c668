//! Drives STORED transfers to settlement on the destination chain.

mod processor;
mod registry;
mod vault;

pub use processor::{run_processor, CycleReport, SettlementOutcome, SettlementProcessor};
pub use registry::{AcquireError, CycleGuard, InFlightGuard, InFlightRegistry};
pub use vault::Web3SettlementContract;

use crate::error::RelayError;
use futures_util::future::BoxFuture;
use web3::types::{Address, H256};

/// Messages the vault and nodes use when the transfer was processed before
const DUPLICATE_MARKERS: [&str; 3] = ["duplicate", "already processed", "already acknowledged"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("duplicate settlement: {0}")]
    Duplicate(String),
    #[error("settlement transaction {tx_hash:#x} reverted")]
    Reverted {
        tx_hash: H256,
        from: Address,
        block_number: Option<u64>,
    },
    #[error("settlement submission failed: {0}")]
    Transient(String),
}

impl SubmitError {
    /// Duplicate when the message carries a known marker, transient otherwise
    pub fn classify(message: &str) -> SubmitError {
        let lower = message.to_lowercase();
        if DUPLICATE_MARKERS.iter().any(|marker| lower.contains(marker)) {
            SubmitError::Duplicate(message.to_string())
        } else {
            SubmitError::Transient(message.to_string())
        }
    }
}

/// Successfully included settlement transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementInclusion {
    pub tx_hash: H256,
    pub from: Address,
    pub block_number: Option<u64>,
}

/// The privileged destination contract operation and its authoritative flag
pub trait SettlementContract: Send + Sync {
    fn chain_id(&self) -> i64;

    fn is_settled(&self, transfer_id: H256) -> BoxFuture<'_, Result<bool, RelayError>>;

    /// Sends the settlement and waits for inclusion
    fn submit(&self, transfer_id: H256) -> BoxFuture<'_, Result<SettlementInclusion, SubmitError>>;
}
