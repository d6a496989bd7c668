use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Display;
use std::str::FromStr;

/// Lifecycle of a transfer, ordered so that `max` picks the furthest state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Pending,
    Stored,
    Acknowledged,
    Completed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Stored => "STORED",
            TransferStatus::Acknowledged => "ACKNOWLEDGED",
            TransferStatus::Completed => "COMPLETED",
        }
    }

    pub fn all() -> [TransferStatus; 4] {
        [
            TransferStatus::Pending,
            TransferStatus::Stored,
            TransferStatus::Acknowledged,
            TransferStatus::Completed,
        ]
    }
}

impl Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(TransferStatus::Pending),
            "STORED" => Ok(TransferStatus::Stored),
            "ACKNOWLEDGED" => Ok(TransferStatus::Acknowledged),
            "COMPLETED" => Ok(TransferStatus::Completed),
            _ => Err(format!("Unknown transfer status: {s}")),
        }
    }
}

#[derive(Serialize, sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferDbObj {
    pub transfer_id: String,
    /// zero id until resolved
    pub deposit_id: String,
    /// zero address until resolved
    pub sender: String,
    pub destination_domain: i64,
    /// None marks a placeholder created from the destination chain
    pub encrypted_data_hash: Option<String>,
    pub initiated_at: DateTime<Utc>,
    pub initiated_at_block: i64,
    pub initiated_tx_hash: String,
    pub receiver: Option<String>,
    pub token: Option<String>,
    pub amount: Option<String>,
    pub is_native: Option<bool>,
    pub status: String,
    pub stored_at: Option<DateTime<Utc>>,
    pub stored_at_block: Option<i64>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_at_block: Option<i64>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_at_block: Option<i64>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_at_block: Option<i64>,
    pub completed_tx_hash: Option<String>,
    pub deposit_debited: bool,
}

impl TransferDbObj {
    /// Unknown strings sort as PENDING, the status column is only written from TransferStatus
    pub fn status(&self) -> TransferStatus {
        TransferStatus::from_str(&self.status).unwrap_or(TransferStatus::Pending)
    }

    pub fn is_placeholder(&self) -> bool {
        self.encrypted_data_hash.is_none()
    }
}
