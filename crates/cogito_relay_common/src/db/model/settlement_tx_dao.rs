use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize, sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SettlementTxDbObj {
    pub id: i64,
    pub transfer_id: String,
    pub attempt: i64,
    pub chain_id: i64,
    pub from_addr: String,
    pub tx_hash: String,
    pub block_number: Option<i64>,
    /// receipt status, 1 means success
    pub chain_status: Option<i64>,
    pub error: Option<String>,
    pub created_date: DateTime<Utc>,
    pub confirm_date: Option<DateTime<Utc>>,
}
