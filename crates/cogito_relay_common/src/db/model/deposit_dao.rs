use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize, sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DepositDbObj {
    pub deposit_id: String,
    pub depositor: String,
    /// zero address for the native asset
    pub token: String,
    pub initial_amount: String,
    pub remaining_amount: String,
    pub is_native: bool,
    pub released: bool,
    pub created_at: DateTime<Utc>,
    pub created_at_block: i64,
    pub tx_hash: String,
    pub last_used_at: Option<DateTime<Utc>>,
}
