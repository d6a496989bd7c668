use chrono::{DateTime, Utc};
use serde::Serialize;

/// Chain event kept for a later pass because its identifiers could not be resolved
#[derive(Serialize, sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeferredEventDbObj {
    pub id: i64,
    pub chain_id: i64,
    pub tx_hash: String,
    pub log_index: i64,
    pub block_number: i64,
    pub event_json: String,
    pub reason: String,
    pub attempts: i64,
    pub created_date: DateTime<Utc>,
    pub last_attempt_date: Option<DateTime<Utc>>,
}
