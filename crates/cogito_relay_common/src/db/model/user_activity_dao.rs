use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
    Deposit,
    Send,
    Receive,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Deposit => "DEPOSIT",
            ActivityType::Send => "SEND",
            ActivityType::Receive => "RECEIVE",
        }
    }
}

impl Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Serialize, sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserActivityDbObj {
    /// `{user}-{unix seconds}-{type}[-{id}]`
    pub id: String,
    pub user_addr: String,
    pub activity_type: String,
    pub deposit_id: Option<String>,
    pub transfer_id: Option<String>,
    /// "0" until the transfer amount is decrypted
    pub amount: String,
    pub token: String,
    pub is_native: bool,
    pub occurred_at: DateTime<Utc>,
    pub block_number: i64,
    pub tx_hash: String,
    pub receiver: Option<String>,
    pub sender: Option<String>,
}
