use crate::model::SettlementTxDbObj;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowIndexedInfo {
    pub chain_id: i64,
    pub from_block: u64,
    pub to_block: u64,
    pub applied: usize,
    pub deferred: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementFailedInfo {
    pub transfer_id: String,
    pub attempts: u32,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RelayEventContent {
    Alive,
    WindowIndexed(WindowIndexedInfo),
    EventDeferred { chain_id: i64, tx_hash: String, reason: String },
    DeferredEventDropped { chain_id: i64, tx_hash: String, attempts: i64 },
    TransferSettled(SettlementTxDbObj),
    TransferAlreadySettled { transfer_id: String },
    SettlementFailed(SettlementFailedInfo),
    CycleSkipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayEvent {
    pub create_date: DateTime<Utc>,
    pub content: RelayEventContent,
}

impl RelayEvent {
    pub fn now(content: RelayEventContent) -> Self {
        RelayEvent {
            create_date: Utc::now(),
            content,
        }
    }
}

/// Sends when a listener is attached, a closed channel is not an error for the sender
pub async fn emit_relay_event(
    sender: &Option<tokio::sync::mpsc::Sender<RelayEvent>>,
    content: RelayEventContent,
) {
    if let Some(sender) = sender {
        if let Err(err) = sender.send(RelayEvent::now(content)).await {
            log::debug!("Relay event listener is gone: {err}");
        }
    }
}
