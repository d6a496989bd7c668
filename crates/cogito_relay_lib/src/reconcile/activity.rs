//! Per-user history rows derived from deposits and transfers.

use super::transitions::StepInfo;
use crate::db::model::{ActivityType, DepositDbObj, TransferDbObj, UserActivityDbObj};
use crate::utils::{format_addr, format_id, is_zero_hex};
use chrono::{DateTime, Utc};
use web3::types::Address;

/// `{user}-{unix seconds}-{type}-{id}`, the id suffix separates rows of the same second
pub fn activity_id(
    user: &str,
    occurred_at: DateTime<Utc>,
    activity_type: ActivityType,
    suffix: &str,
) -> String {
    format!(
        "{}-{}-{}-{}",
        user,
        occurred_at.timestamp(),
        activity_type,
        suffix
    )
}

fn known(value: &str) -> Option<String> {
    if is_zero_hex(value) {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn deposit_activity(deposit: &DepositDbObj) -> UserActivityDbObj {
    UserActivityDbObj {
        id: activity_id(
            &deposit.depositor,
            deposit.created_at,
            ActivityType::Deposit,
            &deposit.deposit_id,
        ),
        user_addr: deposit.depositor.clone(),
        activity_type: ActivityType::Deposit.to_string(),
        deposit_id: Some(deposit.deposit_id.clone()),
        transfer_id: None,
        amount: deposit.initial_amount.clone(),
        token: deposit.token.clone(),
        is_native: deposit.is_native,
        occurred_at: deposit.created_at,
        block_number: deposit.created_at_block,
        tx_hash: deposit.tx_hash.clone(),
        receiver: None,
        sender: None,
    }
}

/// SEND row created when the transfer is initiated, amount stays "0" until decrypted.
/// None while the sender is unknown.
pub fn send_activity(transfer: &TransferDbObj) -> Option<UserActivityDbObj> {
    let sender = known(&transfer.sender)?;
    let mut activity = UserActivityDbObj {
        id: activity_id(
            &sender,
            transfer.initiated_at,
            ActivityType::Send,
            &transfer.transfer_id,
        ),
        user_addr: sender,
        activity_type: ActivityType::Send.to_string(),
        deposit_id: known(&transfer.deposit_id),
        transfer_id: Some(transfer.transfer_id.clone()),
        amount: "0".to_string(),
        token: format_addr(Address::zero()),
        is_native: false,
        occurred_at: transfer.initiated_at,
        block_number: transfer.initiated_at_block,
        tx_hash: transfer.initiated_tx_hash.clone(),
        receiver: None,
        sender: None,
    };
    fill_payload(&mut activity, transfer);
    Some(activity)
}

/// Copies decrypted payload data into an existing row, returns false if nothing changed
pub fn fill_payload(activity: &mut UserActivityDbObj, transfer: &TransferDbObj) -> bool {
    let Some(amount) = &transfer.amount else {
        return false;
    };
    let before = activity.clone();
    activity.amount = amount.clone();
    if let Some(token) = &transfer.token {
        activity.token = token.clone();
    }
    activity.is_native = transfer.is_native.unwrap_or(false);
    if activity.activity_type == ActivityType::Send.as_str() {
        activity.receiver = transfer.receiver.clone();
    }
    *activity != before
}

/// Back-fills origin fields resolved after the row was written, returns false if nothing changed
pub fn fill_origin(activity: &mut UserActivityDbObj, transfer: &TransferDbObj) -> bool {
    let before = activity.clone();
    if activity.deposit_id.is_none() {
        activity.deposit_id = known(&transfer.deposit_id);
    }
    if activity.activity_type == ActivityType::Receive.as_str() && activity.sender.is_none() {
        activity.sender = known(&transfer.sender);
    }
    *activity != before
}

/// RECEIVE row for the decrypted receiver, None until the receiver is known
pub fn receive_activity(transfer: &TransferDbObj, step: &StepInfo) -> Option<UserActivityDbObj> {
    let receiver = known(transfer.receiver.as_deref()?)?;
    Some(UserActivityDbObj {
        id: activity_id(
            &receiver,
            step.at,
            ActivityType::Receive,
            &transfer.transfer_id,
        ),
        user_addr: receiver,
        activity_type: ActivityType::Receive.to_string(),
        deposit_id: known(&transfer.deposit_id),
        transfer_id: Some(transfer.transfer_id.clone()),
        amount: transfer.amount.clone().unwrap_or_else(|| "0".to_string()),
        token: transfer
            .token
            .clone()
            .unwrap_or_else(|| format_addr(Address::zero())),
        is_native: transfer.is_native.unwrap_or(false),
        occurred_at: step.at,
        block_number: step.block,
        tx_hash: format_id(step.tx_hash),
        receiver: None,
        sender: known(&transfer.sender),
    })
}
