//! Pure record transitions: (current record, event) -> new record.
//!
//! Every lifecycle event may arrive first, so each one either creates the record
//! (a placeholder when origin data is missing) or merges into it. Merging rules:
//! status is the maximum of both sides, step timestamps are first-write-wins,
//! decrypted payload fields are set once.

use crate::chain_events::EventContext;
use crate::db::model::{DepositDbObj, TransferDbObj, TransferStatus};
use crate::error::RelayError;
use crate::resolver::ResolvedTransfer;
use crate::utils::{format_addr, format_id, is_zero_hex, StringConvExt};
use crate::{err_custom_create, err_from};
use chrono::{DateTime, Utc};
use web3::types::{Address, H256, U256};

/// Where and when a lifecycle step was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepInfo {
    pub at: DateTime<Utc>,
    pub block: i64,
    pub tx_hash: H256,
}

impl From<&EventContext> for StepInfo {
    fn from(ctx: &EventContext) -> Self {
        StepInfo {
            at: ctx.block_timestamp,
            block: ctx.block_number as i64,
            tx_hash: ctx.tx_hash,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferUpdate {
    /// source chain commitment, resolved to identifiers
    Received {
        resolved: ResolvedTransfer,
        encrypted_data_hash: H256,
    },
    /// domain the stored transfer was dispatched from
    Stored { origin_domain: u32 },
    Acknowledged { destination_domain: u32 },
    PayloadProcessed {
        receiver: Address,
        token: Address,
        amount: U256,
        is_native: bool,
    },
    /// completion echo on the source chain
    Completed,
}

impl TransferUpdate {
    pub fn status(&self) -> TransferStatus {
        match self {
            TransferUpdate::Received { .. } => TransferStatus::Pending,
            TransferUpdate::Stored { .. } => TransferStatus::Stored,
            TransferUpdate::Acknowledged { .. } => TransferStatus::Acknowledged,
            TransferUpdate::PayloadProcessed { .. } => TransferStatus::Pending,
            TransferUpdate::Completed => TransferStatus::Completed,
        }
    }

    /// Domain carried by destination chain events, used until the source chain fills it
    fn carried_domain(&self) -> Option<u32> {
        match self {
            TransferUpdate::Stored { origin_domain } => Some(*origin_domain),
            TransferUpdate::Acknowledged { destination_domain } => Some(*destination_domain),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub transfer_id: H256,
    pub step: StepInfo,
    pub update: TransferUpdate,
}

fn placeholder(event: &TransferEvent, default_destination_domain: u32) -> TransferDbObj {
    TransferDbObj {
        transfer_id: format_id(event.transfer_id),
        deposit_id: format_id(H256::zero()),
        sender: format_addr(Address::zero()),
        destination_domain: event
            .update
            .carried_domain()
            .unwrap_or(default_destination_domain) as i64,
        encrypted_data_hash: None,
        initiated_at: event.step.at,
        initiated_at_block: event.step.block,
        initiated_tx_hash: format_id(event.step.tx_hash),
        receiver: None,
        token: None,
        amount: None,
        is_native: None,
        status: TransferStatus::Pending.to_string(),
        stored_at: None,
        stored_at_block: None,
        acknowledged_at: None,
        acknowledged_at_block: None,
        processed_at: None,
        processed_at_block: None,
        completed_at: None,
        completed_at_block: None,
        completed_tx_hash: None,
        deposit_debited: false,
    }
}

fn first_write<T>(slot: &mut Option<T>, value: T) {
    if slot.is_none() {
        *slot = Some(value);
    }
}

/// Applies one lifecycle event. Re-applying an event already reflected in `current`
/// returns an equal record.
pub fn apply_transfer_event(
    current: Option<TransferDbObj>,
    event: &TransferEvent,
    default_destination_domain: u32,
) -> TransferDbObj {
    let mut transfer =
        current.unwrap_or_else(|| placeholder(event, default_destination_domain));
    let step = &event.step;

    match &event.update {
        TransferUpdate::Received {
            resolved,
            encrypted_data_hash,
        } => {
            if transfer.is_placeholder() {
                transfer.encrypted_data_hash = Some(format_id(*encrypted_data_hash));
                transfer.destination_domain = resolved.destination_domain as i64;
                transfer.initiated_at = step.at;
                transfer.initiated_at_block = step.block;
                transfer.initiated_tx_hash = format_id(step.tx_hash);
            }
            if is_zero_hex(&transfer.sender) && !resolved.sender.is_zero() {
                transfer.sender = format_addr(resolved.sender);
            }
            if is_zero_hex(&transfer.deposit_id) {
                if let Some(deposit_id) = resolved.deposit_id {
                    transfer.deposit_id = format_id(deposit_id);
                }
            }
        }
        TransferUpdate::Stored { .. } => {
            first_write(&mut transfer.stored_at, step.at);
            first_write(&mut transfer.stored_at_block, step.block);
        }
        TransferUpdate::Acknowledged { .. } => {
            first_write(&mut transfer.acknowledged_at, step.at);
            first_write(&mut transfer.acknowledged_at_block, step.block);
        }
        TransferUpdate::PayloadProcessed {
            receiver,
            token,
            amount,
            is_native,
        } => {
            if transfer.receiver.is_none() {
                transfer.receiver = Some(format_addr(*receiver));
                transfer.token = Some(format_addr(*token));
                transfer.amount = Some(amount.to_string());
                transfer.is_native = Some(*is_native);
            }
            first_write(&mut transfer.processed_at, step.at);
            first_write(&mut transfer.processed_at_block, step.block);
        }
        TransferUpdate::Completed => {
            first_write(&mut transfer.completed_at, step.at);
            first_write(&mut transfer.completed_at_block, step.block);
            first_write(&mut transfer.completed_tx_hash, format_id(step.tx_hash));
        }
    }

    let status = std::cmp::max(transfer.status(), event.update.status());
    transfer.status = status.to_string();
    transfer
}

/// Deposit id and amount to debit, when the transfer is completed, its amount known,
/// its deposit resolved and the debit not applied yet.
pub fn debit_due(transfer: &TransferDbObj) -> Result<Option<(String, U256)>, RelayError> {
    if transfer.deposit_debited
        || transfer.status() != TransferStatus::Completed
        || is_zero_hex(&transfer.deposit_id)
    {
        return Ok(None);
    }
    match &transfer.amount {
        Some(amount) => Ok(Some((
            transfer.deposit_id.clone(),
            amount.to_u256().map_err(err_from!())?,
        ))),
        None => Ok(None),
    }
}

/// Debits `amount` clamped at zero, the deposit is released when nothing remains.
/// A zero amount leaves the deposit untouched.
pub fn debit_deposit(
    deposit: &DepositDbObj,
    amount: U256,
    used_at: Option<DateTime<Utc>>,
) -> Result<DepositDbObj, RelayError> {
    if deposit.released && amount > U256::zero() {
        log::warn!(
            "Debiting {} from released deposit {}",
            amount,
            deposit.deposit_id
        );
    }
    if amount.is_zero() {
        return Ok(deposit.clone());
    }
    let remaining = deposit.remaining_amount.to_u256().map_err(err_from!())?;
    let initial = deposit.initial_amount.to_u256().map_err(err_from!())?;
    if remaining > initial {
        return Err(err_custom_create!(
            "Deposit {} has remaining amount {} above initial {}",
            deposit.deposit_id,
            remaining,
            initial
        ));
    }
    if amount > remaining {
        log::warn!(
            "Transfer amount {} exceeds remaining {} of deposit {}, clamping",
            amount,
            remaining,
            deposit.deposit_id
        );
    }
    let remaining = remaining.saturating_sub(amount);

    let mut deposit = deposit.clone();
    deposit.remaining_amount = remaining.to_string();
    deposit.released = remaining.is_zero();
    if let Some(used_at) = used_at {
        deposit.last_used_at = Some(used_at);
    }
    Ok(deposit)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn step(secs: i64, block: i64, tx: u8) -> StepInfo {
        StepInfo {
            at: DateTime::<Utc>::from_timestamp(secs, 0).unwrap(),
            block,
            tx_hash: H256::repeat_byte(tx),
        }
    }

    pub fn lifecycle(transfer_id: H256, deposit_id: Option<H256>, amount: U256) -> Vec<TransferEvent> {
        let event = |step: StepInfo, update: TransferUpdate| TransferEvent {
            transfer_id,
            step,
            update,
        };
        vec![
            event(
                step(1_700_000_000, 100, 0x01),
                TransferUpdate::Received {
                    resolved: ResolvedTransfer {
                        transfer_id,
                        sender: Address::repeat_byte(0x11),
                        destination_domain: 23295,
                        deposit_id,
                        metadata_complete: true,
                    },
                    encrypted_data_hash: H256::repeat_byte(0xcc),
                },
            ),
            event(
                step(1_700_000_060, 5000, 0x02),
                TransferUpdate::Stored {
                    origin_domain: 5003,
                },
            ),
            event(
                step(1_700_000_120, 5010, 0x03),
                TransferUpdate::Acknowledged {
                    destination_domain: 23295,
                },
            ),
            event(
                step(1_700_000_180, 5020, 0x04),
                TransferUpdate::PayloadProcessed {
                    receiver: Address::repeat_byte(0x22),
                    token: Address::zero(),
                    amount,
                    is_native: true,
                },
            ),
            event(step(1_700_000_300, 160, 0x05), TransferUpdate::Completed),
        ]
    }

    fn apply_all<'a>(
        events: impl IntoIterator<Item = &'a TransferEvent>,
    ) -> Option<TransferDbObj> {
        let mut current: Option<TransferDbObj> = None;
        for event in events {
            let next = apply_transfer_event(current.clone(), event, 23295);
            if let Some(prev) = &current {
                assert!(next.status() >= prev.status(), "status moved backwards");
            }
            current = Some(next);
        }
        current
    }

    fn permutations(n: usize) -> Vec<Vec<usize>> {
        if n == 0 {
            return vec![vec![]];
        }
        let mut result = Vec::new();
        for perm in permutations(n - 1) {
            for pos in 0..=perm.len() {
                let mut next = perm.clone();
                next.insert(pos, n - 1);
                result.push(next);
            }
        }
        result
    }

    #[test]
    fn test_any_order_with_duplicates_converges() {
        let events = lifecycle(
            H256::repeat_byte(0xaa),
            Some(H256::repeat_byte(0xd1)),
            U256::from(400_u64),
        );
        let canonical = apply_all(&events).unwrap();
        assert_eq!(canonical.status(), TransferStatus::Completed);
        assert_eq!(canonical.sender, format_addr(Address::repeat_byte(0x11)));
        assert_eq!(canonical.amount.as_deref(), Some("400"));
        assert_eq!(canonical.initiated_at_block, 100);

        let orders = permutations(events.len());
        assert_eq!(orders.len(), 120);
        for order in orders {
            let mut sequence: Vec<&TransferEvent> = order.iter().map(|i| &events[*i]).collect();
            //every event delivered a second time, in reverse
            sequence.extend(order.iter().rev().map(|i| &events[*i]));
            assert_eq!(apply_all(sequence).unwrap(), canonical, "order {order:?}");
        }
    }

    #[test]
    fn test_placeholder_is_back_filled() {
        let events = lifecycle(H256::repeat_byte(0xaa), Some(H256::repeat_byte(0xd1)), U256::from(1));
        let stored = apply_transfer_event(None, &events[1], 42);
        assert!(stored.is_placeholder());
        assert_eq!(stored.status(), TransferStatus::Stored);
        assert!(is_zero_hex(&stored.sender));
        assert!(is_zero_hex(&stored.deposit_id));
        assert_eq!(stored.destination_domain, 5003);

        let received = apply_transfer_event(Some(stored), &events[0], 42);
        assert!(!received.is_placeholder());
        assert_eq!(received.status(), TransferStatus::Stored);
        assert_eq!(received.sender, format_addr(Address::repeat_byte(0x11)));
        assert_eq!(received.deposit_id, format_id(H256::repeat_byte(0xd1)));
        assert_eq!(received.destination_domain, 23295);
        assert_eq!(received.initiated_at_block, 100);
    }

    #[test]
    fn test_placeholder_domain_comes_from_event() {
        let events = lifecycle(H256::repeat_byte(0xaa), None, U256::from(1));
        let acknowledged = apply_transfer_event(None, &events[2], 42);
        assert_eq!(acknowledged.destination_domain, 23295);
        //later events keep the domain of the first write
        let stored = apply_transfer_event(Some(acknowledged), &events[1], 42);
        assert_eq!(stored.destination_domain, 23295);

        //payload events carry no domain
        let processed = apply_transfer_event(None, &events[3], 42);
        assert_eq!(processed.destination_domain, 42);
    }

    #[test]
    fn test_payload_fields_are_set_once() {
        let events = lifecycle(H256::repeat_byte(0xaa), None, U256::from(7));
        let first = apply_transfer_event(None, &events[3], 1);
        assert_eq!(first.status(), TransferStatus::Pending);
        let mut other = events[3].clone();
        other.update = TransferUpdate::PayloadProcessed {
            receiver: Address::repeat_byte(0x33),
            token: Address::repeat_byte(0x44),
            amount: U256::from(9),
            is_native: false,
        };
        let second = apply_transfer_event(Some(first.clone()), &other, 1);
        assert_eq!(second, first);
    }

    fn deposit(initial: u64, remaining: u64) -> DepositDbObj {
        DepositDbObj {
            deposit_id: format_id(H256::repeat_byte(0xd1)),
            depositor: format_addr(Address::repeat_byte(0x11)),
            token: format_addr(Address::zero()),
            initial_amount: initial.to_string(),
            remaining_amount: remaining.to_string(),
            is_native: true,
            released: false,
            created_at: DateTime::<Utc>::from_timestamp(1_699_999_000, 0).unwrap(),
            created_at_block: 90,
            tx_hash: format_id(H256::repeat_byte(0x0d)),
            last_used_at: None,
        }
    }

    #[test]
    fn test_debit_is_clamped_and_releases() {
        let used_at = DateTime::<Utc>::from_timestamp(1_700_000_300, 0);
        let partial = debit_deposit(&deposit(1000, 1000), U256::from(400), used_at).unwrap();
        assert_eq!(partial.remaining_amount, "600");
        assert!(!partial.released);
        assert_eq!(partial.last_used_at, used_at);

        let over = debit_deposit(&partial, U256::from(900), used_at).unwrap();
        assert_eq!(over.remaining_amount, "0");
        assert!(over.released);

        let zero = debit_deposit(&deposit(1000, 1000), U256::zero(), used_at).unwrap();
        assert_eq!(zero, deposit(1000, 1000));

        assert!(debit_deposit(&deposit(10, 20), U256::from(1), used_at).is_err());
    }

    #[test]
    fn test_debit_due_requires_completion_amount_and_deposit() {
        let events = lifecycle(H256::repeat_byte(0xaa), None, U256::from(400));
        let completed = apply_all(&events).unwrap();
        //deposit unresolved
        assert_eq!(debit_due(&completed).unwrap(), None);

        let events = lifecycle(H256::repeat_byte(0xaa), Some(H256::repeat_byte(0xd1)), U256::from(400));
        let not_completed = apply_all(&events[..4]).unwrap();
        assert_eq!(debit_due(&not_completed).unwrap(), None);

        let mut completed = apply_all(&events).unwrap();
        assert_eq!(
            debit_due(&completed).unwrap(),
            Some((format_id(H256::repeat_byte(0xd1)), U256::from(400)))
        );
        completed.deposit_debited = true;
        assert_eq!(debit_due(&completed).unwrap(), None);
    }
}
