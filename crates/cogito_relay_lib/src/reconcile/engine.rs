use super::activity::{
    deposit_activity, fill_origin, fill_payload, receive_activity, send_activity,
};
use super::transitions::{
    apply_transfer_event, debit_deposit, debit_due, StepInfo, TransferEvent, TransferUpdate,
};
use crate::chain_events::{ChainEvent, ChainEventKind, EventContext};
use crate::db::model::{
    ActivityType, DeferredEventDbObj, DepositDbObj, TransferDbObj, UserActivityDbObj,
};
use crate::db::ops::{
    delete_deferred_event, find_transfer_activity, get_deferred_events, get_deposit,
    get_transfer, get_transfers_by_deposit, insert_deferred_event, insert_deposit,
    insert_user_activity_ignore, update_deferred_event_attempt, update_deposit,
    update_user_activity, upsert_transfer,
};
use crate::error::RelayError;
use crate::resolver::{IdentifierResolver, Resolution};
use crate::utils::{format_addr, format_id};
use crate::{err_custom_create, err_from};
use chrono::Utc;
use cogito_relay_common::{emit_relay_event, RelayEvent, RelayEventContent};
use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::mpsc;
use web3::types::H256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    Applied,
    /// nothing to write, the store already reflects the event
    Skipped(String),
    /// identifiers not resolvable yet, retried later
    Deferred(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeferredRetryReport {
    pub applied: usize,
    pub still_deferred: usize,
    pub dropped: usize,
}

/// Sole writer of deposits, transfers and user activity
pub struct ReconcileEngine {
    conn: SqlitePool,
    resolver: IdentifierResolver,
    default_destination_domain: u32,
    event_sender: Option<mpsc::Sender<RelayEvent>>,
}

impl ReconcileEngine {
    pub fn new(
        conn: SqlitePool,
        resolver: IdentifierResolver,
        default_destination_domain: u32,
        event_sender: Option<mpsc::Sender<RelayEvent>>,
    ) -> Self {
        Self {
            conn,
            resolver,
            default_destination_domain,
            event_sender,
        }
    }

    /// Handles an event and persists it for a later retry when it has to be deferred
    pub async fn apply_event(&self, event: &ChainEvent) -> Result<HandleOutcome, RelayError> {
        let outcome = self.handle_event(event).await?;
        match &outcome {
            HandleOutcome::Applied => {
                log::debug!(
                    "Applied {} from block {} tx {:#x}",
                    event.kind.name(),
                    event.context.block_number,
                    event.context.tx_hash
                );
            }
            HandleOutcome::Skipped(reason) => {
                log::debug!("Skipped {}: {}", event.kind.name(), reason);
            }
            HandleOutcome::Deferred(reason) => {
                log::info!(
                    "Deferring {} from tx {:#x}: {}",
                    event.kind.name(),
                    event.context.tx_hash,
                    reason
                );
                self.defer(event, reason).await?;
            }
        }
        Ok(outcome)
    }

    pub async fn handle_event(&self, event: &ChainEvent) -> Result<HandleOutcome, RelayError> {
        let ctx = &event.context;
        let step = StepInfo::from(ctx);
        match &event.kind {
            ChainEventKind::DepositCreated {
                deposit_id,
                depositor,
                token,
                amount,
                is_native,
            } => {
                let deposit = DepositDbObj {
                    deposit_id: format_id(*deposit_id),
                    depositor: format_addr(*depositor),
                    token: format_addr(*token),
                    initial_amount: amount.to_string(),
                    remaining_amount: amount.to_string(),
                    is_native: *is_native,
                    released: false,
                    created_at: ctx.block_timestamp,
                    created_at_block: ctx.block_number as i64,
                    tx_hash: format_id(ctx.tx_hash),
                    last_used_at: None,
                };
                self.handle_deposit_created(deposit).await
            }
            ChainEventKind::EncryptedInstructionsReceived {
                encrypted_data_hash,
            } => {
                self.handle_instructions_received(*encrypted_data_hash, ctx)
                    .await
            }
            ChainEventKind::EncryptedInstructionsProcessed {
                encrypted_data_hash,
            } => {
                let transfer_id = match self
                    .resolver
                    .resolve_transfer_id(*encrypted_data_hash)
                    .await
                {
                    Resolution::Resolved(resolved) => resolved.transfer_id,
                    Resolution::Unmapped => {
                        return Ok(HandleOutcome::Deferred(format!(
                            "commitment {encrypted_data_hash:#x} is not mapped yet"
                        )))
                    }
                    Resolution::Unavailable(err) => {
                        return Ok(HandleOutcome::Deferred(format!(
                            "transfer id lookup failed: {err}"
                        )))
                    }
                };
                self.apply_transfer(&TransferEvent {
                    transfer_id,
                    step,
                    update: TransferUpdate::Completed,
                })
                .await
            }
            ChainEventKind::EncryptedTransferStored {
                transfer_id,
                origin_domain,
                ..
            } => {
                self.apply_transfer(&TransferEvent {
                    transfer_id: *transfer_id,
                    step,
                    update: TransferUpdate::Stored {
                        origin_domain: *origin_domain,
                    },
                })
                .await
            }
            ChainEventKind::TransferAcknowledged {
                transfer_id,
                destination_domain,
            } => {
                self.apply_transfer(&TransferEvent {
                    transfer_id: *transfer_id,
                    step,
                    update: TransferUpdate::Acknowledged {
                        destination_domain: *destination_domain,
                    },
                })
                .await
            }
            ChainEventKind::PrivatePayloadProcessed {
                transfer_id,
                receiver,
                token,
                amount,
                is_native,
            } => {
                self.apply_transfer(&TransferEvent {
                    transfer_id: *transfer_id,
                    step,
                    update: TransferUpdate::PayloadProcessed {
                        receiver: *receiver,
                        token: *token,
                        amount: *amount,
                        is_native: *is_native,
                    },
                })
                .await
            }
        }
    }

    async fn handle_deposit_created(
        &self,
        deposit: DepositDbObj,
    ) -> Result<HandleOutcome, RelayError> {
        let mut db_transaction = self.conn.begin().await.map_err(err_from!())?;
        if let Some(existing) = get_deposit(&mut *db_transaction, &deposit.deposit_id)
            .await
            .map_err(err_from!())?
        {
            if existing.tx_hash == deposit.tx_hash {
                return Ok(HandleOutcome::Skipped(format!(
                    "deposit {} already indexed",
                    deposit.deposit_id
                )));
            }
            log::error!(
                "Deposit {} created again in tx {}, first seen in tx {}",
                deposit.deposit_id,
                deposit.tx_hash,
                existing.tx_hash
            );
            return Err(err_custom_create!(
                "Duplicate deposit id {} (tx {} and {})",
                deposit.deposit_id,
                existing.tx_hash,
                deposit.tx_hash
            ));
        }
        insert_deposit(&mut *db_transaction, &deposit)
            .await
            .map_err(err_from!())?;
        insert_user_activity_ignore(&mut *db_transaction, &deposit_activity(&deposit))
            .await
            .map_err(err_from!())?;

        //transfers completed before their deposit was indexed
        let transfers = get_transfers_by_deposit(&mut *db_transaction, &deposit.deposit_id)
            .await
            .map_err(err_from!())?;
        for transfer in transfers {
            let (transfer, debited) = apply_due_debit(&mut *db_transaction, transfer).await?;
            if debited {
                log::info!(
                    "Applied pending debit of transfer {} to deposit {}",
                    transfer.transfer_id,
                    deposit.deposit_id
                );
            }
        }
        db_transaction.commit().await.map_err(err_from!())?;
        Ok(HandleOutcome::Applied)
    }

    async fn handle_instructions_received(
        &self,
        encrypted_data_hash: H256,
        ctx: &EventContext,
    ) -> Result<HandleOutcome, RelayError> {
        let resolved = match self
            .resolver
            .resolve_commitment(encrypted_data_hash, ctx)
            .await
        {
            Resolution::Resolved(resolved) => resolved,
            Resolution::Unmapped => {
                return Ok(HandleOutcome::Deferred(format!(
                    "commitment {encrypted_data_hash:#x} is not mapped yet"
                )))
            }
            Resolution::Unavailable(err) => {
                return Ok(HandleOutcome::Deferred(format!(
                    "transfer id lookup failed: {err}"
                )))
            }
        };
        if !resolved.metadata_complete || resolved.deposit_id.is_none() {
            log::warn!(
                "Transfer {:#x} resolved partially (metadata: {}, deposit id: {:?})",
                resolved.transfer_id,
                resolved.metadata_complete,
                resolved.deposit_id
            );
        }
        self.apply_transfer(&TransferEvent {
            transfer_id: resolved.transfer_id,
            step: StepInfo::from(ctx),
            update: TransferUpdate::Received {
                resolved,
                encrypted_data_hash,
            },
        })
        .await
    }

    async fn apply_transfer(&self, event: &TransferEvent) -> Result<HandleOutcome, RelayError> {
        let transfer_id = format_id(event.transfer_id);
        let mut db_transaction = self.conn.begin().await.map_err(err_from!())?;

        let current = get_transfer(&mut *db_transaction, &transfer_id)
            .await
            .map_err(err_from!())?;
        let transfer =
            apply_transfer_event(current.clone(), event, self.default_destination_domain);
        let mut changed = current.as_ref() != Some(&transfer);
        if current.is_none() {
            log::debug!(
                "Transfer {} first seen through {:?}",
                transfer_id,
                event.update.status()
            );
        }
        if changed {
            upsert_transfer(&mut *db_transaction, &transfer)
                .await
                .map_err(err_from!())?;
        }

        let (transfer, debited) = apply_due_debit(&mut *db_transaction, transfer).await?;
        changed |= debited;
        changed |= project_activity(&mut *db_transaction, &transfer, event).await?;

        db_transaction.commit().await.map_err(err_from!())?;
        if changed {
            Ok(HandleOutcome::Applied)
        } else {
            Ok(HandleOutcome::Skipped(format!(
                "transfer {transfer_id} already reflects the event"
            )))
        }
    }

    async fn defer(&self, event: &ChainEvent, reason: &str) -> Result<(), RelayError> {
        let deferred = DeferredEventDbObj {
            id: 0,
            chain_id: event.context.chain_id,
            tx_hash: format_id(event.context.tx_hash),
            log_index: event.context.log_index as i64,
            block_number: event.context.block_number as i64,
            event_json: serde_json::to_string(event).map_err(err_from!())?,
            reason: reason.to_string(),
            attempts: 0,
            created_date: Utc::now(),
            last_attempt_date: None,
        };
        insert_deferred_event(&self.conn, &deferred)
            .await
            .map_err(err_from!())?;
        emit_relay_event(
            &self.event_sender,
            RelayEventContent::EventDeferred {
                chain_id: deferred.chain_id,
                tx_hash: deferred.tx_hash,
                reason: deferred.reason,
            },
        )
        .await;
        Ok(())
    }

    /// Re-runs every deferred event of the chain in block order. Store errors abort,
    /// other failures count as an attempt.
    pub async fn retry_deferred(
        &self,
        chain_id: i64,
        max_attempts: i64,
    ) -> Result<DeferredRetryReport, RelayError> {
        let mut report = DeferredRetryReport::default();
        let deferred_events = get_deferred_events(&self.conn, chain_id)
            .await
            .map_err(err_from!())?;
        for mut deferred in deferred_events {
            let event: ChainEvent = match serde_json::from_str(&deferred.event_json) {
                Ok(event) => event,
                Err(err) => {
                    log::error!(
                        "Dropping unreadable deferred event {}: {}",
                        deferred.id,
                        err
                    );
                    self.drop_deferred(&deferred).await?;
                    report.dropped += 1;
                    continue;
                }
            };
            let reason = match self.handle_event(&event).await {
                Ok(HandleOutcome::Deferred(reason)) => reason,
                Ok(_) => {
                    delete_deferred_event(&self.conn, deferred.id)
                        .await
                        .map_err(err_from!())?;
                    report.applied += 1;
                    continue;
                }
                Err(err) if err.is_store_error() => return Err(err),
                Err(err) => err.to_string(),
            };
            deferred.attempts += 1;
            deferred.reason = reason;
            deferred.last_attempt_date = Some(Utc::now());
            if deferred.attempts >= max_attempts {
                log::error!(
                    "Dropping {} from tx {} after {} attempts: {}",
                    event.kind.name(),
                    deferred.tx_hash,
                    deferred.attempts,
                    deferred.reason
                );
                self.drop_deferred(&deferred).await?;
                report.dropped += 1;
            } else {
                update_deferred_event_attempt(&self.conn, &deferred)
                    .await
                    .map_err(err_from!())?;
                report.still_deferred += 1;
            }
        }
        Ok(report)
    }

    async fn drop_deferred(&self, deferred: &DeferredEventDbObj) -> Result<(), RelayError> {
        delete_deferred_event(&self.conn, deferred.id)
            .await
            .map_err(err_from!())?;
        emit_relay_event(
            &self.event_sender,
            RelayEventContent::DeferredEventDropped {
                chain_id: deferred.chain_id,
                tx_hash: deferred.tx_hash.clone(),
                attempts: deferred.attempts,
            },
        )
        .await;
        Ok(())
    }
}

/// Debits the deposit once the transfer qualifies, marks the transfer as debited
async fn apply_due_debit(
    conn: &mut SqliteConnection,
    transfer: TransferDbObj,
) -> Result<(TransferDbObj, bool), RelayError> {
    let Some((deposit_id, amount)) = debit_due(&transfer)? else {
        return Ok((transfer, false));
    };
    let Some(deposit) = get_deposit(&mut *conn, &deposit_id)
        .await
        .map_err(err_from!())?
    else {
        log::debug!(
            "Deposit {} of transfer {} not indexed yet, debit postponed",
            deposit_id,
            transfer.transfer_id
        );
        return Ok((transfer, false));
    };
    let debited = debit_deposit(&deposit, amount, transfer.completed_at)?;
    if debited != deposit {
        update_deposit(&mut *conn, &debited)
            .await
            .map_err(err_from!())?;
        log::info!(
            "Deposit {} debited by {} for transfer {}, remaining {}{}",
            deposit_id,
            amount,
            transfer.transfer_id,
            debited.remaining_amount,
            if debited.released { " (released)" } else { "" }
        );
    }
    let mut transfer = transfer;
    transfer.deposit_debited = true;
    let transfer = upsert_transfer(&mut *conn, &transfer)
        .await
        .map_err(err_from!())?;
    Ok((transfer, true))
}

async fn insert_activity_once(
    conn: &mut SqliteConnection,
    transfer_id: &str,
    activity_type: ActivityType,
    activity: Option<UserActivityDbObj>,
) -> Result<bool, RelayError> {
    let Some(activity) = activity else {
        return Ok(false);
    };
    if find_transfer_activity(&mut *conn, transfer_id, activity_type)
        .await
        .map_err(err_from!())?
        .is_some()
    {
        return Ok(false);
    }
    insert_user_activity_ignore(&mut *conn, &activity)
        .await
        .map_err(err_from!())
}

async fn update_activity<F>(
    conn: &mut SqliteConnection,
    transfer_id: &str,
    activity_type: ActivityType,
    fill: F,
) -> Result<bool, RelayError>
where
    F: FnOnce(&mut UserActivityDbObj) -> bool,
{
    let Some(mut activity) = find_transfer_activity(&mut *conn, transfer_id, activity_type)
        .await
        .map_err(err_from!())?
    else {
        return Ok(false);
    };
    if !fill(&mut activity) {
        return Ok(false);
    }
    update_user_activity(&mut *conn, &activity)
        .await
        .map_err(err_from!())?;
    Ok(true)
}

async fn project_activity(
    conn: &mut SqliteConnection,
    transfer: &TransferDbObj,
    event: &TransferEvent,
) -> Result<bool, RelayError> {
    match event.update {
        TransferUpdate::Received { .. } => {
            let mut changed = insert_activity_once(
                conn,
                &transfer.transfer_id,
                ActivityType::Send,
                send_activity(transfer),
            )
            .await?;
            //RECEIVE row written while the transfer was a placeholder
            changed |= update_activity(
                conn,
                &transfer.transfer_id,
                ActivityType::Receive,
                |receive| fill_origin(receive, transfer),
            )
            .await?;
            Ok(changed)
        }
        TransferUpdate::PayloadProcessed { .. } | TransferUpdate::Completed => {
            let mut changed = update_activity(
                conn,
                &transfer.transfer_id,
                ActivityType::Send,
                |send| fill_payload(send, transfer),
            )
            .await?;
            changed |= insert_activity_once(
                conn,
                &transfer.transfer_id,
                ActivityType::Receive,
                receive_activity(transfer, &event.step),
            )
            .await?;
            Ok(changed)
        }
        TransferUpdate::Stored { .. } | TransferUpdate::Acknowledged { .. } => Ok(false),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::model::TransferStatus;
    use crate::db::ops::{get_deposit, get_user_activities};
    use crate::db::setup_random_memory_sqlite_conn;
    use crate::resolver::tests::{initiate_transfer_input, MockIngress};
    use chrono::{DateTime, Utc};
    use std::sync::Arc;
    use web3::types::{Address, Bytes, U256};

    pub const SOURCE_CHAIN: i64 = 5003;
    pub const DESTINATION_CHAIN: i64 = 23295;

    pub fn chain_event(chain_id: i64, block: u64, tx: u8, kind: ChainEventKind) -> ChainEvent {
        ChainEvent {
            context: EventContext {
                chain_id,
                block_number: block,
                block_timestamp: DateTime::<Utc>::from_timestamp(1_700_000_000 + block as i64, 0)
                    .unwrap(),
                tx_hash: H256::repeat_byte(tx),
                log_index: 0,
                tx_sender: None,
                tx_input: None,
            },
            kind,
        }
    }

    pub fn received_event(block: u64, tx: u8, commitment: H256, deposit_id: H256) -> ChainEvent {
        let mut event = chain_event(
            SOURCE_CHAIN,
            block,
            tx,
            ChainEventKind::EncryptedInstructionsReceived {
                encrypted_data_hash: commitment,
            },
        );
        event.context.tx_sender = Some(Address::repeat_byte(0x11));
        event.context.tx_input = Some(Bytes(initiate_transfer_input(deposit_id)));
        event
    }

    pub fn engine(conn: &SqlitePool, reader: Arc<MockIngress>) -> ReconcileEngine {
        ReconcileEngine::new(
            conn.clone(),
            IdentifierResolver::new(reader, 23295),
            23295,
            None,
        )
    }

    fn deposit_event(deposit_id: H256, amount: U256) -> ChainEvent {
        chain_event(
            SOURCE_CHAIN,
            1,
            0xd0,
            ChainEventKind::DepositCreated {
                deposit_id,
                depositor: Address::repeat_byte(0x11),
                token: Address::zero(),
                amount,
                is_native: true,
            },
        )
    }

    fn destination_events(transfer_id: H256, amount: U256) -> Vec<ChainEvent> {
        vec![
            chain_event(
                DESTINATION_CHAIN,
                100,
                0xe1,
                ChainEventKind::EncryptedTransferStored {
                    transfer_id,
                    origin_domain: 5003,
                    origin_router: H256::repeat_byte(0x05),
                },
            ),
            chain_event(
                DESTINATION_CHAIN,
                101,
                0xe2,
                ChainEventKind::TransferAcknowledged {
                    transfer_id,
                    destination_domain: 23295,
                },
            ),
            chain_event(
                DESTINATION_CHAIN,
                102,
                0xe3,
                ChainEventKind::PrivatePayloadProcessed {
                    transfer_id,
                    receiver: Address::repeat_byte(0x22),
                    token: Address::zero(),
                    amount,
                    is_native: true,
                },
            ),
        ]
    }

    #[tokio::test]
    async fn test_destination_first_then_source() -> anyhow::Result<()> {
        let conn = setup_random_memory_sqlite_conn().await;
        let reader = Arc::new(MockIngress::default());
        let engine = engine(&conn, reader.clone());
        let deposit_id = H256::repeat_byte(0xd1);
        let transfer_id = H256::repeat_byte(0xaa);
        let commitment = H256::repeat_byte(0xcc);

        engine
            .apply_event(&deposit_event(deposit_id, U256::from(1000)))
            .await?;
        for event in destination_events(transfer_id, U256::from(400)) {
            assert_eq!(engine.apply_event(&event).await?, HandleOutcome::Applied);
        }
        let placeholder = get_transfer(&conn, &format_id(transfer_id)).await?.unwrap();
        assert!(placeholder.is_placeholder());
        assert_eq!(placeholder.status(), TransferStatus::Acknowledged);
        assert_eq!(placeholder.destination_domain, 5003);

        //source chain view catches up
        reader.map_transfer(commitment, transfer_id, Address::repeat_byte(0x11));
        engine
            .apply_event(&received_event(10, 0x01, commitment, deposit_id))
            .await?;
        let completion = chain_event(
            SOURCE_CHAIN,
            20,
            0x02,
            ChainEventKind::EncryptedInstructionsProcessed {
                encrypted_data_hash: commitment,
            },
        );
        assert_eq!(engine.apply_event(&completion).await?, HandleOutcome::Applied);
        assert!(matches!(
            engine.apply_event(&completion).await?,
            HandleOutcome::Skipped(_)
        ));

        let transfer = get_transfer(&conn, &format_id(transfer_id)).await?.unwrap();
        assert_eq!(transfer.status(), TransferStatus::Completed);
        assert_eq!(transfer.sender, format_addr(Address::repeat_byte(0x11)));
        assert_eq!(transfer.deposit_id, format_id(deposit_id));
        assert!(transfer.deposit_debited);

        let deposit = get_deposit(&conn, &format_id(deposit_id)).await?.unwrap();
        assert_eq!(deposit.remaining_amount, "600");
        assert!(!deposit.released);

        let sender_rows = get_user_activities(&conn, &format_addr(Address::repeat_byte(0x11)), None).await?;
        assert_eq!(sender_rows.len(), 2);
        let send = sender_rows
            .iter()
            .find(|row| row.activity_type == "SEND")
            .unwrap();
        assert_eq!(send.amount, "400");
        let receiver_rows =
            get_user_activities(&conn, &format_addr(Address::repeat_byte(0x22)), None).await?;
        assert_eq!(receiver_rows.len(), 1);
        //written from the placeholder, back-filled by the source chain event
        assert_eq!(
            receiver_rows[0].sender,
            Some(format_addr(Address::repeat_byte(0x11)))
        );
        assert_eq!(receiver_rows[0].deposit_id, Some(format_id(deposit_id)));
        Ok(())
    }

    #[tokio::test]
    async fn test_unmapped_commitment_is_deferred_and_retried() -> anyhow::Result<()> {
        let conn = setup_random_memory_sqlite_conn().await;
        let reader = Arc::new(MockIngress::default());
        let engine = engine(&conn, reader.clone());
        let commitment = H256::repeat_byte(0xcc);
        let event = received_event(10, 0x01, commitment, H256::repeat_byte(0xd1));

        assert!(matches!(
            engine.apply_event(&event).await?,
            HandleOutcome::Deferred(_)
        ));
        //second delivery keeps one row
        engine.apply_event(&event).await?;
        assert_eq!(get_deferred_events(&conn, SOURCE_CHAIN).await?.len(), 1);

        let report = engine.retry_deferred(SOURCE_CHAIN, 3).await?;
        assert_eq!(report.still_deferred, 1);
        assert_eq!(get_deferred_events(&conn, SOURCE_CHAIN).await?[0].attempts, 1);

        reader.map_transfer(commitment, H256::repeat_byte(0xaa), Address::repeat_byte(0x11));
        let report = engine.retry_deferred(SOURCE_CHAIN, 3).await?;
        assert_eq!(report.applied, 1);
        assert!(get_deferred_events(&conn, SOURCE_CHAIN).await?.is_empty());
        let transfer = get_transfer(&conn, &format_id(H256::repeat_byte(0xaa)))
            .await?
            .unwrap();
        assert_eq!(transfer.status(), TransferStatus::Pending);
        assert_eq!(transfer.encrypted_data_hash, Some(format_id(commitment)));
        Ok(())
    }

    #[tokio::test]
    async fn test_deferred_event_dropped_after_max_attempts() -> anyhow::Result<()> {
        let conn = setup_random_memory_sqlite_conn().await;
        let reader = Arc::new(MockIngress::default());
        *reader.fail_rpc.lock().unwrap() = true;
        let engine = engine(&conn, reader);
        let event = received_event(10, 0x01, H256::repeat_byte(0xcc), H256::repeat_byte(0xd1));
        engine.apply_event(&event).await?;

        assert_eq!(engine.retry_deferred(SOURCE_CHAIN, 2).await?.still_deferred, 1);
        assert_eq!(engine.retry_deferred(SOURCE_CHAIN, 2).await?.dropped, 1);
        assert!(get_deferred_events(&conn, SOURCE_CHAIN).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_deposit_delivery() -> anyhow::Result<()> {
        let conn = setup_random_memory_sqlite_conn().await;
        let engine = engine(&conn, Arc::new(MockIngress::default()));
        let event = deposit_event(H256::repeat_byte(0xd1), U256::from(1000));

        assert_eq!(engine.apply_event(&event).await?, HandleOutcome::Applied);
        assert!(matches!(
            engine.apply_event(&event).await?,
            HandleOutcome::Skipped(_)
        ));

        let mut conflicting = event.clone();
        conflicting.context.tx_hash = H256::repeat_byte(0xd9);
        assert!(engine.apply_event(&conflicting).await.is_err());

        let rows = get_user_activities(&conn, &format_addr(Address::repeat_byte(0x11)), None).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].activity_type, "DEPOSIT");
        Ok(())
    }

    #[tokio::test]
    async fn test_debit_applied_when_deposit_arrives_late() -> anyhow::Result<()> {
        let conn = setup_random_memory_sqlite_conn().await;
        let reader = Arc::new(MockIngress::default());
        let engine = engine(&conn, reader.clone());
        let deposit_id = H256::repeat_byte(0xd1);
        let transfer_id = H256::repeat_byte(0xaa);
        let commitment = H256::repeat_byte(0xcc);
        reader.map_transfer(commitment, transfer_id, Address::repeat_byte(0x11));

        engine
            .apply_event(&received_event(10, 0x01, commitment, deposit_id))
            .await?;
        for event in destination_events(transfer_id, U256::from(1000)) {
            engine.apply_event(&event).await?;
        }
        engine
            .apply_event(&chain_event(
                SOURCE_CHAIN,
                20,
                0x02,
                ChainEventKind::EncryptedInstructionsProcessed {
                    encrypted_data_hash: commitment,
                },
            ))
            .await?;
        let transfer = get_transfer(&conn, &format_id(transfer_id)).await?.unwrap();
        assert!(!transfer.deposit_debited);

        engine
            .apply_event(&deposit_event(deposit_id, U256::from(1000)))
            .await?;
        let deposit = get_deposit(&conn, &format_id(deposit_id)).await?.unwrap();
        assert_eq!(deposit.remaining_amount, "0");
        assert!(deposit.released);
        assert!(get_transfer(&conn, &format_id(transfer_id))
            .await?
            .unwrap()
            .deposit_debited);
        Ok(())
    }
}
