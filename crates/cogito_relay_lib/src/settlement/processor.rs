use super::registry::{InFlightGuard, InFlightRegistry};
use super::{SettlementContract, SettlementInclusion, SubmitError};
use crate::db::model::{SettlementTxDbObj, TransferStatus};
use crate::db::ops::{do_db_operation, get_transfers_by_status, insert_settlement_tx};
use crate::error::RelayError;
use crate::setup::EngineSetup;
use crate::utils::{format_addr, format_id, parse_id};
use crate::{err_custom_create, err_from};
use chrono::Utc;
use cogito_relay_common::{
    emit_relay_event, RelayEvent, RelayEventContent, SettlementFailedInfo,
};
use futures::StreamExt;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use web3::types::H256;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SettlementOutcome {
    pub transfer_id: String,
    pub success: bool,
    /// submissions made, 0 when the chain already had it settled
    pub attempts: u32,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub candidates: usize,
    pub skipped_in_flight: usize,
    pub already_settled: usize,
    pub settled: usize,
    pub failed: usize,
    pub outcomes: Vec<SettlementOutcome>,
}

enum CandidateResult {
    InFlight,
    AlreadySettled,
    Attempted(SettlementOutcome),
}

pub struct SettlementProcessor {
    conn: SqlitePool,
    contract: Arc<dyn SettlementContract>,
    registry: Arc<InFlightRegistry>,
    max_retries: u32,
    retry_base_delay: Duration,
    concurrency: usize,
    event_sender: Option<mpsc::Sender<RelayEvent>>,
}

impl SettlementProcessor {
    pub fn new(
        conn: SqlitePool,
        contract: Arc<dyn SettlementContract>,
        engine: &EngineSetup,
        event_sender: Option<mpsc::Sender<RelayEvent>>,
    ) -> Self {
        Self {
            conn,
            contract,
            registry: InFlightRegistry::new(engine.in_flight_capacity),
            max_retries: engine.max_retries,
            retry_base_delay: engine.retry_base_delay,
            concurrency: engine.settle_concurrency,
            event_sender,
        }
    }

    pub fn registry(&self) -> Arc<InFlightRegistry> {
        self.registry.clone()
    }

    /// Chain flag, an unreachable node counts as "not settled"
    pub async fn is_settled(&self, transfer_id: H256) -> bool {
        match self.contract.is_settled(transfer_id).await {
            Ok(settled) => settled,
            Err(err) => {
                log::warn!(
                    "Cannot read settlement flag of {:#x}, assuming not settled: {}",
                    transfer_id,
                    err
                );
                false
            }
        }
    }

    async fn record_inclusion(
        &self,
        transfer_id: H256,
        attempt: u32,
        inclusion: &SettlementInclusion,
        chain_status: i64,
        error: Option<String>,
    ) {
        let now = Utc::now();
        let settlement_tx = SettlementTxDbObj {
            id: 0,
            transfer_id: format_id(transfer_id),
            attempt: attempt as i64,
            chain_id: self.contract.chain_id(),
            from_addr: format_addr(inclusion.from),
            tx_hash: format_id(inclusion.tx_hash),
            block_number: inclusion.block_number.map(|block| block as i64),
            chain_status: Some(chain_status),
            error,
            created_date: now,
            confirm_date: Some(now),
        };
        //the transaction is on chain already, a store failure must not turn into a resubmit
        match insert_settlement_tx(&self.conn, &settlement_tx).await {
            Ok(settlement_tx) => {
                if chain_status == 1 {
                    emit_relay_event(
                        &self.event_sender,
                        RelayEventContent::TransferSettled(settlement_tx),
                    )
                    .await;
                }
            }
            Err(err) => {
                log::error!(
                    "Failed to record settlement tx {:#x} of {:#x}: {}",
                    inclusion.tx_hash,
                    transfer_id,
                    err
                );
            }
        }
    }

    /// One submission, Ok(tx hash) only when the chain confirms the settled flag
    async fn attempt(
        &self,
        transfer_id: H256,
        attempt: u32,
    ) -> Result<Option<H256>, (String, Option<H256>)> {
        match self.contract.submit(transfer_id).await {
            Ok(inclusion) => {
                self.record_inclusion(transfer_id, attempt, &inclusion, 1, None)
                    .await;
                if self.is_settled(transfer_id).await {
                    Ok(Some(inclusion.tx_hash))
                } else {
                    log::warn!(
                        "Settlement tx {:#x} included but {:#x} is not settled on chain",
                        inclusion.tx_hash,
                        transfer_id
                    );
                    Err((
                        "Transaction succeeded but transfer not settled on chain".to_string(),
                        Some(inclusion.tx_hash),
                    ))
                }
            }
            Err(SubmitError::Duplicate(message)) => {
                log::info!(
                    "Transfer {:#x} reported as already processed, verifying on chain: {}",
                    transfer_id,
                    message
                );
                if self.is_settled(transfer_id).await {
                    Ok(None)
                } else {
                    Err((
                        format!("Duplicate settlement but not settled on chain: {message}"),
                        None,
                    ))
                }
            }
            Err(SubmitError::Reverted {
                tx_hash,
                from,
                block_number,
            }) => {
                let inclusion = SettlementInclusion {
                    tx_hash,
                    from,
                    block_number,
                };
                let error = SubmitError::Reverted {
                    tx_hash,
                    from,
                    block_number,
                }
                .to_string();
                self.record_inclusion(transfer_id, attempt, &inclusion, 0, Some(error.clone()))
                    .await;
                Err((error, Some(tx_hash)))
            }
            Err(err) => Err((err.to_string(), None)),
        }
    }

    /// Retries with linear backoff, the chain flag is checked before every attempt
    /// and once more after the last one. Failures are reported, never raised.
    pub async fn settle_with_retry(&self, transfer_id: H256) -> SettlementOutcome {
        let mut outcome = SettlementOutcome {
            transfer_id: format_id(transfer_id),
            success: false,
            attempts: 0,
            tx_hash: None,
            error: None,
        };
        for attempt in 1..=self.max_retries {
            if self.is_settled(transfer_id).await {
                log::info!("Transfer {:#x} already settled on chain", transfer_id);
                outcome.success = true;
                outcome.error = None;
                return outcome;
            }
            log::info!(
                "Settling {:#x}, attempt {}/{}",
                transfer_id,
                attempt,
                self.max_retries
            );
            outcome.attempts = attempt;
            match self.attempt(transfer_id, attempt).await {
                Ok(tx_hash) => {
                    if let Some(tx_hash) = tx_hash {
                        outcome.tx_hash = Some(format_id(tx_hash));
                    }
                    outcome.success = true;
                    outcome.error = None;
                    log::info!("Transfer {:#x} settled", transfer_id);
                    return outcome;
                }
                Err((error, tx_hash)) => {
                    log::warn!(
                        "Settlement attempt {} of {:#x} failed: {}",
                        attempt,
                        transfer_id,
                        error
                    );
                    if let Some(tx_hash) = tx_hash {
                        outcome.tx_hash = Some(format_id(tx_hash));
                    }
                    outcome.error = Some(error);
                }
            }
            if attempt < self.max_retries {
                tokio::time::sleep(self.retry_base_delay * attempt).await;
            }
        }

        if self.is_settled(transfer_id).await {
            log::info!("Transfer {:#x} settled on chain after retries", transfer_id);
            outcome.success = true;
            outcome.error = None;
            return outcome;
        }
        let error = outcome
            .error
            .get_or_insert_with(|| "Max retries exceeded".to_string())
            .clone();
        log::error!(
            "Failed to settle {:#x} after {} attempts: {}",
            transfer_id,
            self.max_retries,
            error
        );
        emit_relay_event(
            &self.event_sender,
            RelayEventContent::SettlementFailed(SettlementFailedInfo {
                transfer_id: outcome.transfer_id.clone(),
                attempts: outcome.attempts,
                error,
            }),
        )
        .await;
        outcome
    }

    async fn settle_guarded(&self, transfer_id: H256, guard: InFlightGuard) -> SettlementOutcome {
        let outcome = self.settle_with_retry(transfer_id).await;
        drop(guard);
        outcome
    }

    /// Settles a single transfer outside the periodic cycle
    pub async fn settle_one(&self, transfer_id: H256) -> Result<SettlementOutcome, RelayError> {
        let guard = self
            .registry
            .try_acquire(&format_id(transfer_id))
            .map_err(|err| err_custom_create!("{}", err))?;
        Ok(self.settle_guarded(transfer_id, guard).await)
    }

    async fn process_candidate(&self, transfer_id: H256) -> CandidateResult {
        let id = format_id(transfer_id);
        let guard = match self.registry.try_acquire(&id) {
            Ok(guard) => guard,
            Err(err) => {
                log::info!("Skipping {}: {}", id, err);
                return CandidateResult::InFlight;
            }
        };
        if self.is_settled(transfer_id).await {
            log::info!("Transfer {} already settled on chain, skipping", id);
            emit_relay_event(
                &self.event_sender,
                RelayEventContent::TransferAlreadySettled { transfer_id: id },
            )
            .await;
            return CandidateResult::AlreadySettled;
        }
        CandidateResult::Attempted(self.settle_guarded(transfer_id, guard).await)
    }

    /// One polling cycle. None when the previous cycle is still running.
    pub async fn run_cycle(&self) -> Result<Option<CycleReport>, RelayError> {
        let Some(_cycle) = self.registry.begin_cycle() else {
            log::info!(
                "Previous settlement cycle still running ({} in flight), skipping",
                self.registry.len()
            );
            emit_relay_event(&self.event_sender, RelayEventContent::CycleSkipped).await;
            return Ok(None);
        };

        let candidates =
            do_db_operation(|| get_transfers_by_status(&self.conn, TransferStatus::Stored, None))
                .await
                .map_err(err_from!())?;
        let mut report = CycleReport {
            candidates: candidates.len(),
            ..Default::default()
        };
        if candidates.is_empty() {
            log::debug!("No transfers waiting for settlement");
            return Ok(Some(report));
        }
        log::info!("Found {} transfer(s) to settle", candidates.len());

        let mut work = Vec::new();
        for transfer in candidates {
            let transfer_id = match parse_id(&transfer.transfer_id) {
                Ok(transfer_id) => transfer_id,
                Err(err) => {
                    log::error!("Skipping transfer with invalid id: {}", err);
                    report.failed += 1;
                    continue;
                }
            };
            if self.registry.contains(&transfer.transfer_id) {
                log::info!("Skipping {}: settlement already in flight", transfer.transfer_id);
                report.skipped_in_flight += 1;
                continue;
            }
            work.push(transfer_id);
        }

        //slots are taken per running candidate, so at most `concurrency` are held by this cycle
        let results: Vec<CandidateResult> = futures::stream::iter(work)
            .map(|transfer_id| self.process_candidate(transfer_id))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        let mut outcomes = Vec::new();
        for result in results {
            match result {
                CandidateResult::InFlight => report.skipped_in_flight += 1,
                CandidateResult::AlreadySettled => report.already_settled += 1,
                CandidateResult::Attempted(outcome) => {
                    if outcome.success {
                        report.settled += 1;
                    } else {
                        report.failed += 1;
                    }
                    outcomes.push(outcome);
                }
            }
        }
        report.outcomes = outcomes;
        log::info!(
            "Settlement cycle done: {} settled, {} failed, {} already settled, {} in flight",
            report.settled,
            report.failed,
            report.already_settled,
            report.skipped_in_flight
        );
        Ok(Some(report))
    }
}

/// Starts a cycle every `interval` on its own task. An overlapping tick finds the
/// cycle guard taken and skips. On shutdown the trigger stops and the running
/// cycle is awaited.
pub async fn run_processor(
    processor: Arc<SettlementProcessor>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    log::info!(
        "Starting settlement processor, polling every {}",
        humantime::format_duration(interval)
    );
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut running: Option<tokio::task::JoinHandle<()>> = None;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }
        let cycle_processor = processor.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = cycle_processor.run_cycle().await {
                log::error!("Settlement cycle failed: {}", err);
            }
        });
        if running.as_ref().map_or(true, |h| h.is_finished()) {
            running = Some(handle);
        }
    }
    if let Some(handle) = running {
        if !handle.is_finished() {
            log::info!("Waiting for the running settlement cycle to finish");
        }
        if let Err(err) = handle.await {
            log::error!("Settlement cycle task failed: {}", err);
        }
    }
    log::info!("Settlement processor stopped");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::ops::{get_settlement_txs_by_transfer, upsert_transfer};
    use crate::db::setup_random_memory_sqlite_conn;
    use crate::reconcile::{apply_transfer_event, StepInfo, TransferEvent, TransferUpdate};
    use chrono::DateTime;
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use parking_lot::Mutex;
    use std::collections::{HashSet, VecDeque};
    use web3::types::Address;

    /// Scripted vault: each submit pops the next response, Ok marks the transfer settled
    #[derive(Default)]
    pub struct MockVault {
        pub settled: Mutex<HashSet<H256>>,
        pub responses: Mutex<VecDeque<Result<(), SubmitError>>>,
        pub submits: Mutex<u32>,
        pub submit_delay: Mutex<Duration>,
        pub flag_unreadable: Mutex<bool>,
        /// included transactions leave the flag unset
        pub ignore_inclusion: Mutex<bool>,
        /// a duplicate answer means an earlier transaction already landed
        pub settle_on_duplicate: Mutex<bool>,
    }

    impl SettlementContract for MockVault {
        fn chain_id(&self) -> i64 {
            23295
        }

        fn is_settled(&self, transfer_id: H256) -> BoxFuture<'_, Result<bool, RelayError>> {
            async move {
                if *self.flag_unreadable.lock() {
                    return Err(err_custom_create!("node unavailable"));
                }
                Ok(self.settled.lock().contains(&transfer_id))
            }
            .boxed()
        }

        fn submit(
            &self,
            transfer_id: H256,
        ) -> BoxFuture<'_, Result<SettlementInclusion, SubmitError>> {
            async move {
                let delay = *self.submit_delay.lock();
                tokio::time::sleep(delay).await;
                let submit_no = {
                    let mut submits = self.submits.lock();
                    *submits += 1;
                    *submits
                };
                let response = self.responses.lock().pop_front().unwrap_or(Ok(()));
                if let Err(err) = response {
                    if matches!(err, SubmitError::Duplicate(_)) && *self.settle_on_duplicate.lock() {
                        self.settled.lock().insert(transfer_id);
                    }
                    return Err(err);
                }
                if !*self.ignore_inclusion.lock() {
                    self.settled.lock().insert(transfer_id);
                }
                Ok(SettlementInclusion {
                    tx_hash: H256::from_low_u64_be(submit_no as u64),
                    from: Address::repeat_byte(0x0f),
                    block_number: Some(1000 + submit_no as u64),
                })
            }
            .boxed()
        }
    }

    pub fn engine_setup(max_retries: u32) -> EngineSetup {
        EngineSetup {
            poll_interval: Duration::from_millis(50),
            index_interval: Duration::from_secs(1),
            max_retries,
            retry_base_delay: Duration::from_millis(1),
            settle_concurrency: 1,
            in_flight_capacity: 16,
            max_deferred_attempts: 10,
            default_destination_domain: 23295,
        }
    }

    pub async fn insert_stored(conn: &SqlitePool, transfer_id: H256) {
        let stored = apply_transfer_event(
            None,
            &TransferEvent {
                transfer_id,
                step: StepInfo {
                    at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
                    block: 10,
                    tx_hash: H256::repeat_byte(0x01),
                },
                update: TransferUpdate::Stored {
                    origin_domain: 5003,
                },
            },
            23295,
        );
        upsert_transfer(conn, &stored).await.unwrap();
    }

    fn processor(conn: &SqlitePool, vault: Arc<MockVault>, max_retries: u32) -> SettlementProcessor {
        SettlementProcessor::new(conn.clone(), vault, &engine_setup(max_retries), None)
    }

    #[tokio::test]
    async fn test_already_settled_is_not_submitted() -> anyhow::Result<()> {
        let conn = setup_random_memory_sqlite_conn().await;
        let vault = Arc::new(MockVault::default());
        let transfer_id = H256::repeat_byte(0xaa);
        insert_stored(&conn, transfer_id).await;
        vault.settled.lock().insert(transfer_id);

        let report = processor(&conn, vault.clone(), 3).run_cycle().await?.unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.already_settled, 1);
        assert!(report.outcomes.is_empty());
        assert_eq!(*vault.submits.lock(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_two_transient_failures_then_success() -> anyhow::Result<()> {
        let conn = setup_random_memory_sqlite_conn().await;
        let vault = Arc::new(MockVault::default());
        let transfer_id = H256::repeat_byte(0xaa);
        insert_stored(&conn, transfer_id).await;
        vault.responses.lock().extend([
            Err(SubmitError::Transient("timeout".to_string())),
            Err(SubmitError::Transient("nonce too low".to_string())),
        ]);

        let report = processor(&conn, vault.clone(), 5).run_cycle().await?.unwrap();
        assert_eq!(report.settled, 1);
        let outcome = &report.outcomes[0];
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.tx_hash, Some(format_id(H256::from_low_u64_be(3))));
        assert_eq!(*vault.submits.lock(), 3);

        let txs = get_settlement_txs_by_transfer(&conn, &format_id(transfer_id)).await?;
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].attempt, 3);
        assert_eq!(txs[0].chain_status, Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_skipped() -> anyhow::Result<()> {
        let conn = setup_random_memory_sqlite_conn().await;
        let vault = Arc::new(MockVault::default());
        *vault.submit_delay.lock() = Duration::from_millis(300);
        insert_stored(&conn, H256::repeat_byte(0xaa)).await;
        let processor = Arc::new(processor(&conn, vault.clone(), 3));

        let first = tokio::spawn({
            let processor = processor.clone();
            async move { processor.run_cycle().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(processor.registry().is_cycle_active());
        assert_eq!(processor.run_cycle().await?, None);

        let report = first.await??.unwrap();
        assert_eq!(report.settled, 1);
        assert_eq!(*vault.submits.lock(), 1);
        assert!(processor.registry().is_empty());
        assert!(!processor.registry().is_cycle_active());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_error_verified_on_chain() -> anyhow::Result<()> {
        let conn = setup_random_memory_sqlite_conn().await;
        let vault = Arc::new(MockVault::default());
        let transfer_id = H256::repeat_byte(0xaa);
        *vault.settle_on_duplicate.lock() = true;
        vault
            .responses
            .lock()
            .push_back(Err(SubmitError::classify("execution reverted: already processed")));

        let processor = processor(&conn, vault.clone(), 3);
        let outcome = processor.settle_with_retry(transfer_id).await;
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.tx_hash, None);
        assert!(get_settlement_txs_by_transfer(&conn, &format_id(transfer_id))
            .await?
            .is_empty());

        //duplicate answer without the flag is a failure eligible for retry
        let other_id = H256::repeat_byte(0xbb);
        *vault.settle_on_duplicate.lock() = false;
        *vault.ignore_inclusion.lock() = true;
        vault
            .responses
            .lock()
            .push_back(Err(SubmitError::classify("Duplicate transaction")));
        let processor = SettlementProcessor::new(conn.clone(), vault.clone(), &engine_setup(1), None);
        let outcome = processor.settle_with_retry(other_id).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("not settled"));
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_flag_counts_as_not_settled() -> anyhow::Result<()> {
        let conn = setup_random_memory_sqlite_conn().await;
        let vault = Arc::new(MockVault::default());
        let transfer_id = H256::repeat_byte(0xaa);
        insert_stored(&conn, transfer_id).await;
        vault.settled.lock().insert(transfer_id);
        *vault.flag_unreadable.lock() = true;

        let report = processor(&conn, vault.clone(), 1).run_cycle().await?.unwrap();
        assert_eq!(report.already_settled, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(*vault.submits.lock(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_included_but_unverified_exhausts_retries() -> anyhow::Result<()> {
        let conn = setup_random_memory_sqlite_conn().await;
        let vault = Arc::new(MockVault::default());
        *vault.ignore_inclusion.lock() = true;
        let transfer_id = H256::repeat_byte(0xaa);
        insert_stored(&conn, transfer_id).await;

        let report = processor(&conn, vault.clone(), 2).run_cycle().await?.unwrap();
        assert_eq!(report.failed, 1);
        let outcome = &report.outcomes[0];
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 2);
        //each inclusion is recorded, the transfer stays eligible
        let txs = get_settlement_txs_by_transfer(&conn, &format_id(transfer_id)).await?;
        assert_eq!(txs.len(), 2);
        assert!(processor(&conn, vault, 2).run_cycle().await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_failing_transfers_do_not_starve_later_candidates() -> anyhow::Result<()> {
        let conn = setup_random_memory_sqlite_conn().await;
        let vault = Arc::new(MockVault::default());
        *vault.ignore_inclusion.lock() = true;
        let ids = [
            H256::repeat_byte(0x01),
            H256::repeat_byte(0x02),
            H256::repeat_byte(0x03),
        ];
        for id in ids {
            insert_stored(&conn, id).await;
        }
        let mut setup = engine_setup(1);
        setup.in_flight_capacity = 2;
        let processor = SettlementProcessor::new(conn.clone(), vault.clone(), &setup, None);

        for cycle in 1..=2u32 {
            let report = processor.run_cycle().await?.unwrap();
            assert_eq!(report.candidates, 3);
            assert_eq!(report.skipped_in_flight, 0);
            assert_eq!(report.failed, 3);
            assert_eq!(*vault.submits.lock(), 3 * cycle);
        }
        for id in ids {
            assert_eq!(
                get_settlement_txs_by_transfer(&conn, &format_id(id)).await?.len(),
                2
            );
        }
        assert!(processor.registry().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_processor_loop_finishes_running_cycle_on_shutdown() -> anyhow::Result<()> {
        let conn = setup_random_memory_sqlite_conn().await;
        let vault = Arc::new(MockVault::default());
        *vault.submit_delay.lock() = Duration::from_millis(300);
        let transfer_id = H256::repeat_byte(0xaa);
        insert_stored(&conn, transfer_id).await;
        let (sender, mut receiver) = mpsc::channel(100);
        let processor = Arc::new(SettlementProcessor::new(
            conn.clone(),
            vault.clone(),
            &engine_setup(3),
            Some(sender),
        ));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_processor(
            processor.clone(),
            Duration::from_millis(50),
            shutdown_rx,
        ));
        //first tick starts the cycle, later ticks overlap with it
        tokio::time::sleep(Duration::from_millis(130)).await;
        assert!(processor.registry().is_cycle_active());
        assert_eq!(*vault.submits.lock(), 0);
        shutdown.send(true)?;

        tokio::time::timeout(Duration::from_secs(5), task).await??;
        assert_eq!(*vault.submits.lock(), 1);
        assert!(vault.settled.lock().contains(&transfer_id));
        assert!(!processor.registry().is_cycle_active());
        assert_eq!(
            get_settlement_txs_by_transfer(&conn, &format_id(transfer_id))
                .await?
                .len(),
            1
        );

        drop(processor);
        let mut skipped = 0;
        let mut settled = 0;
        while let Ok(event) = receiver.try_recv() {
            match event.content {
                RelayEventContent::CycleSkipped => skipped += 1,
                RelayEventContent::TransferSettled(_) => settled += 1,
                _ => {}
            }
        }
        assert!(skipped >= 1);
        assert_eq!(settled, 1);
        Ok(())
    }
}
