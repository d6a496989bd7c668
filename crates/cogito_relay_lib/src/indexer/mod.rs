//! Sequential log scanner, one per chain. Windows are applied in block order and the
//! scan cursor only moves once a whole window went through the reconcile engine.

mod source;

pub use source::{LogSource, Web3LogSource};

use crate::chain_events::{decode_log, ChainEvent, ContractSide, EventContext};
use crate::db::model::ScanDaoDbObj;
use crate::db::ops::{get_scan_info, upsert_scan_info};
use crate::error::RelayError;
use crate::eth::TransactionCall;
use crate::reconcile::{HandleOutcome, ReconcileEngine};
use crate::setup::ChainSetup;
use crate::{err_custom_create, err_from};
use chrono::{DateTime, Utc};
use cogito_relay_common::{emit_relay_event, RelayEvent, RelayEventContent, WindowIndexedInfo};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use web3::types::{Address, Bytes, Log, H256};

pub struct ChainIndexer {
    pub side: ContractSide,
    pub chain_id: i64,
    pub contract: Address,
    pub start_block: u64,
    pub block_range: u64,
    pub confirmation_blocks: u64,
    pub max_deferred_attempts: i64,
    source: Arc<dyn LogSource>,
    engine: Arc<ReconcileEngine>,
    conn: SqlitePool,
    event_sender: Option<mpsc::Sender<RelayEvent>>,
}

impl ChainIndexer {
    pub fn new(
        side: ContractSide,
        chain: &ChainSetup,
        max_deferred_attempts: i64,
        source: Arc<dyn LogSource>,
        engine: Arc<ReconcileEngine>,
        conn: SqlitePool,
        event_sender: Option<mpsc::Sender<RelayEvent>>,
    ) -> Self {
        Self {
            side,
            chain_id: chain.chain_id,
            contract: chain.contract_address,
            start_block: chain.start_block,
            block_range: chain.block_range,
            confirmation_blocks: chain.confirmation_blocks,
            max_deferred_attempts,
            source,
            engine,
            conn,
            event_sender,
        }
    }

    async fn load_cursor(&self) -> Result<ScanDaoDbObj, RelayError> {
        let scan_info = get_scan_info(&self.conn, self.chain_id, self.side.filter_name())
            .await
            .map_err(err_from!())?;
        Ok(scan_info.unwrap_or_else(|| ScanDaoDbObj {
            id: 0,
            chain_id: self.chain_id,
            filter: self.side.filter_name().to_string(),
            start_block: self.start_block as i64,
            last_block: -1,
        }))
    }

    /// Retries deferred events, then indexes at most one window.
    /// Returns None when the chain head was already reached.
    pub async fn index_pass(&self) -> Result<Option<WindowIndexedInfo>, RelayError> {
        let report = self
            .engine
            .retry_deferred(self.chain_id, self.max_deferred_attempts)
            .await?;
        if report.applied > 0 || report.dropped > 0 {
            log::info!(
                "Deferred events on chain {}: {} applied, {} dropped, {} still waiting",
                self.chain_id,
                report.applied,
                report.dropped,
                report.still_deferred
            );
        }

        let mut cursor = self.load_cursor().await?;
        let from_block = if cursor.last_block >= 0 {
            cursor.last_block as u64 + 1
        } else {
            self.start_block
        };
        let latest = self.source.latest_block().await?;
        let head = latest.saturating_sub(self.confirmation_blocks);
        if from_block > head {
            log::debug!(
                "Chain {} {} indexer is at head {} (latest {})",
                self.chain_id,
                self.side.filter_name(),
                head,
                latest
            );
            return Ok(None);
        }
        let to_block = std::cmp::min(from_block + self.block_range - 1, head);

        let info = self.index_window(from_block, to_block).await?;

        cursor.last_block = to_block as i64;
        upsert_scan_info(&self.conn, &cursor)
            .await
            .map_err(err_from!())?;
        emit_relay_event(
            &self.event_sender,
            RelayEventContent::WindowIndexed(info.clone()),
        )
        .await;
        Ok(Some(info))
    }

    /// Runs passes until the head is reached
    pub async fn index_to_head(&self) -> Result<Vec<WindowIndexedInfo>, RelayError> {
        let mut windows = Vec::new();
        while let Some(info) = self.index_pass().await? {
            windows.push(info);
        }
        Ok(windows)
    }

    async fn index_window(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<WindowIndexedInfo, RelayError> {
        let mut logs = self
            .source
            .logs(
                self.contract,
                self.side.event_topics()?,
                from_block,
                to_block,
            )
            .await?;
        logs.retain(|log| log.removed != Some(true));
        logs.sort_by_key(|log| (log.block_number, log.log_index));

        let mut info = WindowIndexedInfo {
            chain_id: self.chain_id,
            from_block,
            to_block,
            applied: 0,
            deferred: 0,
            failed: 0,
        };
        let mut timestamps: HashMap<u64, DateTime<Utc>> = HashMap::new();
        let mut transactions: HashMap<H256, Option<TransactionCall>> = HashMap::new();

        for log in &logs {
            let event = match self.to_event(log, &mut timestamps, &mut transactions).await {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(err) if err.is_store_error() => return Err(err),
                Err(err) => {
                    log::warn!(
                        "Cannot decode log {:?} of tx {:?}: {}",
                        log.log_index,
                        log.transaction_hash,
                        err
                    );
                    info.failed += 1;
                    continue;
                }
            };
            match self.engine.apply_event(&event).await {
                Ok(HandleOutcome::Deferred(_)) => info.deferred += 1,
                Ok(_) => info.applied += 1,
                Err(err) if err.is_store_error() => {
                    log::error!(
                        "Store failure at block {}, window {}-{} will be rescanned: {}",
                        event.context.block_number,
                        from_block,
                        to_block,
                        err
                    );
                    return Err(err);
                }
                Err(err) => {
                    log::error!(
                        "Failed to apply {} from tx {:#x}: {}",
                        event.kind.name(),
                        event.context.tx_hash,
                        err
                    );
                    info.failed += 1;
                }
            }
        }
        log::info!(
            "Indexed {} blocks {}-{}: {} applied, {} deferred, {} failed",
            self.side.filter_name(),
            from_block,
            to_block,
            info.applied,
            info.deferred,
            info.failed
        );
        Ok(info)
    }

    async fn to_event(
        &self,
        log: &Log,
        timestamps: &mut HashMap<u64, DateTime<Utc>>,
        transactions: &mut HashMap<H256, Option<TransactionCall>>,
    ) -> Result<Option<ChainEvent>, RelayError> {
        let Some(kind) = decode_log(self.side, log)? else {
            return Ok(None);
        };
        let (Some(block_number), Some(tx_hash), Some(log_index)) =
            (log.block_number, log.transaction_hash, log.log_index)
        else {
            return Err(err_custom_create!("Log of {} is not mined yet", kind.name()));
        };
        let block_number = block_number.as_u64();

        let block_timestamp = match timestamps.get(&block_number) {
            Some(timestamp) => *timestamp,
            None => {
                let timestamp = self.source.block_timestamp(block_number).await?;
                timestamps.insert(block_number, timestamp);
                timestamp
            }
        };

        let mut context = EventContext {
            chain_id: self.chain_id,
            block_number,
            block_timestamp,
            tx_hash,
            log_index: log_index.as_u64(),
            tx_sender: None,
            tx_input: None,
        };
        if kind.needs_transaction() {
            if !transactions.contains_key(&tx_hash) {
                let call = match self.source.transaction(tx_hash).await {
                    Ok(call) => call,
                    Err(err) => {
                        log::warn!("Failed to fetch transaction {:#x}: {}", tx_hash, err);
                        None
                    }
                };
                transactions.insert(tx_hash, call);
            }
            if let Some(Some(call)) = transactions.get(&tx_hash) {
                context.tx_sender = Some(call.from);
                context.tx_input = Some(Bytes(call.input.clone()));
            }
        }
        Ok(Some(ChainEvent { context, kind }))
    }
}

/// Indexes until the head, then waits `interval`, until shutdown is signalled.
/// Errors end the current pass only.
pub async fn run_indexer(
    indexer: Arc<ChainIndexer>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    log::info!(
        "Starting {} indexer for chain {} (contract {:#x})",
        indexer.side.filter_name(),
        indexer.chain_id,
        indexer.contract
    );
    loop {
        if *shutdown.borrow() {
            break;
        }
        if let Err(err) = indexer.index_to_head().await {
            log::error!(
                "Indexer of chain {} failed, retrying in {:?}: {}",
                indexer.chain_id,
                interval,
                err
            );
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {}
        }
    }
    log::info!("Indexer of chain {} stopped", indexer.chain_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_events::tests::log_with;
    use crate::db::ops::get_transfer;
    use crate::db::setup_random_memory_sqlite_conn;
    use crate::reconcile::tests::engine;
    use crate::resolver::tests::{initiate_transfer_input, MockIngress};
    use crate::utils::format_id;
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use std::sync::Mutex;
    use web3::ethabi::Token;
    use web3::types::{U256, U64};

    #[derive(Default)]
    struct MockSource {
        latest: Mutex<u64>,
        logs: Mutex<Vec<Log>>,
        transactions: Mutex<HashMap<H256, TransactionCall>>,
        fail_logs: Mutex<bool>,
        timestamp_calls: Mutex<usize>,
    }

    impl LogSource for MockSource {
        fn latest_block(&self) -> BoxFuture<'_, Result<u64, RelayError>> {
            async move { Ok(*self.latest.lock().unwrap()) }.boxed()
        }

        fn logs(
            &self,
            _contract: Address,
            _topics: Vec<H256>,
            from_block: u64,
            to_block: u64,
        ) -> BoxFuture<'_, Result<Vec<Log>, RelayError>> {
            async move {
                if *self.fail_logs.lock().unwrap() {
                    return Err(err_custom_create!("rpc down"));
                }
                Ok(self
                    .logs
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|log| {
                        let block = log.block_number.unwrap().as_u64();
                        block >= from_block && block <= to_block
                    })
                    .cloned()
                    .collect())
            }
            .boxed()
        }

        fn block_timestamp(
            &self,
            block_number: u64,
        ) -> BoxFuture<'_, Result<DateTime<Utc>, RelayError>> {
            async move {
                *self.timestamp_calls.lock().unwrap() += 1;
                Ok(DateTime::<Utc>::from_timestamp(1_700_000_000 + block_number as i64, 0).unwrap())
            }
            .boxed()
        }

        fn transaction(
            &self,
            tx_hash: H256,
        ) -> BoxFuture<'_, Result<Option<TransactionCall>, RelayError>> {
            async move { Ok(self.transactions.lock().unwrap().get(&tx_hash).cloned()) }.boxed()
        }
    }

    fn mined(mut log: Log, block: u64, log_index: u64, tx: u8) -> Log {
        log.block_number = Some(U64::from(block));
        log.log_index = Some(U256::from(log_index));
        log.transaction_hash = Some(H256::repeat_byte(tx));
        log
    }

    fn test_chain(conn: &SqlitePool, source: Arc<MockSource>, reader: Arc<MockIngress>) -> ChainIndexer {
        ChainIndexer {
            side: ContractSide::Ingress,
            chain_id: 5003,
            contract: Address::repeat_byte(0x42),
            start_block: 10,
            block_range: 5,
            confirmation_blocks: 2,
            max_deferred_attempts: 10,
            source,
            engine: Arc::new(engine(conn, reader)),
            conn: conn.clone(),
            event_sender: None,
        }
    }

    #[tokio::test]
    async fn test_windows_advance_cursor_to_confirmed_head() -> anyhow::Result<()> {
        let conn = setup_random_memory_sqlite_conn().await;
        let source = Arc::new(MockSource::default());
        *source.latest.lock().unwrap() = 24;
        let reader = Arc::new(MockIngress::default());
        let deposit_id = H256::repeat_byte(0xd1);
        let commitment = H256::repeat_byte(0xcc);
        reader.map_transfer(commitment, H256::repeat_byte(0xaa), Address::repeat_byte(0x11));
        source.transactions.lock().unwrap().insert(
            H256::repeat_byte(0x02),
            TransactionCall {
                from: Address::repeat_byte(0x11),
                input: initiate_transfer_input(deposit_id),
            },
        );
        //out of order inside the window on purpose
        *source.logs.lock().unwrap() = vec![
            mined(
                log_with(
                    ContractSide::Ingress,
                    "EncryptedInstructionsReceived",
                    vec![commitment],
                    vec![],
                ),
                12,
                3,
                0x02,
            ),
            mined(
                log_with(
                    ContractSide::Ingress,
                    "DepositCreated",
                    vec![deposit_id, H256::from(Address::repeat_byte(0x11))],
                    vec![
                        Token::Address(Address::zero()),
                        Token::Uint(U256::from(1000)),
                        Token::Bool(true),
                    ],
                ),
                12,
                1,
                0x01,
            ),
        ];

        let indexer = test_chain(&conn, source.clone(), reader);
        let windows = indexer.index_to_head().await?;
        //10-14, 15-19, 20-22
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].applied, 2);
        assert_eq!(windows[2].to_block, 22);
        assert_eq!(*source.timestamp_calls.lock().unwrap(), 1);

        let cursor = get_scan_info(&conn, 5003, "ingress").await?.unwrap();
        assert_eq!(cursor.last_block, 22);
        assert_eq!(cursor.start_block, 10);

        let transfer = get_transfer(&conn, &format_id(H256::repeat_byte(0xaa)))
            .await?
            .unwrap();
        assert_eq!(transfer.deposit_id, format_id(deposit_id));
        assert!(indexer.index_pass().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_rpc_failure_keeps_cursor() -> anyhow::Result<()> {
        let conn = setup_random_memory_sqlite_conn().await;
        let source = Arc::new(MockSource::default());
        *source.latest.lock().unwrap() = 100;
        *source.fail_logs.lock().unwrap() = true;
        let indexer = test_chain(&conn, source.clone(), Arc::new(MockIngress::default()));

        assert!(indexer.index_pass().await.is_err());
        assert!(get_scan_info(&conn, 5003, "ingress").await?.is_none());

        *source.fail_logs.lock().unwrap() = false;
        let info = indexer.index_pass().await?.unwrap();
        assert_eq!((info.from_block, info.to_block), (10, 14));
        Ok(())
    }

    async fn wait_for_cursor(conn: &SqlitePool, block: i64) -> anyhow::Result<()> {
        for _ in 0..200 {
            if let Some(cursor) = get_scan_info(conn, 5003, "ingress").await? {
                if cursor.last_block >= block {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        anyhow::bail!("cursor did not reach block {block}")
    }

    #[tokio::test]
    async fn test_indexer_loop_follows_head_until_shutdown() -> anyhow::Result<()> {
        let conn = setup_random_memory_sqlite_conn().await;
        let source = Arc::new(MockSource::default());
        *source.latest.lock().unwrap() = 24;
        let indexer = Arc::new(test_chain(
            &conn,
            source.clone(),
            Arc::new(MockIngress::default()),
        ));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_indexer(
            indexer,
            Duration::from_millis(20),
            shutdown_rx,
        ));
        wait_for_cursor(&conn, 22).await?;

        *source.latest.lock().unwrap() = 32;
        wait_for_cursor(&conn, 30).await?;

        shutdown.send(true)?;
        tokio::time::timeout(Duration::from_secs(5), task).await??;
        let cursor = get_scan_info(&conn, 5003, "ingress").await?.unwrap();
        assert_eq!(cursor.last_block, 30);
        Ok(())
    }
}
