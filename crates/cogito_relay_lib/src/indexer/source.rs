use crate::error::RelayError;
use crate::eth::{get_block_timestamp, get_latest_block_number, TransactionCall};
use crate::{err_custom_create, err_from};
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use web3::transports::Http;
use web3::types::{Address, BlockNumber, FilterBuilder, Log, TransactionId, H256, U64};
use web3::Web3;

/// Read side of one chain as seen by the indexer
pub trait LogSource: Send + Sync {
    fn latest_block(&self) -> BoxFuture<'_, Result<u64, RelayError>>;

    fn logs(
        &self,
        contract: Address,
        topics: Vec<H256>,
        from_block: u64,
        to_block: u64,
    ) -> BoxFuture<'_, Result<Vec<Log>, RelayError>>;

    fn block_timestamp(&self, block_number: u64) -> BoxFuture<'_, Result<DateTime<Utc>, RelayError>>;

    fn transaction(&self, tx_hash: H256)
        -> BoxFuture<'_, Result<Option<TransactionCall>, RelayError>>;
}

pub struct Web3LogSource {
    web3: Web3<Http>,
}

impl Web3LogSource {
    pub fn new(web3: Web3<Http>) -> Self {
        Self { web3 }
    }
}

impl LogSource for Web3LogSource {
    fn latest_block(&self) -> BoxFuture<'_, Result<u64, RelayError>> {
        get_latest_block_number(&self.web3).boxed()
    }

    fn logs(
        &self,
        contract: Address,
        topics: Vec<H256>,
        from_block: u64,
        to_block: u64,
    ) -> BoxFuture<'_, Result<Vec<Log>, RelayError>> {
        async move {
            let filter = FilterBuilder::default()
                .address(vec![contract])
                .topics(Some(topics), None, None, None)
                .from_block(BlockNumber::Number(U64::from(from_block)))
                .to_block(BlockNumber::Number(U64::from(to_block)))
                .build();
            self.web3.eth().logs(filter).await.map_err(|e| {
                err_custom_create!(
                    "Error while getting logs {}-{}: {}",
                    from_block,
                    to_block,
                    e
                )
            })
        }
        .boxed()
    }

    fn block_timestamp(&self, block_number: u64) -> BoxFuture<'_, Result<DateTime<Utc>, RelayError>> {
        get_block_timestamp(&self.web3, block_number).boxed()
    }

    fn transaction(
        &self,
        tx_hash: H256,
    ) -> BoxFuture<'_, Result<Option<TransactionCall>, RelayError>> {
        async move {
            let tx = self
                .web3
                .eth()
                .transaction(TransactionId::Hash(tx_hash))
                .await
                .map_err(err_from!())?;
            Ok(tx.and_then(|tx| {
                tx.from.map(|from| TransactionCall {
                    from,
                    input: tx.input.0,
                })
            }))
        }
        .boxed()
    }
}
