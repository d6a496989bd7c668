//! Recovers transfer identifiers from the ciphertext commitment carried by source chain
//! events. Every lookup fails soft: missing data is reported, never raised.

mod decode;

pub use decode::*;

use crate::chain_events::EventContext;
use crate::eth::{IngressReader, TransactionCall};
use std::sync::Arc;
use web3::types::{Address, H256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTransfer {
    pub transfer_id: H256,
    /// zero when neither the contract nor the transaction gave a sender
    pub sender: Address,
    pub destination_domain: u32,
    pub deposit_id: Option<H256>,
    /// false when `transfers()` could not be read and defaults were used
    pub metadata_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedTransfer),
    /// the contract has no transfer for this commitment (yet)
    Unmapped,
    /// the lookup itself failed
    Unavailable(String),
}

pub struct IdentifierResolver {
    reader: Arc<dyn IngressReader>,
    decoders: Vec<Box<dyn DepositIdDecoder>>,
    default_destination_domain: u32,
}

impl IdentifierResolver {
    pub fn new(reader: Arc<dyn IngressReader>, default_destination_domain: u32) -> Self {
        Self::with_decoders(reader, default_decoders(), default_destination_domain)
    }

    pub fn with_decoders(
        reader: Arc<dyn IngressReader>,
        decoders: Vec<Box<dyn DepositIdDecoder>>,
        default_destination_domain: u32,
    ) -> Self {
        Self {
            reader,
            decoders,
            default_destination_domain,
        }
    }

    pub async fn resolve_transfer_id(&self, encrypted_data_hash: H256) -> Resolution {
        match self.reader.transfer_id_by_commitment(encrypted_data_hash).await {
            Ok(Some(transfer_id)) => Resolution::Resolved(ResolvedTransfer {
                transfer_id,
                sender: Address::zero(),
                destination_domain: self.default_destination_domain,
                deposit_id: None,
                metadata_complete: false,
            }),
            Ok(None) => Resolution::Unmapped,
            Err(err) => {
                log::warn!(
                    "Failed to map commitment {:#x} to a transfer id: {}",
                    encrypted_data_hash,
                    err
                );
                Resolution::Unavailable(err.to_string())
            }
        }
    }

    /// Full identifier set for a commitment observed in `context`
    pub async fn resolve_commitment(
        &self,
        encrypted_data_hash: H256,
        context: &EventContext,
    ) -> Resolution {
        let mut resolved = match self.resolve_transfer_id(encrypted_data_hash).await {
            Resolution::Resolved(resolved) => resolved,
            other => return other,
        };
        let transfer_id = resolved.transfer_id;

        let call = self.transaction_call(context).await;
        let fallback_sender = context
            .tx_sender
            .or(call.as_ref().map(|call| call.from))
            .unwrap_or_default();

        match self.reader.transfer_metadata(transfer_id).await {
            Ok(Some(metadata)) => {
                resolved.sender = metadata.sender;
                resolved.destination_domain = metadata.destination_domain;
                resolved.metadata_complete = true;
            }
            Ok(None) => {
                log::info!(
                    "Transfer {:#x} has no metadata yet, using transaction sender",
                    transfer_id
                );
                resolved.sender = fallback_sender;
            }
            Err(err) => {
                log::warn!(
                    "Failed to read metadata of transfer {:#x}, using defaults: {}",
                    transfer_id,
                    err
                );
                resolved.sender = fallback_sender;
            }
        }

        resolved.deposit_id = match call.as_ref().map(|call| self.decode(transfer_id, call)) {
            Some(Some(deposit_id)) => Some(deposit_id),
            _ => self.lookup_deposit_id(transfer_id).await,
        };
        Resolution::Resolved(resolved)
    }

    /// Contract side mapping, used when the call data gave nothing
    pub async fn lookup_deposit_id(&self, transfer_id: H256) -> Option<H256> {
        match self.reader.deposit_id_for_transfer(transfer_id).await {
            Ok(deposit_id) => deposit_id,
            Err(err) => {
                log::warn!(
                    "Failed to read deposit id of transfer {:#x}: {}",
                    transfer_id,
                    err
                );
                None
            }
        }
    }

    fn decode(&self, transfer_id: H256, call: &TransactionCall) -> Option<H256> {
        match decode_deposit_id(&self.decoders, &call.input) {
            DepositIdDecode::Resolved {
                deposit_id,
                strategy,
            } => {
                log::debug!(
                    "Deposit id of transfer {:#x} decoded with {} strategy",
                    transfer_id,
                    strategy
                );
                Some(deposit_id)
            }
            DepositIdDecode::Conflict(results) => {
                log::warn!(
                    "Deposit id strategies disagree for transfer {:#x}: {:?}",
                    transfer_id,
                    results
                );
                None
            }
            DepositIdDecode::Unresolved => None,
        }
    }

    async fn transaction_call(&self, context: &EventContext) -> Option<TransactionCall> {
        if let (Some(from), Some(input)) = (context.tx_sender, context.tx_input.as_ref()) {
            return Some(TransactionCall {
                from,
                input: input.0.clone(),
            });
        }
        match self.reader.transaction_call(context.tx_hash).await {
            Ok(call) => call,
            Err(err) => {
                log::warn!(
                    "Failed to fetch transaction {:#x}: {}",
                    context.tx_hash,
                    err
                );
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    pub use super::decode::tests::initiate_transfer_input;
    use super::*;
    use crate::err_custom_create;
    use crate::error::RelayError;
    use crate::eth::TransferMetadata;
    use chrono::{DateTime, Utc};
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use web3::types::{Bytes, U256};

    /// In-memory ingress contract, `fail_rpc` turns every call into an error
    #[derive(Default)]
    pub struct MockIngress {
        pub transfer_ids: Mutex<HashMap<H256, H256>>,
        pub metadata: Mutex<HashMap<H256, TransferMetadata>>,
        pub deposit_ids: Mutex<HashMap<H256, H256>>,
        pub transactions: Mutex<HashMap<H256, TransactionCall>>,
        pub fail_rpc: Mutex<bool>,
    }

    impl MockIngress {
        pub fn map_transfer(&self, commitment: H256, transfer_id: H256, sender: Address) {
            self.transfer_ids
                .lock()
                .unwrap()
                .insert(commitment, transfer_id);
            self.metadata.lock().unwrap().insert(
                transfer_id,
                TransferMetadata {
                    sender,
                    destination_domain: 23295,
                    dispatched_at: U256::from(1),
                    acknowledged: false,
                },
            );
        }

        fn check(&self) -> Result<(), RelayError> {
            if *self.fail_rpc.lock().unwrap() {
                Err(err_custom_create!("rpc unavailable"))
            } else {
                Ok(())
            }
        }
    }

    impl IngressReader for MockIngress {
        fn transfer_id_by_commitment(
            &self,
            encrypted_data_hash: H256,
        ) -> BoxFuture<'_, Result<Option<H256>, RelayError>> {
            async move {
                self.check()?;
                Ok(self
                    .transfer_ids
                    .lock()
                    .unwrap()
                    .get(&encrypted_data_hash)
                    .copied())
            }
            .boxed()
        }

        fn transfer_metadata(
            &self,
            transfer_id: H256,
        ) -> BoxFuture<'_, Result<Option<TransferMetadata>, RelayError>> {
            async move {
                self.check()?;
                Ok(self.metadata.lock().unwrap().get(&transfer_id).cloned())
            }
            .boxed()
        }

        fn deposit_id_for_transfer(
            &self,
            transfer_id: H256,
        ) -> BoxFuture<'_, Result<Option<H256>, RelayError>> {
            async move {
                self.check()?;
                Ok(self.deposit_ids.lock().unwrap().get(&transfer_id).copied())
            }
            .boxed()
        }

        fn transaction_call(
            &self,
            tx_hash: H256,
        ) -> BoxFuture<'_, Result<Option<TransactionCall>, RelayError>> {
            async move {
                self.check()?;
                Ok(self.transactions.lock().unwrap().get(&tx_hash).cloned())
            }
            .boxed()
        }
    }

    fn context(tx_input: Option<Vec<u8>>) -> EventContext {
        EventContext {
            chain_id: 5003,
            block_number: 10,
            block_timestamp: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
            tx_hash: H256::repeat_byte(0x01),
            log_index: 0,
            tx_sender: Some(Address::repeat_byte(0x99)),
            tx_input: tx_input.map(Bytes),
        }
    }

    #[tokio::test]
    async fn test_resolve_full_identifier_set() {
        let reader = Arc::new(MockIngress::default());
        let sender = Address::repeat_byte(0x11);
        reader.map_transfer(H256::repeat_byte(0xcc), H256::repeat_byte(0xaa), sender);
        let resolver = IdentifierResolver::new(reader, 23295);

        let input = initiate_transfer_input(H256::repeat_byte(0xd1));
        let res = resolver
            .resolve_commitment(H256::repeat_byte(0xcc), &context(Some(input)))
            .await;
        assert_eq!(
            res,
            Resolution::Resolved(ResolvedTransfer {
                transfer_id: H256::repeat_byte(0xaa),
                sender,
                destination_domain: 23295,
                deposit_id: Some(H256::repeat_byte(0xd1)),
                metadata_complete: true,
            })
        );
    }

    #[tokio::test]
    async fn test_unmapped_commitment_is_soft() {
        let reader = Arc::new(MockIngress::default());
        let resolver = IdentifierResolver::new(reader.clone(), 23295);
        assert_eq!(
            resolver
                .resolve_commitment(H256::repeat_byte(0xcc), &context(None))
                .await,
            Resolution::Unmapped
        );

        *reader.fail_rpc.lock().unwrap() = true;
        assert!(matches!(
            resolver
                .resolve_commitment(H256::repeat_byte(0xcc), &context(None))
                .await,
            Resolution::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_degraded_resolution_uses_defaults() {
        let reader = Arc::new(MockIngress::default());
        reader
            .transfer_ids
            .lock()
            .unwrap()
            .insert(H256::repeat_byte(0xcc), H256::repeat_byte(0xaa));
        reader
            .deposit_ids
            .lock()
            .unwrap()
            .insert(H256::repeat_byte(0xaa), H256::repeat_byte(0xd7));
        let resolver = IdentifierResolver::new(reader, 42);

        //call data is garbage, metadata missing: tx sender, default domain, contract mapping
        let res = resolver
            .resolve_commitment(H256::repeat_byte(0xcc), &context(Some(vec![1, 2, 3])))
            .await;
        assert_eq!(
            res,
            Resolution::Resolved(ResolvedTransfer {
                transfer_id: H256::repeat_byte(0xaa),
                sender: Address::repeat_byte(0x99),
                destination_domain: 42,
                deposit_id: Some(H256::repeat_byte(0xd7)),
                metadata_complete: false,
            })
        );
    }
}
