use crate::contracts::{
    contract_decode_output, encode_get_transfer_id_by_ciphertext_hash,
    encode_transfer_to_deposit_id, encode_transfers, INGRESS_CONTRACT_TEMPLATE,
};
use crate::error::*;
use crate::utils::datetime_from_u256_timestamp;
use crate::{err_custom_create, err_from};
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use secp256k1::{PublicKey, SecretKey};
use serde::Serialize;
use sha3::Digest;
use sha3::Keccak256;
use web3::ethabi::Token;
use web3::transports::Http;
use web3::types::{Address, BlockId, BlockNumber, Bytes, CallRequest, TransactionId, H256, U256};
use web3::Web3;

pub fn get_eth_addr_from_secret(secret_key: &SecretKey) -> Address {
    Address::from_slice(
        &Keccak256::digest(
            &PublicKey::from_secret_key(&secp256k1::Secp256k1::new(), secret_key)
                .serialize_uncompressed()[1..65],
        )
        .as_slice()[12..],
    )
}

/// `transfers(bytes32)` view of the ingress contract
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferMetadata {
    pub sender: Address,
    pub destination_domain: u32,
    pub dispatched_at: U256,
    pub acknowledged: bool,
}

/// Sender and raw call data of the transaction that emitted an event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionCall {
    pub from: Address,
    pub input: Vec<u8>,
}

/// Read-only view of the source chain contract used for identifier resolution.
/// Zero values returned by the contract mean "not mapped" and come back as None.
pub trait IngressReader: Send + Sync {
    fn transfer_id_by_commitment(
        &self,
        encrypted_data_hash: H256,
    ) -> BoxFuture<'_, Result<Option<H256>, RelayError>>;

    fn transfer_metadata(
        &self,
        transfer_id: H256,
    ) -> BoxFuture<'_, Result<Option<TransferMetadata>, RelayError>>;

    fn deposit_id_for_transfer(
        &self,
        transfer_id: H256,
    ) -> BoxFuture<'_, Result<Option<H256>, RelayError>>;

    fn transaction_call(
        &self,
        tx_hash: H256,
    ) -> BoxFuture<'_, Result<Option<TransactionCall>, RelayError>>;
}

pub async fn eth_call(web3: &Web3<Http>, to: Address, data: Vec<u8>) -> Result<Bytes, RelayError> {
    let call_request = CallRequest {
        from: None,
        to: Some(to),
        gas: None,
        gas_price: None,
        value: None,
        data: Some(Bytes(data)),
        transaction_type: None,
        access_list: None,
        max_fee_per_gas: None,
        max_priority_fee_per_gas: None,
    };
    web3.eth()
        .call(call_request, None)
        .await
        .map_err(err_from!())
}

fn non_zero_id(token: Option<&Token>) -> Option<H256> {
    match token {
        Some(Token::FixedBytes(bytes)) if bytes.len() == 32 => {
            let id = H256::from_slice(bytes);
            (!id.is_zero()).then_some(id)
        }
        _ => None,
    }
}

pub struct Web3IngressReader {
    pub web3: Web3<Http>,
    pub contract: Address,
}

impl Web3IngressReader {
    pub fn new(web3: Web3<Http>, contract: Address) -> Self {
        Self { web3, contract }
    }

    async fn call_decode(&self, func: &str, data: Vec<u8>) -> Result<Vec<Token>, RelayError> {
        let res = eth_call(&self.web3, self.contract, data).await?;
        contract_decode_output(&INGRESS_CONTRACT_TEMPLATE, func, &res.0).map_err(err_from!())
    }
}

impl IngressReader for Web3IngressReader {
    fn transfer_id_by_commitment(
        &self,
        encrypted_data_hash: H256,
    ) -> BoxFuture<'_, Result<Option<H256>, RelayError>> {
        async move {
            let data = encode_get_transfer_id_by_ciphertext_hash(encrypted_data_hash)
                .map_err(err_from!())?;
            let tokens = self
                .call_decode("getTransferIdByCiphertextHash", data)
                .await?;
            Ok(non_zero_id(tokens.first()))
        }
        .boxed()
    }

    fn transfer_metadata(
        &self,
        transfer_id: H256,
    ) -> BoxFuture<'_, Result<Option<TransferMetadata>, RelayError>> {
        async move {
            let data = encode_transfers(transfer_id).map_err(err_from!())?;
            let tokens = self.call_decode("transfers", data).await?;
            match tokens.as_slice() {
                [Token::Address(sender), Token::Uint(domain), Token::Uint(dispatched_at), Token::Bool(acknowledged)] => {
                    if sender.is_zero() {
                        return Ok(None);
                    }
                    Ok(Some(TransferMetadata {
                        sender: *sender,
                        destination_domain: domain.low_u32(),
                        dispatched_at: *dispatched_at,
                        acknowledged: *acknowledged,
                    }))
                }
                _ => Err(err_custom_create!(
                    "Unexpected transfers() output: {:?}",
                    tokens
                )),
            }
        }
        .boxed()
    }

    fn deposit_id_for_transfer(
        &self,
        transfer_id: H256,
    ) -> BoxFuture<'_, Result<Option<H256>, RelayError>> {
        async move {
            let data = encode_transfer_to_deposit_id(transfer_id).map_err(err_from!())?;
            let tokens = self.call_decode("transferToDepositId", data).await?;
            Ok(non_zero_id(tokens.first()))
        }
        .boxed()
    }

    fn transaction_call(
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

pub async fn get_latest_block_number(web3: &Web3<Http>) -> Result<u64, RelayError> {
    let block_number = web3.eth().block_number().await.map_err(err_from!())?;
    Ok(block_number.as_u64())
}

pub async fn get_block_timestamp(
    web3: &Web3<Http>,
    block_number: u64,
) -> Result<DateTime<Utc>, RelayError> {
    let block = web3
        .eth()
        .block(BlockId::Number(BlockNumber::Number(block_number.into())))
        .await
        .map_err(err_from!())?
        .ok_or_else(|| err_custom_create!("Block {} not found", block_number))?;
    datetime_from_u256_timestamp(block.timestamp)
        .ok_or_else(|| err_custom_create!("Invalid timestamp of block {}", block_number))
}
