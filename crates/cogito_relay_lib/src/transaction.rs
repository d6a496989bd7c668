use crate::err_custom_create;
use crate::error::*;
use crate::setup::ChainSetup;
use std::time::Duration;
use web3::transports::Http;
use web3::types::{
    Address, BlockNumber, Bytes, CallRequest, SignedTransaction, TransactionParameters,
    TransactionReceipt, H256, U256, U64,
};
use web3::Web3;

/// Contract call sent as an EIP-1559 transaction with zero value
#[derive(Debug, Clone)]
pub struct ContractCall {
    pub chain_id: u64,
    pub from: Address,
    pub to: Address,
    pub data: Vec<u8>,
    pub max_fee_per_gas: U256,
    pub priority_fee: U256,
}

pub fn call_to_call_request(call: &ContractCall) -> CallRequest {
    CallRequest {
        from: Some(call.from),
        to: Some(call.to),
        gas: None,
        gas_price: None,
        value: Some(U256::zero()),
        data: Some(Bytes(call.data.clone())),
        transaction_type: Some(U64::from(2)),
        access_list: None,
        max_fee_per_gas: Some(call.max_fee_per_gas),
        max_priority_fee_per_gas: Some(call.priority_fee),
    }
}

pub fn call_to_transaction(call: &ContractCall, nonce: U256, gas: U256) -> TransactionParameters {
    TransactionParameters {
        nonce: Some(nonce),
        to: Some(call.to),
        gas,
        gas_price: None,
        value: U256::zero(),
        data: Bytes(call.data.clone()),
        chain_id: Some(call.chain_id),
        transaction_type: Some(U64::from(2)),
        access_list: None,
        max_fee_per_gas: Some(call.max_fee_per_gas),
        max_priority_fee_per_gas: Some(call.priority_fee),
    }
}

/// Configured fees win, otherwise the node gas price is used with 2x headroom
pub async fn resolve_fees(
    web3: &Web3<Http>,
    chain_setup: &ChainSetup,
) -> Result<(U256, U256), web3::Error> {
    match (chain_setup.max_fee_per_gas, chain_setup.priority_fee) {
        (Some(max_fee), Some(priority_fee)) => Ok((max_fee, std::cmp::min(priority_fee, max_fee))),
        (max_fee, priority_fee) => {
            let gas_price = web3.eth().gas_price().await?;
            let max_fee = max_fee.unwrap_or(gas_price * 2);
            let priority_fee = priority_fee.unwrap_or(gas_price);
            Ok((max_fee, std::cmp::min(priority_fee, max_fee)))
        }
    }
}

/// Raw web3 errors are returned so the caller can classify revert reasons
pub async fn estimate_gas(web3: &Web3<Http>, call: &ContractCall) -> Result<U256, web3::Error> {
    web3.eth()
        .estimate_gas(call_to_call_request(call), None)
        .await
}

pub async fn get_pending_nonce(web3: &Web3<Http>, address: Address) -> Result<U256, web3::Error> {
    web3.eth()
        .transaction_count(address, Some(BlockNumber::Pending))
        .await
}

pub async fn send_signed_transaction(
    web3: &Web3<Http>,
    signed: &SignedTransaction,
) -> Result<H256, web3::Error> {
    web3.eth()
        .send_raw_transaction(signed.raw_transaction.clone())
        .await
}

/// Polls for the receipt until it shows up or `timeout` passes
pub async fn wait_for_receipt(
    web3: &Web3<Http>,
    tx_hash: H256,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<TransactionReceipt, RelayError> {
    let started = std::time::Instant::now();
    loop {
        match web3.eth().transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) if receipt.block_number.is_some() => return Ok(receipt),
            Ok(_) => {}
            Err(err) => {
                log::warn!("Failed to fetch receipt of {tx_hash:#x}, will retry: {err}");
            }
        }
        if started.elapsed() > timeout {
            return Err(err_custom_create!(
                "Transaction {:#x} not included after {}",
                tx_hash,
                humantime::format_duration(timeout)
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Receipt status 1 means the call did not revert
pub fn receipt_succeeded(receipt: &TransactionReceipt) -> bool {
    receipt.status == Some(U64::from(1))
}
