use super::{SettlementContract, SettlementInclusion, SubmitError};
use crate::contracts::{contract_decode_output, encode_encrypted_transfers, encode_process_transfer, VAULT_CONTRACT_TEMPLATE};
use crate::error::RelayError;
use crate::eth::eth_call;
use crate::setup::ChainSetup;
use crate::signer::Signer;
use crate::transaction::{
    call_to_transaction, estimate_gas, get_pending_nonce, receipt_succeeded, resolve_fees,
    send_signed_transaction, wait_for_receipt, ContractCall,
};
use crate::{err_custom_create, err_from};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use web3::ethabi::Token;
use web3::types::{Address, H256, U256};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// `processTransfer` on the vault, signed locally and sent as EIP-1559 transaction
pub struct Web3SettlementContract {
    chain: ChainSetup,
    signer: Arc<dyn Signer>,
    from: Address,
}

impl Web3SettlementContract {
    pub fn new(chain: ChainSetup, signer: Arc<dyn Signer>, from: Address) -> Self {
        Self {
            chain,
            signer,
            from,
        }
    }

    async fn send_settlement(&self, transfer_id: H256) -> Result<SettlementInclusion, SubmitError> {
        let web3 = &self.chain.web3;
        let classify = |err: web3::Error| SubmitError::classify(&err.to_string());

        let data = encode_process_transfer(transfer_id)
            .map_err(|err| SubmitError::Transient(err.to_string()))?;
        let (max_fee_per_gas, priority_fee) =
            resolve_fees(web3, &self.chain).await.map_err(classify)?;
        let call = ContractCall {
            chain_id: self.chain.chain_id as u64,
            from: self.from,
            to: self.chain.contract_address,
            data,
            max_fee_per_gas,
            priority_fee,
        };
        //estimation surfaces "already processed" reverts before anything is sent
        let gas = match self.chain.gas_limit {
            Some(gas_limit) => U256::from(gas_limit),
            None => estimate_gas(web3, &call).await.map_err(classify)? * 12 / 10,
        };
        let nonce = get_pending_nonce(web3, self.from)
            .await
            .map_err(classify)?;
        let signed = self
            .signer
            .sign(self.from, call_to_transaction(&call, nonce, gas))
            .await
            .map_err(|err| SubmitError::Transient(err.to_string()))?;
        let tx_hash = send_signed_transaction(web3, &signed)
            .await
            .map_err(classify)?;
        log::info!(
            "Settlement of {:#x} sent in tx {:#x} (nonce {}, gas {})",
            transfer_id,
            tx_hash,
            nonce,
            gas
        );

        let receipt = wait_for_receipt(
            web3,
            tx_hash,
            self.chain.transaction_timeout,
            RECEIPT_POLL_INTERVAL,
        )
        .await
        .map_err(|err| SubmitError::Transient(err.to_string()))?;
        let block_number = receipt.block_number.map(|block| block.as_u64());
        if receipt_succeeded(&receipt) {
            Ok(SettlementInclusion {
                tx_hash,
                from: self.from,
                block_number,
            })
        } else {
            Err(SubmitError::Reverted {
                tx_hash,
                from: self.from,
                block_number,
            })
        }
    }
}

/// `encryptedTransfers` returns (originDomain, originRouter, envelope, acknowledged)
pub(crate) fn settled_flag(tokens: &[Token]) -> Result<bool, RelayError> {
    match tokens.get(3) {
        Some(Token::Bool(acknowledged)) => Ok(*acknowledged),
        _ => Err(err_custom_create!(
            "Unexpected encryptedTransfers() output: {:?}",
            tokens
        )),
    }
}

impl SettlementContract for Web3SettlementContract {
    fn chain_id(&self) -> i64 {
        self.chain.chain_id
    }

    fn is_settled(&self, transfer_id: H256) -> BoxFuture<'_, Result<bool, RelayError>> {
        async move {
            let data = encode_encrypted_transfers(transfer_id).map_err(err_from!())?;
            let res = eth_call(&self.chain.web3, self.chain.contract_address, data).await?;
            let tokens =
                contract_decode_output(&VAULT_CONTRACT_TEMPLATE, "encryptedTransfers", &res.0)
                    .map_err(err_from!())?;
            settled_flag(&tokens)
        }
        .boxed()
    }

    fn submit(&self, transfer_id: H256) -> BoxFuture<'_, Result<SettlementInclusion, SubmitError>> {
        self.send_settlement(transfer_id).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use web3::ethabi::encode;

    #[test]
    fn test_settled_flag_from_view_output() {
        let output = encode(&[
            Token::Uint(U256::from(5003)),
            Token::FixedBytes(vec![1; 32]),
            Token::Tuple(vec![
                Token::FixedBytes(vec![2; 32]),
                Token::FixedBytes(vec![3; 16]),
                Token::Bytes(vec![4, 5, 6]),
            ]),
            Token::Bool(true),
        ]);
        let tokens =
            contract_decode_output(&VAULT_CONTRACT_TEMPLATE, "encryptedTransfers", &output).unwrap();
        assert!(settled_flag(&tokens).unwrap());
        assert!(settled_flag(&tokens[..2]).is_err());
    }
}
