use crate::contracts::DUMMY_RPC_PROVIDER;
use crate::eth::get_eth_addr_from_secret;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use secp256k1::SecretKey;
use web3::types::{SignedTransaction, TransactionParameters, H160};

#[derive(Debug, thiserror::Error)]
#[error("SignerError: {message}")]
pub struct SignerError {
    pub message: String,
}

/// Signs settlement transactions. Object safe so the processor can hold `Arc<dyn Signer>`.
pub trait Signer: Send + Sync {
    /// Check if signer can sign transaction for given public address
    fn check_if_sign_possible(&self, pub_address: H160) -> BoxFuture<'_, Result<(), SignerError>>;

    /// Sign transaction for given public address. All gas, fee, nonce and chain id fields
    /// have to be filled, signing never reaches the network.
    fn sign(
        &self,
        pub_address: H160,
        tp: TransactionParameters,
    ) -> BoxFuture<'_, Result<SignedTransaction, SignerError>>;
}

/// Holds the single configured signing key in memory
pub struct PrivateKeySigner {
    secret_key: SecretKey,
    address: H160,
}

impl PrivateKeySigner {
    pub fn new(secret_key: SecretKey) -> Self {
        Self {
            address: get_eth_addr_from_secret(&secret_key),
            secret_key,
        }
    }

    pub fn address(&self) -> H160 {
        self.address
    }

    fn get_private_key(&self, pub_address: H160) -> Result<&SecretKey, SignerError> {
        if pub_address == self.address {
            Ok(&self.secret_key)
        } else {
            Err(SignerError {
                message: format!("No private key for address: {pub_address:#x}"),
            })
        }
    }
}

impl Signer for PrivateKeySigner {
    fn check_if_sign_possible(&self, pub_address: H160) -> BoxFuture<'_, Result<(), SignerError>> {
        async move {
            self.get_private_key(pub_address)?;
            Ok(())
        }
        .boxed()
    }

    fn sign(
        &self,
        pub_address: H160,
        tp: TransactionParameters,
    ) -> BoxFuture<'_, Result<SignedTransaction, SignerError>> {
        async move {
            let secret_key = self.get_private_key(pub_address)?;
            let signed = DUMMY_RPC_PROVIDER
                .accounts()
                .sign_transaction(tp, secret_key)
                .await
                .map_err(|err| SignerError {
                    message: format!("Error when signing transaction in PrivateKeySigner {err}"),
                })?;
            Ok(signed)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use web3::types::{U256, U64};

    #[tokio::test]
    async fn test_sign_offline() {
        let sk =
            SecretKey::from_str("0000000000000000000000000000000000000000000000000000000000000001")
                .unwrap();
        let signer = PrivateKeySigner::new(sk);
        let other = H160::repeat_byte(0x22);
        assert!(signer.check_if_sign_possible(signer.address()).await.is_ok());
        assert!(signer.check_if_sign_possible(other).await.is_err());

        let tp = TransactionParameters {
            nonce: Some(U256::from(1)),
            to: Some(other),
            gas: U256::from(100_000),
            gas_price: None,
            value: U256::zero(),
            data: Default::default(),
            chain_id: Some(23295),
            transaction_type: Some(U64::from(2)),
            access_list: None,
            max_fee_per_gas: Some(U256::from(100_000_000_000_u64)),
            max_priority_fee_per_gas: Some(U256::from(1_000_000_000_u64)),
        };
        let signed = signer.sign(signer.address(), tp).await.unwrap();
        assert!(!signed.raw_transaction.0.is_empty());
    }
}
