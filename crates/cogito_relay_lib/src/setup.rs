use crate::config::{Chain, Config};
use crate::error::*;
use crate::eth::get_eth_addr_from_secret;
use crate::utils::gwei_to_u256;
use crate::{err_custom_create, err_from};
use secp256k1::SecretKey;
use serde::Serialize;
use std::time::Duration;
use web3::transports::Http;
use web3::types::{Address, U256};
use web3::Web3;

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChainSetup {
    pub chain_name: String,
    pub chain_id: i64,
    pub domain: u32,
    pub contract_address: Address,
    pub start_block: u64,
    pub block_range: u64,
    pub confirmation_blocks: u64,
    pub rpc_endpoint: String,
    #[serde(skip_serializing)]
    pub web3: Web3<Http>,
    pub priority_fee: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub gas_limit: Option<u64>,
    pub transaction_timeout: Duration,
    pub block_explorer_url: Option<String>,
}

impl ChainSetup {
    fn from_config(chain: &Chain) -> Result<Self, RelayError> {
        let rpc_endpoint = chain.rpc_endpoints.first().ok_or_else(|| {
            err_custom_create!("No rpc endpoints configured for {}", chain.chain_name)
        })?;
        if chain.rpc_endpoints.len() > 1 {
            log::warn!(
                "Chain {} has {} rpc endpoints, using {}",
                chain.chain_name,
                chain.rpc_endpoints.len(),
                rpc_endpoint
            );
        }
        if chain.block_range == 0 {
            return Err(err_custom_create!(
                "Block range of {} cannot be zero",
                chain.chain_name
            ));
        }
        let transport = Http::new(rpc_endpoint).map_err(err_from!())?;
        Ok(ChainSetup {
            chain_name: chain.chain_name.clone(),
            chain_id: chain.chain_id,
            domain: chain.domain,
            contract_address: chain.contract_address,
            start_block: chain.start_block,
            block_range: chain.block_range,
            confirmation_blocks: chain.confirmation_blocks,
            rpc_endpoint: rpc_endpoint.clone(),
            web3: Web3::new(transport),
            priority_fee: chain.priority_fee.map(gwei_to_u256).transpose().map_err(err_from!())?,
            max_fee_per_gas: chain
                .max_fee_per_gas
                .map(gwei_to_u256)
                .transpose()
                .map_err(err_from!())?,
            gas_limit: chain.gas_limit,
            transaction_timeout: Duration::from_secs(chain.transaction_timeout),
            block_explorer_url: chain.block_explorer_url.clone(),
        })
    }
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EngineSetup {
    pub poll_interval: Duration,
    pub index_interval: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub settle_concurrency: usize,
    pub in_flight_capacity: usize,
    pub max_deferred_attempts: i64,
    pub default_destination_domain: u32,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RelaySetup {
    pub source: ChainSetup,
    pub destination: ChainSetup,
    pub engine: EngineSetup,
    #[serde(skip_serializing)]
    pub secret_key: Option<SecretKey>,
    pub settler_address: Option<Address>,
}

impl RelaySetup {
    /// Validates the configuration, any error here is fatal at startup
    pub fn new(
        config: &Config,
        secret_key: Option<SecretKey>,
        require_signer: bool,
    ) -> Result<Self, RelayError> {
        let engine = &config.engine;
        if engine.max_retries == 0 {
            return Err(err_custom_create!("max-retries has to be at least 1"));
        }
        if engine.poll_interval.is_zero() {
            return Err(err_custom_create!("poll-interval cannot be zero"));
        }
        if engine.settle_concurrency == 0 || engine.in_flight_capacity == 0 {
            return Err(err_custom_create!(
                "settle-concurrency and in-flight-capacity have to be positive"
            ));
        }
        if engine.in_flight_capacity < engine.settle_concurrency {
            return Err(err_custom_create!(
                "in-flight-capacity cannot be lower than settle-concurrency"
            ));
        }
        if require_signer && secret_key.is_none() {
            return Err(err_custom_create!(
                "Settlement requires OWNER_PRIVATE_KEY to be set"
            ));
        }
        if config.destination_chain.contract_address.is_zero() {
            return Err(err_custom_create!("Vault contract address is not set"));
        }

        Ok(RelaySetup {
            source: ChainSetup::from_config(&config.source_chain)?,
            destination: ChainSetup::from_config(&config.destination_chain)?,
            engine: EngineSetup {
                poll_interval: engine.poll_interval,
                index_interval: engine.index_interval,
                max_retries: engine.max_retries,
                retry_base_delay: engine.retry_base_delay,
                settle_concurrency: engine.settle_concurrency,
                in_flight_capacity: engine.in_flight_capacity,
                max_deferred_attempts: engine.max_deferred_attempts,
                default_destination_domain: engine.default_destination_domain,
            },
            settler_address: secret_key.as_ref().map(get_eth_addr_from_secret),
            secret_key,
        })
    }
}
