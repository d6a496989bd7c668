use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::*;
use crate::{err_custom_create, err_from};
use tokio::fs;
use web3::types::Address;

fn default_block_range() -> u64 {
    500
}

fn default_transaction_timeout() -> u64 {
    120
}

fn default_max_deferred_attempts() -> i64 {
    30
}

fn default_settle_concurrency() -> usize {
    1
}

fn default_in_flight_capacity() -> usize {
    256
}

mod duration_str {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Engine {
    /// period of the settlement trigger
    #[serde(with = "duration_str")]
    pub poll_interval: Duration,
    /// pause between scan passes once an indexer reached the chain head
    #[serde(with = "duration_str")]
    pub index_interval: Duration,
    pub max_retries: u32,
    #[serde(with = "duration_str")]
    pub retry_base_delay: Duration,
    #[serde(default = "default_settle_concurrency")]
    pub settle_concurrency: usize,
    #[serde(default = "default_in_flight_capacity")]
    pub in_flight_capacity: usize,
    #[serde(default = "default_max_deferred_attempts")]
    pub max_deferred_attempts: i64,
    pub default_destination_domain: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Chain {
    pub chain_name: String,
    pub chain_id: i64,
    pub domain: u32,
    pub rpc_endpoints: Vec<String>,
    pub contract_address: Address,
    pub start_block: u64,
    #[serde(default = "default_block_range")]
    pub block_range: u64,
    #[serde(default)]
    pub confirmation_blocks: u64,
    #[serde(default)]
    pub priority_fee: Option<f64>,
    #[serde(default)]
    pub max_fee_per_gas: Option<f64>,
    #[serde(default)]
    pub gas_limit: Option<u64>,
    #[serde(default = "default_transaction_timeout")]
    pub transaction_timeout: u64,
    pub block_explorer_url: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub engine: Engine,
    /// chain holding deposits and emitting transfer commitments
    pub source_chain: Chain,
    /// confidential chain holding the encrypted envelopes
    pub destination_chain: Chain,
}

impl Config {
    pub fn load_from_str(str: &str) -> Result<Self, RelayError> {
        match toml::from_str(str) {
            Ok(config) => Ok(config),
            Err(e) => Err(err_custom_create!("Failed to parse toml {}: {}", str, e)),
        }
    }

    pub async fn load<P: AsRef<Path> + std::fmt::Display>(path: P) -> Result<Self, RelayError> {
        let content = fs::read_to_string(&path).await.map_err(err_from!())?;
        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => Err(err_custom_create!("Failed to parse toml {}: {}", path, e)),
        }
    }

    /// Environment variables of the settlement service take precedence over the file
    pub fn apply_env_overrides(&mut self) -> Result<(), RelayError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("POLL_INTERVAL") {
            self.engine.poll_interval = Duration::from_millis(parse_env("POLL_INTERVAL", &val)?);
        }
        if let Some(val) = lookup("MAX_RETRIES") {
            self.engine.max_retries = parse_env("MAX_RETRIES", &val)?;
        }
        if let Some(val) = lookup("RETRY_DELAY") {
            self.engine.retry_base_delay = Duration::from_millis(parse_env("RETRY_DELAY", &val)?);
        }
        if let Some(val) = lookup("SAPPHIRE_DOMAIN") {
            let domain: u32 = parse_env("SAPPHIRE_DOMAIN", &val)?;
            self.engine.default_destination_domain = domain;
            self.destination_chain.domain = domain;
        }
        if let Some(val) = lookup("VAULT_ADDRESS") {
            self.destination_chain.contract_address = crate::utils::parse_addr(&val)
                .map_err(crate::err_from_msg!("Invalid VAULT_ADDRESS"))?;
        }
        if let Some(val) = lookup("SAPPHIRE_RPC_URL") {
            self.destination_chain.rpc_endpoints = vec![val];
        }
        Ok(())
    }
}

fn parse_env<T>(name: &str, val: &str) -> Result<T, RelayError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    val.trim()
        .parse::<T>()
        .map_err(|e| err_custom_create!("Invalid value of {name}: {val} ({e})"))
}
