use crate::contracts::{INGRESS_CONTRACT_TEMPLATE, VAULT_CONTRACT_TEMPLATE};
use crate::error::*;
use crate::{err_custom_create, err_from};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use web3::ethabi::{Contract, RawLog, Token};
use web3::types::{Address, Bytes, Log, H256, U256};

/// Transaction and block metadata delivered with every decoded event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    pub chain_id: i64,
    pub block_number: u64,
    pub block_timestamp: DateTime<Utc>,
    pub tx_hash: H256,
    pub log_index: u64,
    pub tx_sender: Option<Address>,
    pub tx_input: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChainEventKind {
    #[serde(rename_all = "camelCase")]
    DepositCreated {
        deposit_id: H256,
        depositor: Address,
        token: Address,
        amount: U256,
        is_native: bool,
    },
    #[serde(rename_all = "camelCase")]
    EncryptedInstructionsReceived { encrypted_data_hash: H256 },
    #[serde(rename_all = "camelCase")]
    EncryptedInstructionsProcessed { encrypted_data_hash: H256 },
    #[serde(rename_all = "camelCase")]
    EncryptedTransferStored {
        transfer_id: H256,
        origin_domain: u32,
        origin_router: H256,
    },
    #[serde(rename_all = "camelCase")]
    TransferAcknowledged {
        transfer_id: H256,
        destination_domain: u32,
    },
    #[serde(rename_all = "camelCase")]
    PrivatePayloadProcessed {
        transfer_id: H256,
        receiver: Address,
        token: Address,
        amount: U256,
        is_native: bool,
    },
}

impl ChainEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            ChainEventKind::DepositCreated { .. } => "DepositCreated",
            ChainEventKind::EncryptedInstructionsReceived { .. } => "EncryptedInstructionsReceived",
            ChainEventKind::EncryptedInstructionsProcessed { .. } => {
                "EncryptedInstructionsProcessed"
            }
            ChainEventKind::EncryptedTransferStored { .. } => "EncryptedTransferStored",
            ChainEventKind::TransferAcknowledged { .. } => "TransferAcknowledged",
            ChainEventKind::PrivatePayloadProcessed { .. } => "PrivatePayloadProcessed",
        }
    }

    /// Only the commitment event needs the call data of its transaction
    pub fn needs_transaction(&self) -> bool {
        matches!(self, ChainEventKind::EncryptedInstructionsReceived { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEvent {
    pub context: EventContext,
    pub kind: ChainEventKind,
}

/// Which of the two contracts a log stream comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractSide {
    Ingress,
    Vault,
}

impl ContractSide {
    fn contract(&self) -> &'static Contract {
        match self {
            ContractSide::Ingress => &INGRESS_CONTRACT_TEMPLATE,
            ContractSide::Vault => &VAULT_CONTRACT_TEMPLATE,
        }
    }

    pub fn event_names(&self) -> &'static [&'static str] {
        match self {
            ContractSide::Ingress => &[
                "DepositCreated",
                "EncryptedInstructionsReceived",
                "EncryptedInstructionsProcessed",
            ],
            ContractSide::Vault => &[
                "EncryptedTransferStored",
                "TransferAcknowledged",
                "PrivatePayloadProcessed",
            ],
        }
    }

    /// Name used as the scan cursor filter
    pub fn filter_name(&self) -> &'static str {
        match self {
            ContractSide::Ingress => "ingress",
            ContractSide::Vault => "vault",
        }
    }

    pub fn event_topics(&self) -> Result<Vec<H256>, RelayError> {
        self.event_names()
            .iter()
            .map(|name| {
                self.contract()
                    .event(name)
                    .map(|event| event.signature())
                    .map_err(err_from!())
            })
            .collect()
    }
}

fn param<'a>(log: &'a web3::ethabi::Log, name: &str) -> Result<&'a Token, RelayError> {
    log.params
        .iter()
        .find(|p| p.name == name)
        .map(|p| &p.value)
        .ok_or_else(|| err_custom_create!("Missing event parameter {}", name))
}

fn param_id(log: &web3::ethabi::Log, name: &str) -> Result<H256, RelayError> {
    match param(log, name)? {
        Token::FixedBytes(bytes) if bytes.len() == 32 => Ok(H256::from_slice(bytes)),
        other => Err(err_custom_create!("Parameter {} is not bytes32: {:?}", name, other)),
    }
}

fn param_address(log: &web3::ethabi::Log, name: &str) -> Result<Address, RelayError> {
    param(log, name)?
        .clone()
        .into_address()
        .ok_or_else(|| err_custom_create!("Parameter {} is not an address", name))
}

fn param_uint(log: &web3::ethabi::Log, name: &str) -> Result<U256, RelayError> {
    param(log, name)?
        .clone()
        .into_uint()
        .ok_or_else(|| err_custom_create!("Parameter {} is not an uint", name))
}

fn param_bool(log: &web3::ethabi::Log, name: &str) -> Result<bool, RelayError> {
    param(log, name)?
        .clone()
        .into_bool()
        .ok_or_else(|| err_custom_create!("Parameter {} is not a bool", name))
}

/// Decodes a raw log of the given contract. Logs with an unknown signature give None.
pub fn decode_log(side: ContractSide, log: &Log) -> Result<Option<ChainEventKind>, RelayError> {
    let Some(topic0) = log.topics.first() else {
        return Ok(None);
    };
    let contract = side.contract();
    let Some(event) = side
        .event_names()
        .iter()
        .filter_map(|name| contract.event(name).ok())
        .find(|event| event.signature() == *topic0)
    else {
        return Ok(None);
    };

    let parsed = event
        .parse_log(RawLog {
            topics: log.topics.clone(),
            data: log.data.0.clone(),
        })
        .map_err(err_from!())?;

    let kind = match event.name.as_str() {
        "DepositCreated" => ChainEventKind::DepositCreated {
            deposit_id: param_id(&parsed, "depositId")?,
            depositor: param_address(&parsed, "depositor")?,
            token: param_address(&parsed, "token")?,
            amount: param_uint(&parsed, "amount")?,
            is_native: param_bool(&parsed, "isNative")?,
        },
        "EncryptedInstructionsReceived" => ChainEventKind::EncryptedInstructionsReceived {
            encrypted_data_hash: param_id(&parsed, "encryptedDataHash")?,
        },
        "EncryptedInstructionsProcessed" => ChainEventKind::EncryptedInstructionsProcessed {
            encrypted_data_hash: param_id(&parsed, "encryptedDataHash")?,
        },
        "EncryptedTransferStored" => ChainEventKind::EncryptedTransferStored {
            transfer_id: param_id(&parsed, "transferId")?,
            origin_domain: param_uint(&parsed, "originDomain")?.low_u32(),
            origin_router: param_id(&parsed, "originRouter")?,
        },
        "TransferAcknowledged" => ChainEventKind::TransferAcknowledged {
            transfer_id: param_id(&parsed, "transferId")?,
            destination_domain: param_uint(&parsed, "destinationDomain")?.low_u32(),
        },
        "PrivatePayloadProcessed" => ChainEventKind::PrivatePayloadProcessed {
            transfer_id: param_id(&parsed, "transferId")?,
            receiver: param_address(&parsed, "receiver")?,
            token: param_address(&parsed, "token")?,
            amount: param_uint(&parsed, "amount")?,
            is_native: param_bool(&parsed, "isNative")?,
        },
        other => return Err(err_custom_create!("Unhandled event {}", other)),
    };
    Ok(Some(kind))
}
