use lazy_static::lazy_static;

use crate::err_custom_create;
use crate::error::RelayError;
use web3::ethabi::{Contract, Token};
use web3::transports::Http;
use web3::types::H256;
use web3::Web3;

lazy_static! {
    /// Only used for offline signing, never connected
    pub static ref DUMMY_RPC_PROVIDER: Web3<Http> = {
        let transport = web3::transports::Http::new("http://noconn").unwrap();
        Web3::new(transport)
    };
    pub static ref INGRESS_CONTRACT_TEMPLATE: Contract =
        prepare_contract_template(include_bytes!("../contracts/private_transfer_ingress.json"))
            .unwrap();
    pub static ref VAULT_CONTRACT_TEMPLATE: Contract =
        prepare_contract_template(include_bytes!("../contracts/private_transfer_vault.json"))
            .unwrap();
}

pub fn prepare_contract_template(json_abi: &[u8]) -> Result<Contract, RelayError> {
    Contract::load(json_abi).map_err(|err| err_custom_create!("Failed to create contract {err}"))
}

pub fn contract_encode(
    contract: &Contract,
    func: &str,
    params: &[Token],
) -> Result<Vec<u8>, web3::ethabi::Error> {
    contract
        .function(func)
        .and_then(|function| function.encode_input(params))
}

pub fn contract_decode_output(
    contract: &Contract,
    func: &str,
    data: &[u8],
) -> Result<Vec<Token>, web3::ethabi::Error> {
    contract
        .function(func)
        .and_then(|function| function.decode_output(data))
}

fn id_token(id: H256) -> Token {
    Token::FixedBytes(id.as_bytes().to_vec())
}

pub fn encode_get_transfer_id_by_ciphertext_hash(
    encrypted_data_hash: H256,
) -> Result<Vec<u8>, web3::ethabi::Error> {
    contract_encode(
        &INGRESS_CONTRACT_TEMPLATE,
        "getTransferIdByCiphertextHash",
        &[id_token(encrypted_data_hash)],
    )
}

pub fn encode_transfers(transfer_id: H256) -> Result<Vec<u8>, web3::ethabi::Error> {
    contract_encode(&INGRESS_CONTRACT_TEMPLATE, "transfers", &[id_token(transfer_id)])
}

pub fn encode_transfer_to_deposit_id(transfer_id: H256) -> Result<Vec<u8>, web3::ethabi::Error> {
    contract_encode(
        &INGRESS_CONTRACT_TEMPLATE,
        "transferToDepositId",
        &[id_token(transfer_id)],
    )
}

pub fn encode_encrypted_transfers(transfer_id: H256) -> Result<Vec<u8>, web3::ethabi::Error> {
    contract_encode(
        &VAULT_CONTRACT_TEMPLATE,
        "encryptedTransfers",
        &[id_token(transfer_id)],
    )
}

pub fn encode_process_transfer(transfer_id: H256) -> Result<Vec<u8>, web3::ethabi::Error> {
    contract_encode(
        &VAULT_CONTRACT_TEMPLATE,
        "processTransfer",
        &[id_token(transfer_id)],
    )
}
