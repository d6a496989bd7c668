use crate::err_custom_create;
use crate::error::RelayError;
use crate::eth::get_eth_addr_from_secret;
use secp256k1::SecretKey;
use std::str::FromStr;
use web3::types::Address;

/// Parses the settlement key, an empty string means no key configured
pub fn load_private_key(str: &str) -> Result<Option<(SecretKey, Address)>, RelayError> {
    let str = str.trim();
    if str.is_empty() {
        return Ok(None);
    }
    //do not disclose the private key in error message
    let secret = SecretKey::from_str(str.trim_start_matches("0x"))
        .map_err(|_| err_custom_create!("Failed to parse private key"))?;
    let public_addr = get_eth_addr_from_secret(&secret);
    Ok(Some((secret, public_addr)))
}

pub fn load_private_key_from_env(var_name: &str) -> Result<Option<(SecretKey, Address)>, RelayError> {
    match std::env::var(var_name) {
        Ok(value) => load_private_key(&value),
        Err(_) => Ok(None),
    }
}

pub fn display_settler_account(key: Option<&(SecretKey, Address)>) {
    match key {
        Some((_, public_addr)) => log::info!("Settlement account loaded: {:#x}", public_addr),
        None => log::info!("No settlement account loaded"),
    }
}
