use chrono::{DateTime, NaiveDateTime, Utc};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use web3::types::{Address, H256, U256};

pub fn datetime_from_u256_timestamp(timestamp: U256) -> Option<DateTime<Utc>> {
    if timestamp > U256::from(i64::MAX as u64) {
        return None;
    }
    NaiveDateTime::from_timestamp_opt(timestamp.as_u64() as i64, 0)
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[derive(Debug, Clone)]
pub struct ConversionError {
    pub msg: String,
}

impl ConversionError {
    pub fn from(msg: String) -> Self {
        Self { msg }
    }
}

impl Display for ConversionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error during conversion: {}", self.msg)
    }
}

impl Error for ConversionError {}

pub fn gwei_to_u256(gas: f64) -> Result<U256, ConversionError> {
    const GWEI: f64 = 1.0E9;
    if gas < 0.0 {
        return Err(ConversionError::from(
            "Gas price cannot be negative".to_string(),
        ));
    }
    if gas > 1.0E9 {
        return Err(ConversionError::from(format!(
            "Gas price cannot be greater than 1e9 gwei, got {gas}"
        )));
    }
    Ok(U256::from((gas * GWEI) as u128))
}

/// Zero valued 32-byte id, stands for "not resolved yet"
pub fn zero_id() -> H256 {
    H256::zero()
}

pub fn format_id(id: H256) -> String {
    format!("{id:#x}")
}

pub fn format_addr(addr: Address) -> String {
    format!("{addr:#x}")
}

pub fn parse_id(s: &str) -> Result<H256, ConversionError> {
    H256::from_str(s.trim_start_matches("0x"))
        .map_err(|err| ConversionError::from(format!("Invalid 32-byte id {s}: {err}")))
}

pub fn parse_addr(s: &str) -> Result<Address, ConversionError> {
    Address::from_str(s.trim_start_matches("0x"))
        .map_err(|err| ConversionError::from(format!("Invalid address {s}: {err}")))
}

/// True for both the zero id and the zero address, in their db string form
pub fn is_zero_hex(s: &str) -> bool {
    let digits = s.trim_start_matches("0x");
    !digits.is_empty() && digits.chars().all(|c| c == '0')
}

/// precision cannot be greater than decimals (it is capped automatically)
pub fn u256_to_decimal_string(amount: U256, decimals: usize, precision: Option<usize>) -> String {
    let digits = amount.to_string();
    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals + 1 - digits.len()), digits)
    } else {
        digits
    };
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    let mut frac = frac_part.trim_end_matches('0').to_string();
    if let Some(precision) = precision.map(|p| std::cmp::min(p, decimals)) {
        frac = format!("{:0<width$}", frac, width = precision);
        frac.truncate(precision);
    }
    if frac.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac}")
    }
}

pub trait U256ConvExt {
    fn to_eth_str(&self) -> String;
}

impl U256ConvExt for U256 {
    fn to_eth_str(&self) -> String {
        u256_to_decimal_string(*self, 18, None)
    }
}

pub trait StringConvExt {
    fn to_u256(&self) -> Result<U256, ConversionError>;
}

impl StringConvExt for String {
    fn to_u256(&self) -> Result<U256, ConversionError> {
        U256::from_dec_str(self).map_err(|err| {
            ConversionError::from(format!("Invalid string when converting: {err:?}"))
        })
    }
}

impl StringConvExt for str {
    fn to_u256(&self) -> Result<U256, ConversionError> {
        U256::from_dec_str(self).map_err(|err| {
            ConversionError::from(format!("Invalid string when converting: {err:?}"))
        })
    }
}
