use crate::contracts::INGRESS_CONTRACT_TEMPLATE;
use web3::ethabi::Token;
use web3::types::H256;

/// Recovers the deposit id from the call data of the transaction that created a transfer
pub trait DepositIdDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// None when this strategy cannot read the input, zero ids count as None
    fn decode(&self, input: &[u8]) -> Option<H256>;
}

fn non_zero(id: H256) -> Option<H256> {
    (!id.is_zero()).then_some(id)
}

/// ABI decode of `initiateTransfer(uint32 destinationDomain, bytes32 depositId, bytes ciphertext)`
pub struct StructuredCallDecoder;

impl DepositIdDecoder for StructuredCallDecoder {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn decode(&self, input: &[u8]) -> Option<H256> {
        let function = INGRESS_CONTRACT_TEMPLATE.function("initiateTransfer").ok()?;
        if input.len() < 4 || input[0..4] != function.short_signature() {
            return None;
        }
        let tokens = function.decode_input(&input[4..]).ok()?;
        match tokens.get(1) {
            Some(Token::FixedBytes(bytes)) if bytes.len() == 32 => {
                non_zero(H256::from_slice(bytes))
            }
            _ => None,
        }
    }
}

/// Reads 32 bytes at a fixed position of the call data, selector plus one static word by default
pub struct FixedOffsetDecoder {
    pub offset: usize,
}

impl Default for FixedOffsetDecoder {
    fn default() -> Self {
        FixedOffsetDecoder { offset: 4 + 32 }
    }
}

impl DepositIdDecoder for FixedOffsetDecoder {
    fn name(&self) -> &'static str {
        "fixed-offset"
    }

    fn decode(&self, input: &[u8]) -> Option<H256> {
        let end = self.offset.checked_add(32)?;
        if input.len() < end {
            return None;
        }
        non_zero(H256::from_slice(&input[self.offset..end]))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositIdDecode {
    Resolved { deposit_id: H256, strategy: &'static str },
    /// strategies succeeded with different values
    Conflict(Vec<(&'static str, H256)>),
    Unresolved,
}

/// Runs every strategy, a value is accepted only when all succeeding strategies agree
pub fn decode_deposit_id(decoders: &[Box<dyn DepositIdDecoder>], input: &[u8]) -> DepositIdDecode {
    let results: Vec<(&'static str, H256)> = decoders
        .iter()
        .filter_map(|decoder| decoder.decode(input).map(|id| (decoder.name(), id)))
        .collect();
    match results.first() {
        None => DepositIdDecode::Unresolved,
        Some((strategy, deposit_id)) => {
            if results.iter().all(|(_, id)| id == deposit_id) {
                DepositIdDecode::Resolved {
                    deposit_id: *deposit_id,
                    strategy,
                }
            } else {
                DepositIdDecode::Conflict(results)
            }
        }
    }
}

pub fn default_decoders() -> Vec<Box<dyn DepositIdDecoder>> {
    vec![
        Box::new(StructuredCallDecoder),
        Box::new(FixedOffsetDecoder::default()),
    ]
}
