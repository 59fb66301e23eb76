//! Typed decoders for factory and rebalancer logs
//!
//! Uses ethabi's log parsing so indexed and non-indexed params are located by
//! name rather than by manual byte offsets.

use ethabi::{Event, RawLog, Token};
use ethereum_types::{H160, H256, U256};

use super::{factory, rebalancer};

/// Error types for ABI encoding and decoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodingError {
    #[error("Unknown event signature: {0}")]
    UnknownEventSignature(String),

    #[error("ABI parsing failed: {0}")]
    AbiParsingError(String),

    #[error("ABI encoding failed: {0}")]
    EncodingError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairCreatedLog {
    pub token0: H160,
    pub token1: H160,
    pub pair: H160,
    pub index: U256,
}

/// Ratios are in basis points of 1.0, as emitted on-ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceLog {
    pub pair: H160,
    pub old_ratio_bps: U256,
    pub new_ratio_bps: U256,
    pub target_ratio_bps: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerLog {
    PairCreated(PairCreatedLog),
    Rebalance(RebalanceLog),
}

pub fn pair_created_topic() -> H256 {
    factory::pair_created_event().signature()
}

pub fn rebalance_topic() -> H256 {
    rebalancer::rebalance_event().signature()
}

/// Dispatch on `topics[0]` and decode into a typed log.
pub fn decode_log(topics: &[H256], data: &[u8]) -> Result<LedgerLog, DecodingError> {
    let signature = topics
        .first()
        .copied()
        .ok_or_else(|| DecodingError::MissingField("topic0".to_string()))?;

    if signature == pair_created_topic() {
        decode_pair_created(topics, data).map(LedgerLog::PairCreated)
    } else if signature == rebalance_topic() {
        decode_rebalance(topics, data).map(LedgerLog::Rebalance)
    } else {
        Err(DecodingError::UnknownEventSignature(format!("{signature:#x}")))
    }
}

pub fn decode_pair_created(topics: &[H256], data: &[u8]) -> Result<PairCreatedLog, DecodingError> {
    let params = parse(factory::pair_created_event(), topics, data)?;
    Ok(PairCreatedLog {
        token0: address_param(&params, "token0")?,
        token1: address_param(&params, "token1")?,
        pair: address_param(&params, "pair")?,
        index: uint_param(&params, "index")?,
    })
}

pub fn decode_rebalance(topics: &[H256], data: &[u8]) -> Result<RebalanceLog, DecodingError> {
    let params = parse(rebalancer::rebalance_event(), topics, data)?;
    Ok(RebalanceLog {
        pair: address_param(&params, "pair")?,
        old_ratio_bps: uint_param(&params, "oldRatio")?,
        new_ratio_bps: uint_param(&params, "newRatio")?,
        target_ratio_bps: uint_param(&params, "targetRatio")?,
    })
}

/// Build `(topics, data)` for a PairCreated log; used by test ledgers.
pub fn encode_pair_created(log: &PairCreatedLog) -> (Vec<H256>, Vec<u8>) {
    (
        vec![
            pair_created_topic(),
            H256::from(log.token0),
            H256::from(log.token1),
        ],
        ethabi::encode(&[Token::Address(log.pair), Token::Uint(log.index)]),
    )
}

/// Build `(topics, data)` for a Rebalance log; used by test ledgers.
pub fn encode_rebalance(log: &RebalanceLog) -> (Vec<H256>, Vec<u8>) {
    (
        vec![rebalance_topic(), H256::from(log.pair)],
        ethabi::encode(&[
            Token::Uint(log.old_ratio_bps),
            Token::Uint(log.new_ratio_bps),
            Token::Uint(log.target_ratio_bps),
        ]),
    )
}

fn parse(event: &Event, topics: &[H256], data: &[u8]) -> Result<Vec<ethabi::LogParam>, DecodingError> {
    event
        .parse_log(RawLog {
            topics: topics.to_vec(),
            data: data.to_vec(),
        })
        .map(|log| log.params)
        .map_err(|e| DecodingError::AbiParsingError(format!("{}: {}", event.name, e)))
}

fn find<'a>(params: &'a [ethabi::LogParam], name: &str) -> Result<&'a Token, DecodingError> {
    params
        .iter()
        .find(|p| p.name == name)
        .map(|p| &p.value)
        .ok_or_else(|| DecodingError::MissingField(name.to_string()))
}

fn address_param(params: &[ethabi::LogParam], name: &str) -> Result<H160, DecodingError> {
    find(params, name)?
        .clone()
        .into_address()
        .ok_or_else(|| DecodingError::MissingField(name.to_string()))
}

fn uint_param(params: &[ethabi::LogParam], name: &str) -> Result<U256, DecodingError> {
    find(params, name)?
        .clone()
        .into_uint()
        .ok_or_else(|| DecodingError::MissingField(name.to_string()))
}
