//! Calldata encoding and typed decoding of call results
//!
//! An empty or malformed return value (for example a call to an address with
//! no code) surfaces as `DecodingError::AbiParsingError`.

use ethabi::{Function, ParamType, Token};
use ethereum_types::{H160, U256};

use super::events::DecodingError;

/// The 4-byte function selector.
pub fn selector_of(function: &Function) -> [u8; 4] {
    function.short_signature()
}

/// Selector followed by the ABI-encoded arguments.
pub fn encode_call(function: &Function, args: &[Token]) -> Result<Vec<u8>, DecodingError> {
    function
        .encode_input(args)
        .map_err(|e| DecodingError::EncodingError(format!("{}: {}", function.name, e)))
}

/// ABI-encode return values, the inverse of the `decode_*` helpers.
pub fn encode_output(tokens: &[Token]) -> Vec<u8> {
    ethabi::encode(tokens)
}

fn decode_single(function: &Function, data: &[u8]) -> Result<Token, DecodingError> {
    function
        .decode_output(data)
        .map_err(|e| DecodingError::AbiParsingError(format!("{}: {}", function.name, e)))?
        .into_iter()
        .next()
        .ok_or_else(|| DecodingError::MissingField(format!("{} output", function.name)))
}

pub fn decode_address(function: &Function, data: &[u8]) -> Result<H160, DecodingError> {
    decode_single(function, data)?
        .into_address()
        .ok_or_else(|| DecodingError::MissingField(format!("{} address", function.name)))
}

pub fn decode_uint(function: &Function, data: &[u8]) -> Result<U256, DecodingError> {
    decode_single(function, data)?
        .into_uint()
        .ok_or_else(|| DecodingError::MissingField(format!("{} uint", function.name)))
}

/// Decode an ERC-20 symbol, accepting both the standard `string` return and
/// the legacy `bytes32` form.
pub fn decode_string_or_bytes32(data: &[u8]) -> Result<String, DecodingError> {
    if let Ok(tokens) = ethabi::decode(&[ParamType::String], data) {
        if let Some(symbol) = tokens.into_iter().next().and_then(Token::into_string) {
            if !symbol.is_empty() {
                return Ok(symbol);
            }
        }
    }

    if data.len() == 32 {
        let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
        let symbol = String::from_utf8_lossy(&data[..end]).trim().to_string();
        if !symbol.is_empty() {
            return Ok(symbol);
        }
    }

    Err(DecodingError::AbiParsingError(format!(
        "symbol: {} bytes are neither string nor bytes32",
        data.len()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{factory, pair};

    #[test]
    fn test_all_pairs_selector() {
        // keccak256("allPairs(uint256)")[..4]
        assert_eq!(hex::encode(selector_of(factory::all_pairs())), "1e3dd18b");
    }

    #[test]
    fn test_encode_all_pairs_call() {
        let data = encode_call(factory::all_pairs(), &[Token::Uint(U256::from(3u64))]).unwrap();
        assert_eq!(data.len(), 4 + 32);
        assert_eq!(data[35], 3);
    }

    #[test]
    fn test_decode_address_round_trip() {
        let addr = H160::from_low_u64_be(0xbeef);
        let encoded = encode_output(&[Token::Address(addr)]);
        assert_eq!(decode_address(pair::token0(), &encoded).unwrap(), addr);
    }

    #[test]
    fn test_decode_empty_return_fails() {
        assert!(matches!(
            decode_uint(pair::reserve0(), &[]),
            Err(DecodingError::AbiParsingError(_))
        ));
    }

    #[test]
    fn test_symbol_string_and_bytes32() {
        let encoded = encode_output(&[Token::String("WETH".to_string())]);
        assert_eq!(decode_string_or_bytes32(&encoded).unwrap(), "WETH");

        let mut legacy = [0u8; 32];
        legacy[..3].copy_from_slice(b"MKR");
        assert_eq!(decode_string_or_bytes32(&legacy).unwrap(), "MKR");

        assert!(decode_string_or_bytes32(&[0u8; 32]).is_err());
    }
}
