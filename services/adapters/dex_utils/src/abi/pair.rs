//! Pair and ERC-20 token ABI
//!
//! The pair exposes each reserve through its own accessor rather than a
//! combined `getReserves()`.

use ethabi::{Function, ParamType};
use once_cell::sync::Lazy;

use super::{param, view};

static TOKEN0: Lazy<Function> =
    Lazy::new(|| view("token0", vec![], vec![param("", ParamType::Address)]));
static TOKEN1: Lazy<Function> =
    Lazy::new(|| view("token1", vec![], vec![param("", ParamType::Address)]));
static RESERVE0: Lazy<Function> =
    Lazy::new(|| view("reserve0", vec![], vec![param("", ParamType::Uint(256))]));
static RESERVE1: Lazy<Function> =
    Lazy::new(|| view("reserve1", vec![], vec![param("", ParamType::Uint(256))]));
static TOTAL_SUPPLY: Lazy<Function> =
    Lazy::new(|| view("totalSupply", vec![], vec![param("", ParamType::Uint(256))]));
static SYMBOL: Lazy<Function> =
    Lazy::new(|| view("symbol", vec![], vec![param("", ParamType::String)]));

pub fn token0() -> &'static Function {
    &TOKEN0
}

pub fn token1() -> &'static Function {
    &TOKEN1
}

pub fn reserve0() -> &'static Function {
    &RESERVE0
}

pub fn reserve1() -> &'static Function {
    &RESERVE1
}

pub fn total_supply() -> &'static Function {
    &TOTAL_SUPPLY
}

/// ERC-20 `symbol() -> string`. Some older tokens return `bytes32`; see
/// `calls::decode_string_or_bytes32`.
pub fn symbol() -> &'static Function {
    &SYMBOL
}
