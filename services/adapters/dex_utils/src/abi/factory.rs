//! Pair factory ABI
//!
//! The factory exposes only an indexed accessor over its pair registry; there
//! is no length accessor, which is why discovery probes indexes.

use ethabi::{Event, EventParam, Function, ParamType};
use once_cell::sync::Lazy;

use super::{param, view};

static ALL_PAIRS: Lazy<Function> = Lazy::new(|| {
    view(
        "allPairs",
        vec![param("index", ParamType::Uint(256))],
        vec![param("pair", ParamType::Address)],
    )
});

static PAIR_CREATED: Lazy<Event> = Lazy::new(|| Event {
    name: "PairCreated".to_string(),
    inputs: vec![
        EventParam {
            name: "token0".to_string(),
            kind: ParamType::Address,
            indexed: true,
        },
        EventParam {
            name: "token1".to_string(),
            kind: ParamType::Address,
            indexed: true,
        },
        EventParam {
            name: "pair".to_string(),
            kind: ParamType::Address,
            indexed: false,
        },
        EventParam {
            name: "index".to_string(),
            kind: ParamType::Uint(256),
            indexed: false,
        },
    ],
    anonymous: false,
});

/// `allPairs(uint256) -> address`
pub fn all_pairs() -> &'static Function {
    &ALL_PAIRS
}

/// event PairCreated(address indexed token0, address indexed token1, address pair, uint256 index)
pub fn pair_created_event() -> &'static Event {
    &PAIR_CREATED
}
