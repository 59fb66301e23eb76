//! Rebalancer contract ABI

use ethabi::{Event, EventParam, Function, ParamType, StateMutability};
use once_cell::sync::Lazy;

use super::{function, param, view};

static REBALANCE: Lazy<Function> = Lazy::new(|| {
    function(
        "rebalance",
        vec![
            param("pair", ParamType::Address),
            param("targetRatioBps", ParamType::Uint(256)),
        ],
        vec![],
        StateMutability::NonPayable,
    )
});

static LAST_REBALANCE: Lazy<Function> = Lazy::new(|| {
    view(
        "lastRebalance",
        vec![param("pair", ParamType::Address)],
        vec![param("timestamp", ParamType::Uint(256))],
    )
});

static COOLDOWN: Lazy<Function> =
    Lazy::new(|| view("cooldown", vec![], vec![param("seconds", ParamType::Uint(256))]));

static REBALANCE_EVENT: Lazy<Event> = Lazy::new(|| Event {
    name: "Rebalance".to_string(),
    inputs: vec![
        EventParam {
            name: "pair".to_string(),
            kind: ParamType::Address,
            indexed: true,
        },
        EventParam {
            name: "oldRatio".to_string(),
            kind: ParamType::Uint(256),
            indexed: false,
        },
        EventParam {
            name: "newRatio".to_string(),
            kind: ParamType::Uint(256),
            indexed: false,
        },
        EventParam {
            name: "targetRatio".to_string(),
            kind: ParamType::Uint(256),
            indexed: false,
        },
    ],
    anonymous: false,
});

/// `rebalance(address pair, uint256 targetRatioBps)`, state-mutating
pub fn rebalance() -> &'static Function {
    &REBALANCE
}

/// `lastRebalance(address) -> uint256` (unix seconds)
pub fn last_rebalance() -> &'static Function {
    &LAST_REBALANCE
}

/// `cooldown() -> uint256` (seconds)
pub fn cooldown() -> &'static Function {
    &COOLDOWN
}

/// event Rebalance(address indexed pair, uint256 oldRatio, uint256 newRatio, uint256 targetRatio)
pub fn rebalance_event() -> &'static Event {
    &REBALANCE_EVENT
}
