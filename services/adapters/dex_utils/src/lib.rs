//! Shared ledger ABI library
//!
//! Canonical call and event definitions for the contracts the rebalancer
//! reads and drives: the pair factory, the pairs themselves (plus their
//! ERC-20 tokens), and the rebalancer contract.
//!
//! # Architecture
//!
//! ```text
//! dex/
//! └── abi/
//!     ├── factory.rs     # allPairs(uint256), PairCreated
//!     ├── pair.rs        # token0/token1, reserve0/reserve1, totalSupply, symbol
//!     ├── rebalancer.rs  # rebalance, lastRebalance, cooldown, Rebalance
//!     ├── calls.rs       # calldata encoding and typed output decoding
//!     └── events.rs      # typed log decoders
//! ```
//!
//! # Design Principles
//! - Single canonical source for ABIs, built once
//! - No manual byte slicing: every encode/decode goes through ethabi

pub mod abi;

pub use abi::calls::{
    decode_address, decode_string_or_bytes32, decode_uint, encode_call, encode_output,
    selector_of,
};
pub use abi::events::{
    decode_log, pair_created_topic, rebalance_topic, DecodingError, LedgerLog, PairCreatedLog,
    RebalanceLog,
};
pub use ethabi::{Function, Token};
pub use ethereum_types::{H160, H256, U256};
