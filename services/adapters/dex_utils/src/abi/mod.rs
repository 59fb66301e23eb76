//! ABI definitions for the pair factory, pairs and the rebalancer contract
//!
//! Definitions are built once on first use and handed out as `&'static`.

pub mod calls;
pub mod events;
pub mod factory;
pub mod pair;
pub mod rebalancer;

use ethabi::{Function, Param, ParamType, StateMutability};

pub(crate) fn param(name: &str, kind: ParamType) -> Param {
    Param {
        name: name.to_string(),
        kind,
        internal_type: None,
    }
}

#[allow(deprecated)]
pub(crate) fn function(
    name: &str,
    inputs: Vec<Param>,
    outputs: Vec<Param>,
    state_mutability: StateMutability,
) -> Function {
    Function {
        name: name.to_string(),
        inputs,
        outputs,
        constant: None,
        state_mutability,
    }
}

pub(crate) fn view(name: &str, inputs: Vec<Param>, outputs: Vec<Param>) -> Function {
    function(name, inputs, outputs, StateMutability::View)
}
