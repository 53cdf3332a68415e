use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::codec;

/// One target call bundled inside a proposal.
///
/// `calldata` holds the argument encoding only; the governor's timelock
/// re-derives the selector from `signature` when it executes the call. With an
/// empty `signature` the calldata is sent to the target as is.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    target: Address,
    value: U256,
    signature: String,
    calldata: Bytes,
    decoded_args: Vec<DynSolValue>,
}

impl Action {
    pub(crate) fn new(
        target: Address,
        value: U256,
        signature: String,
        calldata: Bytes,
        decoded_args: Vec<DynSolValue>,
    ) -> Self {
        Self {
            target,
            value,
            signature,
            calldata,
            decoded_args,
        }
    }

    pub fn target(&self) -> Address {
        self.target
    }

    pub fn value(&self) -> U256 {
        self.value
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn calldata(&self) -> &Bytes {
        &self.calldata
    }

    pub fn decoded_args(&self) -> &[DynSolValue] {
        &self.decoded_args
    }

    /// Decoded arguments rendered for logs and error messages
    pub fn display_args(&self) -> Vec<String> {
        self.decoded_args.iter().map(codec::format_value).collect()
    }

    pub fn to_raw(&self) -> RawAction {
        RawAction {
            target: self.target,
            value: self.value,
            signature: self.signature.clone(),
            calldata: self.calldata.clone(),
        }
    }
}

/// Action tuple exactly as the governor stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAction {
    pub target: Address,
    pub value: U256,
    pub signature: String,
    pub calldata: Bytes,
}
