//! Action Codec
//!
//! Turns a contract call into the `(target, value, signature, calldata)` tuple a
//! GovernorAlpha-style governor stores, and decodes calldata back into argument
//! values for verification and diagnostics.
//!
//! The signature is the canonical `name(type,...)` text: the timelock hashes it to
//! rebuild the selector at execution time, so `calldata` never carries the selector.

use alloy_dyn_abi::{DynSolValue, JsonAbiExt};
use alloy_json_abi::{Function, JsonAbi};
use alloy_primitives::{hex, Address, Bytes, U256};
use tracing::debug;

use crate::error::{ProposalError, Result};
use crate::models::{Action, RawAction};

const SELECTOR_LEN: usize = 4;

/// A contract address paired with the interface used to encode calls against it
#[derive(Debug, Clone)]
pub struct ContractHandle {
    address: Address,
    abi: JsonAbi,
}

impl ContractHandle {
    pub fn new(address: Address, abi: JsonAbi) -> Self {
        Self { address, abi }
    }

    /// Load the interface from a standard JSON ABI document
    pub fn from_json(address: Address, json: &str) -> Result<Self> {
        let abi: JsonAbi = serde_json::from_str(json).map_err(|e| ProposalError::InvalidSignature {
            signature: "<json abi>".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(address, abi))
    }

    /// Build the interface from human-readable signatures, e.g. `"set(uint256)"`
    pub fn from_signatures<'a, I>(address: Address, signatures: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut abi = JsonAbi::default();
        for signature in signatures {
            let function = parse_signature(signature)?;
            abi.functions
                .entry(function.name.clone())
                .or_default()
                .push(function);
        }
        Ok(Self::new(address, abi))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Resolve a method by bare name (must not be overloaded) or by full signature
    pub fn function(&self, method: &str) -> Result<&Function> {
        let unknown = || ProposalError::UnknownMethod {
            method: method.to_string(),
        };

        if method.contains('(') {
            let wanted = parse_signature(method)?;
            let canonical = wanted.signature();
            return self
                .abi
                .function(&wanted.name)
                .and_then(|overloads| overloads.iter().find(|f| f.signature() == canonical))
                .ok_or_else(unknown);
        }

        match self.abi.function(method).map(Vec::as_slice) {
            Some([function]) => Ok(function),
            Some(overloads) if !overloads.is_empty() => Err(ProposalError::AmbiguousMethod {
                method: method.to_string(),
                candidates: overloads.iter().map(Function::signature).collect(),
            }),
            _ => Err(unknown()),
        }
    }
}

/// Parse a textual function signature such as `"transfer(address,uint256)"`
pub fn parse_signature(signature: &str) -> Result<Function> {
    Function::parse(signature).map_err(|e| ProposalError::InvalidSignature {
        signature: signature.to_string(),
        reason: e.to_string(),
    })
}

/// Encode a call against a contract interface into a proposal action.
///
/// The decoded calldata is compared with `args` before the action is returned.
pub fn encode_contract_call(
    contract: &ContractHandle,
    method: &str,
    args: &[DynSolValue],
    value: U256,
) -> Result<Action> {
    let function = contract.function(method)?;
    let signature = function.signature();

    if function.inputs.len() != args.len() {
        return Err(ProposalError::ArityMismatch {
            method: signature,
            expected: function.inputs.len(),
            actual: args.len(),
        });
    }

    let mut encoded = function.abi_encode_input(args)?;
    let calldata = Bytes::from(encoded.split_off(SELECTOR_LEN));

    let decoded_args = function.abi_decode_input(&calldata, true)?;
    if decoded_args.as_slice() != args {
        return Err(ProposalError::RoundTripMismatch { signature });
    }

    debug!(
        target = %contract.address(),
        signature = signature,
        calldata_len = calldata.len(),
        "Encoded contract action"
    );

    Ok(Action::new(
        contract.address(),
        value,
        signature,
        calldata,
        decoded_args,
    ))
}

/// Accept a manually supplied action tuple; arguments are derived from the calldata.
///
/// An empty signature is allowed: the timelock then forwards `calldata` untouched,
/// so there are no arguments to decode.
pub fn decode_raw_action(raw: RawAction) -> Result<Action> {
    let decoded_args = if raw.signature.is_empty() {
        Vec::new()
    } else {
        decode_calldata(&raw.signature, &raw.calldata)?
    };
    Ok(Action::new(
        raw.target,
        raw.value,
        raw.signature,
        raw.calldata,
        decoded_args,
    ))
}

/// Decode selector-less calldata against a signature
pub fn decode_calldata(signature: &str, calldata: &[u8]) -> Result<Vec<DynSolValue>> {
    let function = parse_signature(signature)?;
    Ok(function.abi_decode_input(calldata, true)?)
}

/// Full call data (selector included) for invoking `signature` directly on a target
pub fn encode_call(signature: &str, args: &[DynSolValue]) -> Result<Bytes> {
    let function = parse_signature(signature)?;
    Ok(function.abi_encode_input(args)?.into())
}

/// Call data the timelock sends to the action's target
pub fn target_call_data(action: &Action) -> Result<Bytes> {
    if action.signature().is_empty() {
        return Ok(action.calldata().clone());
    }
    encode_call(action.signature(), action.decoded_args())
}

/// Render a decoded value for humans
pub fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(i, _) => i.to_string(),
        DynSolValue::Uint(u, _) => u.to_string(),
        DynSolValue::FixedBytes(word, size) => hex::encode_prefixed(&word[..*size]),
        DynSolValue::Address(address) => address.to_string(),
        DynSolValue::Function(function) => hex::encode_prefixed(function.as_slice()),
        DynSolValue::Bytes(bytes) => hex::encode_prefixed(bytes),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            format!("[{}]", join_values(items))
        }
        DynSolValue::Tuple(items) => format!("({})", join_values(items)),
        #[allow(unreachable_patterns)]
        other => format!("{other:?}"),
    }
}

fn join_values(items: &[DynSolValue]) -> String {
    items.iter().map(format_value).collect::<Vec<_>>().join(", ")
}
