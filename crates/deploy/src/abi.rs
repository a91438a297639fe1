//! Constructor argument values and their ABI encoding.

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes, U256},
};
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// A constructor argument, kept in a serializable form so it can be written to manifests and
/// replayed to explorers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AbiValue {
    #[display("{_0}")]
    Address(Address),
    #[display("{_0}")]
    Uint(U256),
    #[display("{_0}")]
    Bytes32(B256),
    #[display("{_0}")]
    Bool(bool),
    #[display("{_0:?}")]
    String(String),
    #[display("0x{}", hex::encode(_0))]
    Bytes(Bytes),
}

impl AbiValue {
    /// Returns true for the zero address and zero words. Dynamic values are never zero.
    pub fn is_zero(&self) -> bool {
        match self {
            AbiValue::Address(address) => address.is_zero(),
            AbiValue::Uint(value) => value.is_zero(),
            AbiValue::Bytes32(word) => word.is_zero(),
            AbiValue::Bool(_) | AbiValue::String(_) | AbiValue::Bytes(_) => false,
        }
    }
}

impl From<&str> for AbiValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<&AbiValue> for DynSolValue {
    fn from(value: &AbiValue) -> Self {
        match value {
            AbiValue::Address(address) => DynSolValue::Address(*address),
            AbiValue::Uint(value) => DynSolValue::Uint(*value, 256),
            AbiValue::Bytes32(word) => DynSolValue::FixedBytes(*word, 32),
            AbiValue::Bool(value) => DynSolValue::Bool(*value),
            AbiValue::String(value) => DynSolValue::String(value.clone()),
            AbiValue::Bytes(value) => DynSolValue::Bytes(value.to_vec()),
        }
    }
}

/// ABI-encode `args` as a parameter list, the layout appended to creation code.
pub fn encode_args(args: &[AbiValue]) -> Vec<u8> {
    if args.is_empty() {
        return Vec::new();
    }
    DynSolValue::Tuple(args.iter().map(DynSolValue::from).collect()).abi_encode_params()
}

/// Hex encoding of the constructor arguments, as explorers expect it (no `0x` prefix).
pub fn encode_args_hex(args: &[AbiValue]) -> String {
    hex::encode(encode_args(args))
}
