//! Minimal ABI encoding for the argument shapes futures produce.
//!
//! Selectors are derived from the canonical signature of the resolved
//! argument types; static arguments occupy one 32-byte word, dynamic bytes
//! go through the offset/tail scheme. Richer types (arrays, tuples, strings)
//! belong to the compiler pipeline upstream of the engine.

use alloy_core::primitives::{Address, B256, Bytes, U256, keccak256};

/// An argument resolved to a concrete on-chain value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ResolvedArg {
    Address(Address),
    Uint(U256),
    Bool(bool),
    Word(B256),
    Bytes(Bytes),
}

impl ResolvedArg {
    fn type_name(&self) -> &'static str {
        match self {
            ResolvedArg::Address(_) => "address",
            ResolvedArg::Uint(_) => "uint256",
            ResolvedArg::Bool(_) => "bool",
            ResolvedArg::Word(_) => "bytes32",
            ResolvedArg::Bytes(_) => "bytes",
        }
    }

    fn is_dynamic(&self) -> bool {
        matches!(self, ResolvedArg::Bytes(_))
    }

    fn static_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        match self {
            ResolvedArg::Address(addr) => word[12..].copy_from_slice(addr.as_slice()),
            ResolvedArg::Uint(value) => word = value.to_be_bytes::<32>(),
            ResolvedArg::Bool(value) => word[31] = u8::from(*value),
            ResolvedArg::Word(value) => word.copy_from_slice(value.as_slice()),
            ResolvedArg::Bytes(_) => unreachable!("dynamic argument has no static word"),
        }
        word
    }
}

/// Map a literal JSON value onto an ABI argument.
///
/// Numbers and decimal strings become `uint256`; `0x`-prefixed strings become
/// an address (20 bytes), a word (32 bytes), or dynamic bytes by length.
pub(crate) fn resolve_literal(value: &serde_json::Value) -> Result<ResolvedArg, String> {
    match value {
        serde_json::Value::Bool(b) => Ok(ResolvedArg::Bool(*b)),
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(|v| ResolvedArg::Uint(U256::from(v)))
            .ok_or_else(|| format!("unsupported numeric literal: {n}")),
        serde_json::Value::String(s) if s.starts_with("0x") => {
            let hex = &s[2..];
            match hex.len() {
                40 => s
                    .parse::<Address>()
                    .map(ResolvedArg::Address)
                    .map_err(|_| format!("invalid address literal: {s}")),
                64 => s
                    .parse::<B256>()
                    .map(ResolvedArg::Word)
                    .map_err(|_| format!("invalid bytes32 literal: {s}")),
                _ => s
                    .parse::<Bytes>()
                    .map(ResolvedArg::Bytes)
                    .map_err(|_| format!("invalid bytes literal: {s}")),
            }
        }
        serde_json::Value::String(s) => U256::from_str_radix(s, 10)
            .map(ResolvedArg::Uint)
            .map_err(|_| format!("unsupported string literal: {s}")),
        other => Err(format!("unsupported literal: {other}")),
    }
}

/// ABI-encode the argument list (head words, then dynamic tails).
pub(crate) fn encode_args(args: &[ResolvedArg]) -> Vec<u8> {
    let head_size = args.len() * 32;
    let mut head = Vec::with_capacity(head_size);
    let mut tail: Vec<u8> = Vec::new();

    for arg in args {
        if arg.is_dynamic() {
            let offset = U256::from(head_size + tail.len());
            head.extend_from_slice(&offset.to_be_bytes::<32>());
            if let ResolvedArg::Bytes(bytes) = arg {
                tail.extend_from_slice(&U256::from(bytes.len()).to_be_bytes::<32>());
                tail.extend_from_slice(bytes);
                let padding = (32 - bytes.len() % 32) % 32;
                tail.extend(std::iter::repeat_n(0u8, padding));
            }
        } else {
            head.extend_from_slice(&arg.static_word());
        }
    }

    head.extend(tail);
    head
}

/// Selector plus encoded arguments for `function_name`.
pub(crate) fn encode_function_call(function_name: &str, args: &[ResolvedArg]) -> Bytes {
    let types: Vec<&str> = args.iter().map(|a| a.type_name()).collect();
    let signature = format!("{function_name}({})", types.join(","));
    let selector = &keccak256(signature.as_bytes())[..4];

    let mut data = Vec::with_capacity(4 + args.len() * 32);
    data.extend_from_slice(selector);
    data.extend(encode_args(args));
    Bytes::from(data)
}
