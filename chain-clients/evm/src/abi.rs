//! ABI helpers for the token calls used in settlement
//!
//! Function signatures come from configuration, so calls are encoded and
//! decoded dynamically with `alloy-dyn-abi`. Only single-word parameters are
//! accepted (`address`, `uintN`, `bytes32`), which covers `approve`,
//! `transfer`, and the gateway forwarding call. Bytes past the declared
//! parameters are returned untouched so callers can read data appended to a
//! standard call.

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::{sol, SolCall};
use anyhow::{Context, Result};
use chain_clients_common::strip_hex_prefix;

/// Size of one ABI word in bytes
pub const WORD: usize = 32;

sol! {
    /// Standard token interface, used where the call is fixed.
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

/// A decoded or to-be-encoded ABI argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// 20-byte address, lowercase hex with 0x prefix
    Address(String),
    /// Unsigned integer (u128 covers every amount this system handles)
    Uint(u128),
    /// 32 raw bytes, lowercase hex without prefix
    Bytes32(String),
}

/// A parsed function signature such as `transfer(address,uint256)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    /// Canonical signature text
    pub text: String,
    /// Parameter types in order
    pub params: Vec<DynSolType>,
}

impl FunctionSignature {
    /// Parses a signature and canonicalizes its parameter types.
    pub fn parse(signature: &str) -> Result<Self> {
        let compact: String = signature.chars().filter(|c| !c.is_whitespace()).collect();
        let open = compact.find('(').ok_or_else(|| {
            anyhow::anyhow!("Function signature '{}' has no parameter list", signature)
        })?;
        if !compact.ends_with(')') || open == 0 {
            anyhow::bail!("Malformed function signature '{}'", signature);
        }

        let name = &compact[..open];
        let inner = &compact[open + 1..compact.len() - 1];
        let mut params = Vec::new();
        if !inner.is_empty() {
            for ty in inner.split(',') {
                let parsed = DynSolType::parse(ty)
                    .with_context(|| format!("Invalid parameter '{}' in '{}'", ty, signature))?;
                let single_word = matches!(
                    parsed,
                    DynSolType::Address | DynSolType::Uint(_) | DynSolType::FixedBytes(WORD)
                );
                if !single_word {
                    anyhow::bail!(
                        "ABI type '{}' in '{}' is not supported",
                        parsed.sol_type_name(),
                        signature
                    );
                }
                params.push(parsed);
            }
        }

        let names: Vec<String> = params.iter().map(|p| p.sol_type_name().into_owned()).collect();
        Ok(Self {
            text: format!("{}({})", name, names.join(",")),
            params,
        })
    }

    /// First four bytes of keccak256(signature)
    pub fn selector(&self) -> [u8; 4] {
        function_selector(&self.text)
    }
}

/// Computes the 4-byte selector of a canonical function signature
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Result of decoding calldata against a signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCall {
    /// Declared arguments
    pub args: Vec<Token>,
    /// Bytes following the declared arguments
    pub trailing: Vec<u8>,
}

/// Encodes a call: selector followed by one word per argument.
pub fn encode_call(signature: &FunctionSignature, args: &[Token]) -> Result<Vec<u8>> {
    if args.len() != signature.params.len() {
        anyhow::bail!(
            "Function '{}' expects {} arguments, got {}",
            signature.text,
            signature.params.len(),
            args.len()
        );
    }

    let values = signature
        .params
        .iter()
        .zip(args)
        .map(|(ty, arg)| to_sol_value(ty, arg))
        .collect::<Result<Vec<_>>>()?;

    let mut data = signature.selector().to_vec();
    data.extend_from_slice(&DynSolValue::Tuple(values).abi_encode_params());
    Ok(data)
}

/// Encodes `approve(spender, amount)`.
pub fn approve_calldata(spender: &str, amount: u128) -> Result<Vec<u8>> {
    let call = IERC20::approveCall {
        spender: parse_sol_address(spender)?,
        amount: U256::from(amount),
    };
    Ok(call.abi_encode())
}

/// Decodes calldata produced for `signature`.
///
/// Fails if the selector differs, the data is shorter than the declared
/// arguments, or the argument words are not canonically encoded (for
/// example an address word with non-zero padding).
pub fn decode_call(signature: &FunctionSignature, calldata: &[u8]) -> Result<DecodedCall> {
    if calldata.len() < 4 || calldata[..4] != signature.selector() {
        anyhow::bail!("Calldata is not a call to '{}'", signature.text);
    }

    let body = &calldata[4..];
    let needed = signature.params.len() * WORD;
    if body.len() < needed {
        anyhow::bail!(
            "Calldata for '{}' is {} bytes, expected at least {}",
            signature.text,
            body.len(),
            needed
        );
    }

    let head = &body[..needed];
    let decoded = DynSolType::Tuple(signature.params.clone())
        .abi_decode_params(head)
        .with_context(|| format!("Failed to decode arguments of '{}'", signature.text))?;
    if decoded.abi_encode_params() != head {
        anyhow::bail!(
            "Arguments of '{}' are not canonically encoded",
            signature.text
        );
    }

    let values = match decoded {
        DynSolValue::Tuple(values) => values,
        other => vec![other],
    };
    let args = values
        .iter()
        .map(from_sol_value)
        .collect::<Result<Vec<_>>>()?;

    Ok(DecodedCall {
        args,
        trailing: body[needed..].to_vec(),
    })
}

fn parse_sol_address(address: &str) -> Result<Address> {
    address
        .trim()
        .parse::<Address>()
        .with_context(|| format!("Invalid address '{}'", address))
}

fn to_sol_value(ty: &DynSolType, token: &Token) -> Result<DynSolValue> {
    match (ty, token) {
        (DynSolType::Address, Token::Address(address)) => {
            Ok(DynSolValue::Address(parse_sol_address(address)?))
        }
        (DynSolType::Uint(bits), Token::Uint(value)) => {
            Ok(DynSolValue::Uint(U256::from(*value), *bits))
        }
        (DynSolType::FixedBytes(size), Token::Bytes32(value)) => {
            let bytes = hex::decode(strip_hex_prefix(value))
                .with_context(|| format!("Invalid bytes32 '{}'", value))?;
            if bytes.len() > WORD {
                anyhow::bail!("bytes32 value '{}' is longer than 32 bytes", value);
            }
            let mut word = [0u8; WORD];
            word[..bytes.len()].copy_from_slice(&bytes);
            Ok(DynSolValue::FixedBytes(B256::from(word), *size))
        }
        (ty, token) => anyhow::bail!(
            "Argument {:?} does not match ABI type {}",
            token,
            ty.sol_type_name()
        ),
    }
}

fn from_sol_value(value: &DynSolValue) -> Result<Token> {
    match value {
        DynSolValue::Address(address) => {
            Ok(Token::Address(format!("0x{}", hex::encode(address.as_slice()))))
        }
        DynSolValue::Uint(value, _) => {
            let value: u128 = (*value)
                .try_into()
                .map_err(|_| anyhow::anyhow!("Integer argument does not fit in 128 bits"))?;
            Ok(Token::Uint(value))
        }
        DynSolValue::FixedBytes(word, _) => Ok(Token::Bytes32(hex::encode(word.as_slice()))),
        other => Err(anyhow::anyhow!("Unsupported decoded value {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erc20_selectors_match_known_values() {
        assert_eq!(hex::encode(function_selector("transfer(address,uint256)")), "a9059cbb");
        assert_eq!(hex::encode(function_selector("approve(address,uint256)")), "095ea7b3");
        assert_eq!(IERC20::transferCall::SELECTOR, [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn signatures_are_canonicalized() {
        let signature = FunctionSignature::parse("transfer(address, uint)").unwrap();
        assert_eq!(signature.text, "transfer(address,uint256)");
        assert_eq!(signature.params, vec![DynSolType::Address, DynSolType::Uint(256)]);
    }

    #[test]
    fn encode_then_decode_transfer_keeps_trailing_bytes() {
        let signature = FunctionSignature::parse("transfer(address, uint256)").unwrap();
        let mut data = encode_call(
            &signature,
            &[
                Token::Address("0x00000000000000000000000000000000000000AA".to_string()),
                Token::Uint(1000),
            ],
        )
        .unwrap();
        data.extend_from_slice(&[0x11; 32]);

        let decoded = decode_call(&signature, &data).unwrap();
        assert_eq!(
            decoded.args,
            vec![
                Token::Address("0x00000000000000000000000000000000000000aa".to_string()),
                Token::Uint(1000)
            ]
        );
        assert_eq!(decoded.trailing, vec![0x11; 32]);
    }

    #[test]
    fn approve_matches_dynamic_encoding() {
        let signature = FunctionSignature::parse("approve(address,uint256)").unwrap();
        let spender = "0x000000000000000000000000000000000000000e";
        let dynamic = encode_call(
            &signature,
            &[Token::Address(spender.to_string()), Token::Uint(1000)],
        )
        .unwrap();
        assert_eq!(approve_calldata(spender, 1000).unwrap(), dynamic);
    }

    #[test]
    fn decode_rejects_dirty_address_padding() {
        let signature = FunctionSignature::parse("approve(address,uint256)").unwrap();
        let mut data = signature.selector().to_vec();
        data.extend_from_slice(&[0xff; 32]);
        data.extend_from_slice(&[0u8; 32]);
        assert!(decode_call(&signature, &data).is_err());
    }

    #[test]
    fn unsupported_types_are_rejected() {
        assert!(FunctionSignature::parse("send(string)").is_err());
        assert!(FunctionSignature::parse("send(bytes)").is_err());
        assert!(FunctionSignature::parse("nothing").is_err());
    }
}
