//! Minimal ABI codec for constructor and method arguments.
//!
//! Supports the static elementary types (`address`, `bool`, `uintN`, `intN`,
//! `bytesN`) and the dynamic `bytes` / `string`. Arrays and tuples parse as
//! [`ParamType::Unsupported`] so real-world interface descriptors still load;
//! encoding against them fails with [`AbiError::UnsupportedType`].

use std::fmt;

use crate::error::AbiError;
use crate::types::Address;

/// A parameter type from an interface descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Bool,
    Uint(usize),
    Int(usize),
    FixedBytes(usize),
    Bytes,
    String,
    Unsupported(String),
}

impl ParamType {
    /// Parse a solidity type string (`uint8`, `address`, `bytes32`, ...).
    pub fn parse(s: &str) -> ParamType {
        match s {
            "address" => return ParamType::Address,
            "bool" => return ParamType::Bool,
            "bytes" => return ParamType::Bytes,
            "string" => return ParamType::String,
            "uint" => return ParamType::Uint(256),
            "int" => return ParamType::Int(256),
            _ => {}
        }
        let sized = |prefix: &str| -> Option<usize> {
            s.strip_prefix(prefix)
                .and_then(|n| n.parse::<usize>().ok())
        };
        if let Some(bits) = sized("uint").filter(|b| valid_int_bits(*b)) {
            return ParamType::Uint(bits);
        }
        if let Some(bits) = sized("int").filter(|b| valid_int_bits(*b)) {
            return ParamType::Int(bits);
        }
        if let Some(len) = sized("bytes").filter(|n| (1..=32).contains(n)) {
            return ParamType::FixedBytes(len);
        }
        ParamType::Unsupported(s.to_owned())
    }

    fn is_dynamic(&self) -> bool {
        matches!(self, ParamType::Bytes | ParamType::String)
    }
}

fn valid_int_bits(bits: usize) -> bool {
    bits > 0 && bits <= 256 && bits % 8 == 0
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Address => write!(f, "address"),
            ParamType::Bool => write!(f, "bool"),
            ParamType::Uint(bits) => write!(f, "uint{bits}"),
            ParamType::Int(bits) => write!(f, "int{bits}"),
            ParamType::FixedBytes(len) => write!(f, "bytes{len}"),
            ParamType::Bytes => write!(f, "bytes"),
            ParamType::String => write!(f, "string"),
            ParamType::Unsupported(raw) => write!(f, "{raw}"),
        }
    }
}

/// A typed argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Bool(bool),
    /// Unsigned 256-bit big-endian word.
    Uint([u8; 32]),
    /// Signed 256-bit two's-complement big-endian word.
    Int([u8; 32]),
    FixedBytes(Vec<u8>),
    Bytes(Vec<u8>),
    String(String),
}

impl Token {
    pub fn uint(value: u128) -> Token {
        let mut word = [0u8; 32];
        word[16..].copy_from_slice(&value.to_be_bytes());
        Token::Uint(word)
    }

    pub fn int(value: i128) -> Token {
        let fill = if value < 0 { 0xff } else { 0x00 };
        let mut word = [fill; 32];
        word[16..].copy_from_slice(&value.to_be_bytes());
        Token::Int(word)
    }

    /// `2^256 - 1`.
    pub fn max_uint256() -> Token {
        Token::Uint([0xff; 32])
    }

    /// `2^255 - 1`, the usual "infinite" allowance.
    pub fn max_int256() -> Token {
        let mut word = [0xff; 32];
        word[0] = 0x7f;
        Token::Int(word)
    }

    /// `whole * 10^18`, the common 18-decimal token unit.
    pub fn ether(whole: u64) -> Token {
        Token::uint(u128::from(whole) * 1_000_000_000_000_000_000)
    }

    fn kind(&self) -> &'static str {
        match self {
            Token::Address(_) => "address",
            Token::Bool(_) => "bool",
            Token::Uint(_) => "uint",
            Token::Int(_) => "int",
            Token::FixedBytes(_) => "fixed bytes",
            Token::Bytes(_) => "bytes",
            Token::String(_) => "string",
        }
    }

    fn check(&self, ty: &ParamType) -> Result<bool, AbiError> {
        Ok(match (self, ty) {
            (_, ParamType::Unsupported(raw)) => {
                return Err(AbiError::UnsupportedType(raw.clone()))
            }
            (Token::Address(_), ParamType::Address) => true,
            (Token::Bool(_), ParamType::Bool) => true,
            (Token::Uint(word), ParamType::Uint(bits)) => {
                if !fits_unsigned(word, *bits) {
                    return Err(overflow(word, ty));
                }
                true
            }
            (Token::Int(word), ParamType::Int(bits)) => {
                if !fits_signed(word, *bits) {
                    return Err(overflow(word, ty));
                }
                true
            }
            // Non-negative signed literals are accepted for unsigned params.
            (Token::Int(word), ParamType::Uint(bits)) => {
                if word[0] & 0x80 != 0 || !fits_unsigned(word, *bits) {
                    return Err(overflow(word, ty));
                }
                true
            }
            (Token::FixedBytes(bytes), ParamType::FixedBytes(len)) => bytes.len() == *len,
            (Token::Bytes(_), ParamType::Bytes) => true,
            (Token::String(_), ParamType::String) => true,
            _ => false,
        })
    }

    fn head_word(&self) -> [u8; 32] {
        match self {
            Token::Address(a) => a.to_word(),
            Token::Bool(b) => {
                let mut w = [0u8; 32];
                w[31] = u8::from(*b);
                w
            }
            Token::Uint(w) | Token::Int(w) => *w,
            Token::FixedBytes(bytes) => {
                let mut w = [0u8; 32];
                w[..bytes.len()].copy_from_slice(bytes);
                w
            }
            Token::Bytes(_) | Token::String(_) => [0u8; 32],
        }
    }

    fn tail(&self) -> Option<&[u8]> {
        match self {
            Token::Bytes(b) => Some(b),
            Token::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

impl From<Address> for Token {
    fn from(a: Address) -> Self {
        Token::Address(a)
    }
}

impl From<bool> for Token {
    fn from(b: bool) -> Self {
        Token::Bool(b)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token::String(s.to_owned())
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Token::String(s)
    }
}

fn fits_unsigned(word: &[u8; 32], bits: usize) -> bool {
    let free_bytes = (256 - bits) / 8;
    word[..free_bytes].iter().all(|b| *b == 0)
}

fn fits_signed(word: &[u8; 32], bits: usize) -> bool {
    let free_bytes = (256 - bits) / 8;
    let negative = word[free_bytes] & 0x80 != 0;
    let fill = if negative { 0xff } else { 0x00 };
    word[..free_bytes].iter().all(|b| *b == fill)
}

fn overflow(word: &[u8; 32], ty: &ParamType) -> AbiError {
    AbiError::Overflow {
        value: format!("0x{}", hex::encode(word)),
        ty: ty.to_string(),
    }
}

/// Encode `tokens` against `params` using the head/tail layout.
///
/// `context` names the constructor or method in error messages.
pub fn encode(params: &[ParamType], tokens: &[Token], context: &str) -> Result<Vec<u8>, AbiError> {
    if params.len() != tokens.len() {
        return Err(AbiError::Arity {
            context: context.to_owned(),
            expected: params.len(),
            actual: tokens.len(),
        });
    }
    for (index, (token, ty)) in tokens.iter().zip(params).enumerate() {
        if !token.check(ty)? {
            return Err(AbiError::TypeMismatch {
                context: context.to_owned(),
                index,
                expected: ty.to_string(),
                actual: token.kind().to_owned(),
            });
        }
    }

    let head_len = 32 * tokens.len();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for (token, ty) in tokens.iter().zip(params) {
        match token.tail().filter(|_| ty.is_dynamic()) {
            Some(data) => {
                head.extend_from_slice(&usize_word(head_len + tail.len()));
                tail.extend_from_slice(&usize_word(data.len()));
                tail.extend_from_slice(data);
                tail.resize(tail.len() + padding(data.len()), 0);
            }
            None => head.extend_from_slice(&token.head_word()),
        }
    }
    head.extend_from_slice(&tail);
    Ok(head)
}

fn usize_word(n: usize) -> [u8; 32] {
    let mut w = [0u8; 32];
    w[24..].copy_from_slice(&(n as u64).to_be_bytes());
    w
}

fn padding(len: usize) -> usize {
    (32 - len % 32) % 32
}

/// Read an address out of a 32-byte word; `None` if the upper 12 bytes are
/// not zero.
pub fn word_to_address(word: &[u8]) -> Option<Address> {
    if word.len() != 32 || word[..12].iter().any(|b| *b != 0) {
        return None;
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&word[12..]);
    Some(Address(out))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_elementary_types() {
        assert_eq!(ParamType::parse("uint8"), ParamType::Uint(8));
        assert_eq!(ParamType::parse("uint"), ParamType::Uint(256));
        assert_eq!(ParamType::parse("int256"), ParamType::Int(256));
        assert_eq!(ParamType::parse("bytes32"), ParamType::FixedBytes(32));
        assert_eq!(ParamType::parse("string"), ParamType::String);
        assert_eq!(
            ParamType::parse("address[]"),
            ParamType::Unsupported("address[]".into())
        );
        assert_eq!(ParamType::parse("uint7"), ParamType::Unsupported("uint7".into()));
    }

    #[test]
    fn encodes_static_arguments_in_place() {
        let out = encode(
            &[ParamType::Bool, ParamType::Bool],
            &[Token::Bool(true), Token::Bool(false)],
            "ctor",
        )
        .unwrap();
        assert_eq!(out.len(), 64);
        assert_eq!(out[31], 1);
        assert_eq!(out[63], 0);
    }

    #[test]
    fn encodes_dynamic_string_with_offset_and_padding() {
        let a = Address([0x22; 20]);
        let out = encode(
            &[ParamType::Address, ParamType::Uint(8), ParamType::String],
            &[a.into(), Token::uint(0), "xTKA".into()],
            "createERC20Wrapper",
        )
        .unwrap();
        // 3 head words + length word + one padded data word.
        assert_eq!(out.len(), 5 * 32);
        assert_eq!(&out[12..32], &[0x22; 20]);
        assert_eq!(out[95], 96, "offset points past the head");
        assert_eq!(out[127], 4, "string length");
        assert_eq!(&out[128..132], b"xTKA");
        assert!(out[132..].iter().all(|b| *b == 0));
    }

    #[test]
    fn rejects_wrong_arity() {
        let err = encode(&[ParamType::Address], &[], "initialize").unwrap_err();
        assert!(matches!(err, AbiError::Arity { expected: 1, actual: 0, .. }));
    }

    #[test]
    fn rejects_type_mismatch() {
        let err = encode(&[ParamType::Address], &[Token::Bool(true)], "initialize").unwrap_err();
        assert!(matches!(err, AbiError::TypeMismatch { index: 0, .. }));
    }

    #[test]
    fn rejects_overflowing_uint8() {
        let err = encode(&[ParamType::Uint(8)], &[Token::uint(256)], "f").unwrap_err();
        assert!(matches!(err, AbiError::Overflow { .. }));
    }

    #[test]
    fn negative_int_is_sign_extended() {
        let out = encode(&[ParamType::Int(8)], &[Token::int(-1)], "f").unwrap();
        assert!(out.iter().all(|b| *b == 0xff));
    }

    #[test]
    fn max_int256_accepted_for_uint256() {
        encode(&[ParamType::Uint(256)], &[Token::max_int256()], "approve").unwrap();
    }

    #[test]
    fn unsupported_param_fails_encoding() {
        let err = encode(
            &[ParamType::Unsupported("uint256[]".into())],
            &[Token::uint(1)],
            "f",
        )
        .unwrap_err();
        assert_eq!(err, AbiError::UnsupportedType("uint256[]".into()));
    }

    #[test]
    fn word_to_address_requires_zero_padding() {
        let a = Address([0x33; 20]);
        assert_eq!(word_to_address(&a.to_word()), Some(a));
        let mut dirty = a.to_word();
        dirty[0] = 1;
        assert_eq!(word_to_address(&dirty), None);
        assert_eq!(word_to_address(&[0u8; 31]), None);
    }
}
