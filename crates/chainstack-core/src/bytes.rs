//! Hex byte-string primitives.
//!
//! Every binary value crossing a public API is a [`ByteString`], rendered as
//! `0x` followed by an even number of lowercase hex digits (`0x` alone is the
//! empty string).

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors from parsing hex byte-strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ByteError {
    #[error("given value \"{0}\" is not a valid hex string")]
    InvalidHex(String),
    #[error("byte string is not valid UTF-8")]
    InvalidUtf8,
}

/// Result alias for byte-string operations.
pub type Result<T> = std::result::Result<T, ByteError>;

/// An owned sequence of bytes with a canonical `0x`-hex text form.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ByteString(Vec<u8>);

impl ByteString {
    /// The empty byte-string (`0x`).
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Parses `0x`-prefixed hex. An odd number of digits is left-padded
    /// with a single `0`.
    pub fn from_hex(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| ByteError::InvalidHex(s.to_string()))?;

        let decoded = if digits.len() % 2 == 1 {
            hex::decode(format!("0{digits}"))
        } else {
            hex::decode(digits)
        };
        decoded
            .map(Self)
            .map_err(|_| ByteError::InvalidHex(s.to_string()))
    }

    /// Encodes text as UTF-8, eliding leading and trailing NUL bytes.
    pub fn from_text(text: &str) -> Self {
        Self(strip_zero_padding(text.as_bytes()).to_vec())
    }

    /// Decodes the bytes as UTF-8 after eliding leading and trailing NULs.
    pub fn to_text(&self) -> Result<String> {
        String::from_utf8(strip_zero_padding(&self.0).to_vec()).map_err(|_| ByteError::InvalidUtf8)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Byte at `index`, if in range.
    pub fn at(&self, index: usize) -> Option<u8> {
        self.0.get(index).copied()
    }

    /// Bytes in `[start, end)`, clamped to the available range.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.0.len());
        let start = start.min(end);
        Self(self.0[start..end].to_vec())
    }

    /// Left-pads with zero bytes up to `len` bytes. Longer input is returned unchanged.
    pub fn pad_left(&self, len: usize) -> Self {
        if self.0.len() >= len {
            return self.clone();
        }
        let mut out = vec![0u8; len - self.0.len()];
        out.extend_from_slice(&self.0);
        Self(out)
    }

    /// Right-pads with zero bytes up to `len` bytes.
    pub fn pad_right(&self, len: usize) -> Self {
        let mut out = self.0.clone();
        if out.len() < len {
            out.resize(len, 0);
        }
        Self(out)
    }

    pub fn concat(&self, other: &ByteString) -> Self {
        let mut out = Vec::with_capacity(self.0.len() + other.0.len());
        out.extend_from_slice(&self.0);
        out.extend_from_slice(&other.0);
        Self(out)
    }

    /// Concatenates a sequence of byte-strings in order.
    pub fn flatten<'a>(parts: impl IntoIterator<Item = &'a ByteString>) -> Self {
        Self(parts.into_iter().flat_map(|p| p.0.iter().copied()).collect())
    }

    pub fn reverse(&self) -> Self {
        Self(self.0.iter().rev().copied().collect())
    }

    /// Drops leading zero bytes, yielding the canonical natural-number form.
    pub fn trim_leading_zeros(&self) -> Self {
        Self(trim_leading_zeros(&self.0).to_vec())
    }

    /// Lowercase hex with `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }
}

/// Leading-zero-free view of `bytes`.
pub fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn strip_zero_padding(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|&b| b != 0).map_or(start, |i| i + 1);
    &bytes[start..end]
}

impl fmt::Display for ByteString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ByteString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteString({})", self.to_hex())
    }
}

impl FromStr for ByteString {
    type Err = ByteError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for ByteString {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for ByteString {
    fn from(bytes: [u8; N]) -> Self {
        Self(bytes.to_vec())
    }
}

impl AsRef<[u8]> for ByteString {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for ByteString {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ByteString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ByteStringVisitor;

        impl<'de> Visitor<'de> for ByteStringVisitor {
            type Value = ByteString;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a 0x-prefixed hex string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<ByteString, E> {
                ByteString::from_hex(v.trim()).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(ByteStringVisitor)
    }
}
