//! Natural numbers in canonical RLP form.
//!
//! A [`Nat`] is a big-endian byte-string without leading zero bytes; zero is
//! the empty string. At the API boundary it reads and prints as a decimal
//! string, and also accepts `0x` hex input.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::U256;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::bytes::{trim_leading_zeros, ByteError, ByteString};

/// Largest natural number width, in bytes.
pub const MAX_NAT_BYTES: usize = 32;

/// Errors from parsing natural numbers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NatError {
    #[error("given value \"{0}\" is not a valid number")]
    InvalidNumber(String),
    #[error("number does not fit in {MAX_NAT_BYTES} bytes")]
    Overflow,
    #[error(transparent)]
    Hex(#[from] ByteError),
}

/// Result alias for natural-number operations.
pub type Result<T> = std::result::Result<T, NatError>;

/// A non-negative integer of at most 256 bits, stored trimmed.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Nat(ByteString);

impl Nat {
    pub const fn zero() -> Self {
        Self(ByteString::empty())
    }

    /// Builds from big-endian bytes, trimming leading zeros.
    pub fn from_be_bytes(bytes: &[u8]) -> Result<Self> {
        let trimmed = trim_leading_zeros(bytes);
        if trimmed.len() > MAX_NAT_BYTES {
            return Err(NatError::Overflow);
        }
        Ok(Self(ByteString::from(trimmed)))
    }

    /// Parses a decimal string (`"10000"`) or `0x` hex (`"0x2710"`).
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with("0x") || s.starts_with("0X") {
            let bytes = ByteString::from_hex(s)?;
            return Self::from_be_bytes(bytes.as_slice());
        }
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(NatError::InvalidNumber(s.to_string()));
        }
        let value = U256::from_str_radix(s, 10).map_err(|_| NatError::Overflow)?;
        Ok(Self::from(value))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    /// The trimmed big-endian bytes.
    pub fn as_bytes(&self) -> &ByteString {
        &self.0
    }

    pub fn to_u256(&self) -> U256 {
        U256::from_be_slice(self.0.as_slice())
    }

    pub fn to_u64(&self) -> Option<u64> {
        u64::try_from(self.to_u256()).ok()
    }

    pub fn to_decimal_string(&self) -> String {
        self.to_u256().to_string()
    }
}

impl From<u64> for Nat {
    fn from(value: u64) -> Self {
        Self(ByteString::from(trim_leading_zeros(&value.to_be_bytes())))
    }
}

impl From<U256> for Nat {
    fn from(value: U256) -> Self {
        let bytes: [u8; 32] = value.to_be_bytes::<32>();
        Self(ByteString::from(trim_leading_zeros(&bytes)))
    }
}

impl From<Nat> for ByteString {
    fn from(value: Nat) -> Self {
        value.0
    }
}

impl FromStr for Nat {
    type Err = NatError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Nat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal_string())
    }
}

impl fmt::Debug for Nat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nat({})", self.to_decimal_string())
    }
}

impl Serialize for Nat {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal_string())
    }
}

impl<'de> Deserialize<'de> for Nat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct NatVisitor;

        impl<'de> Visitor<'de> for NatVisitor {
            type Value = Nat;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a natural number as decimal string, hex string or integer")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Nat, E> {
                Ok(Nat::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Nat, E> {
                u64::try_from(v)
                    .map(Nat::from)
                    .map_err(|_| E::custom("natural numbers must be non-negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Nat, E> {
                Nat::parse(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(NatVisitor)
    }
}
