//! Account addresses.
//!
//! An address is 22 bytes: a two-byte kind prefix followed by the last 20
//! bytes of the keccak-256 hash of an uncompressed public key. The text form
//! is `0x` plus 44 hex digits in checksum case.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::bytes::ByteString;
use crate::hash::keccak256;

/// Address width in bytes.
pub const ADDRESS_LEN: usize = 22;

/// Errors from parsing addresses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid address \"{0}\": expected 0x-prefixed {n} hex chars", n = ADDRESS_LEN * 2)]
    InvalidFormat(String),
    #[error("address \"{0}\" failed the capitalization checksum test")]
    BadChecksum(String),
    #[error("expected a 64-byte uncompressed public key, got {0} bytes")]
    InvalidPublicKey(usize),
}

/// Result alias for address operations.
pub type Result<T> = std::result::Result<T, AddressError>;

/// The account class encoded in an address's first two bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressKind {
    /// Externally owned account (`0x0000`).
    #[default]
    Normal,
    /// Token contract account (`0x0010`).
    Erc20,
}

impl AddressKind {
    pub const fn prefix(self) -> [u8; 2] {
        match self {
            Self::Normal => [0x00, 0x00],
            Self::Erc20 => [0x00, 0x10],
        }
    }

    pub fn from_prefix(prefix: [u8; 2]) -> Option<Self> {
        match prefix {
            [0x00, 0x00] => Some(Self::Normal),
            [0x00, 0x10] => Some(Self::Erc20),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Derives the address of a public key given as the 64-byte `x || y`
    /// encoding (uncompressed, without the `0x04` tag).
    pub fn from_public_key(public_key: &[u8], kind: AddressKind) -> Result<Self> {
        if public_key.len() != 64 {
            return Err(AddressError::InvalidPublicKey(public_key.len()));
        }
        let hash = keccak256(public_key);
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes[..2].copy_from_slice(&kind.prefix());
        bytes[2..].copy_from_slice(&hash[12..]);
        Ok(Self(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; ADDRESS_LEN]>::try_from(bytes).ok().map(Self)
    }

    /// Parses and, when the input is mixed-case, verifies the checksum.
    pub fn parse_checked(s: &str) -> Result<Self> {
        let address: Address = s.parse()?;
        let digits = &s[2..];
        let mixed = digits.chars().any(|c| c.is_ascii_uppercase())
            && digits.chars().any(|c| c.is_ascii_lowercase());
        if mixed && address.to_checksum() != s {
            return Err(AddressError::BadChecksum(s.to_string()));
        }
        Ok(address)
    }

    /// Kind recorded in the prefix, if it is a known one.
    pub fn kind(&self) -> Option<AddressKind> {
        AddressKind::from_prefix([self.0[0], self.0[1]])
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn to_byte_string(&self) -> ByteString {
        ByteString::from(self.0)
    }

    /// Checksum-cased text form.
    ///
    /// Hex digit `i` is uppercased when nibble `i` of keccak-256 over the
    /// lowercase hex digits is greater than 7.
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = keccak256(lower.as_bytes());
        let mut out = String::with_capacity(2 + lower.len());
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let byte = hash[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
            if nibble > 7 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .filter(|d| d.len() == ADDRESS_LEN * 2)
            .ok_or_else(|| AddressError::InvalidFormat(s.to_string()))?;
        let mut bytes = [0u8; ADDRESS_LEN];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|_| AddressError::InvalidFormat(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct AddressVisitor;

        impl<'de> Visitor<'de> for AddressVisitor {
            type Value = Address;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a 0x-prefixed 44 hex char address")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Address, E> {
                Address::parse_checked(v.trim()).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(AddressVisitor)
    }
}
