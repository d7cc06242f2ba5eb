//! # chainstack-core
//!
//! Byte-strings, natural numbers, RLP, addresses and client configuration
//! shared by the chainstack crates.

pub mod address;
pub mod bytes;
pub mod chain;
pub mod config;
pub mod hash;
pub mod nat;
pub mod rlp;

pub use address::{Address, AddressError, AddressKind, ADDRESS_LEN};
pub use bytes::{ByteError, ByteString};
pub use chain::{ChainError, ChainId, V_OFFSET};
pub use config::{ClientConfig, ConfigError, FeePolicy};
pub use hash::{keccak256, keccak256_bytes};
pub use nat::{Nat, NatError};
pub use rlp::{RlpError, RlpNode};
