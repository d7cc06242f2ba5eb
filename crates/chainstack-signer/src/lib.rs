//! # chainstack-signer
//!
//! secp256k1 signing and address recovery behind a pluggable [`Signer`] trait.

pub mod signer;

pub use signer::{public_key_to_address, recover_address, LocalSigner, Signature, Signer, SignerError};
