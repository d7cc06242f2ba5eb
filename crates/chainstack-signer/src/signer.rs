//! Signing interface.
//!
//! Transactions are signed through the [`Signer`] trait so callers can plug
//! in remote or hardware signers; [`LocalSigner`] keeps a secp256k1 key in
//! memory.

use chainstack_core::{Address, AddressError, AddressKind};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use thiserror::Error;

/// Errors from signing and recovery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("signing failed: {0}")]
    SigningFailed(String),
    #[error("public key recovery failed")]
    RecoveryFailed,
    #[error(transparent)]
    Address(#[from] AddressError),
}

/// Result alias for signer operations.
pub type Result<T> = std::result::Result<T, SignerError>;

/// A recoverable ECDSA signature over a 32-byte digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// Parity of the ephemeral public key's y coordinate (0 or 1).
    pub recovery_id: u8,
}

impl Signature {
    /// `r || s || recovery_id`.
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.recovery_id;
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 65 {
            return Err(SignerError::InvalidSignature(format!(
                "expected 65 bytes, got {}",
                bytes.len()
            )));
        }
        Self::from_parts(&bytes[..32], &bytes[32..64], bytes[64])
    }

    /// Builds from big-endian `r` and `s` of up to 32 bytes each.
    pub fn from_parts(r: &[u8], s: &[u8], recovery_id: u8) -> Result<Self> {
        if recovery_id > 1 {
            return Err(SignerError::InvalidSignature(format!(
                "recovery id {recovery_id} out of range"
            )));
        }
        Ok(Self {
            r: left_pad_32(r)?,
            s: left_pad_32(s)?,
            recovery_id,
        })
    }
}

fn left_pad_32(bytes: &[u8]) -> Result<[u8; 32]> {
    if bytes.len() > 32 {
        return Err(SignerError::InvalidSignature(format!(
            "component of {} bytes exceeds 32",
            bytes.len()
        )));
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(out)
}

/// A signer that produces recoverable signatures over 32-byte digests.
pub trait Signer {
    /// Sign a prehashed message.
    fn sign_hash(&self, hash: &[u8; 32]) -> Result<Signature>;

    /// Returns the signer's address.
    fn address(&self) -> Address;
}

/// In-memory secp256k1 key with deterministic (RFC 6979) nonces.
#[derive(Clone)]
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    pub fn from_bytes(secret: &[u8]) -> Result<Self> {
        let key = SigningKey::from_slice(secret).map_err(|_| SignerError::InvalidPrivateKey)?;
        let address = public_key_to_address(key.verifying_key(), AddressKind::Normal)?;
        Ok(Self { key, address })
    }

    /// Parses a `0x`-prefixed (or bare) 32-byte hex key.
    pub fn from_hex(secret: &str) -> Result<Self> {
        let digits = secret.strip_prefix("0x").unwrap_or(secret);
        let bytes = hex::decode(digits).map_err(|_| SignerError::InvalidPrivateKey)?;
        Self::from_bytes(&bytes)
    }

    /// Derive addresses of the given kind instead of normal accounts.
    pub fn with_kind(mut self, kind: AddressKind) -> Result<Self> {
        self.address = public_key_to_address(self.key.verifying_key(), kind)?;
        Ok(self)
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        self.key.verifying_key()
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl Signer for LocalSigner {
    fn sign_hash(&self, hash: &[u8; 32]) -> Result<Signature> {
        let (sig, recid) = self
            .key
            .sign_prehash_recoverable(hash)
            .map_err(|e| SignerError::SigningFailed(e.to_string()))?;
        let bytes = sig.to_bytes();
        Signature::from_parts(&bytes[..32], &bytes[32..], recid.to_byte())
    }

    fn address(&self) -> Address {
        self.address
    }
}

/// Derives the address of a verifying key.
pub fn public_key_to_address(key: &VerifyingKey, kind: AddressKind) -> Result<Address> {
    let point = key.to_encoded_point(false);
    // skip the 0x04 tag
    let address = Address::from_public_key(&point.as_bytes()[1..], kind)?;
    Ok(address)
}

/// Recovers the signer's address from a digest and signature.
pub fn recover_address(hash: &[u8; 32], signature: &Signature, kind: AddressKind) -> Result<Address> {
    let sig = EcdsaSignature::from_scalars(signature.r, signature.s)
        .map_err(|e| SignerError::InvalidSignature(e.to_string()))?;
    let recid = RecoveryId::from_byte(signature.recovery_id)
        .ok_or_else(|| SignerError::InvalidSignature("bad recovery id".to_string()))?;
    let key = VerifyingKey::recover_from_prehash(hash, &sig, recid)
        .map_err(|_| SignerError::RecoveryFailed)?;
    public_key_to_address(&key, kind)
}
