//! Chain identifiers and the replay-protected `v` value.
//!
//! A signature's `v` carries both the chain id and the ECDSA recovery id:
//! `v = chain_id * 2 + V_OFFSET + recovery_id`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Offset added to `chain_id * 2` when building `v`.
pub const V_OFFSET: u64 = 54;

/// Errors from splitting a `v` value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("v value {0} is below the chain offset {V_OFFSET}")]
    VBelowOffset(u64),
    #[error("v value {0} overflows")]
    VOverflow(u64),
}

/// Numeric chain identifier mixed into signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(u64);

impl ChainId {
    /// Chain used when the caller names none.
    pub const DEFAULT: ChainId = ChainId(1);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// `v` for a signature with the given recovery id (0 or 1).
    pub fn signature_v(self, recovery_id: u8) -> Result<u64, ChainError> {
        self.0
            .checked_mul(2)
            .and_then(|v| v.checked_add(V_OFFSET + u64::from(recovery_id & 1)))
            .ok_or(ChainError::VOverflow(self.0))
    }

    /// Splits `v` back into the chain id and the recovery id.
    pub fn split_v(v: u64) -> Result<(ChainId, u8), ChainError> {
        let shifted = v.checked_sub(V_OFFSET).ok_or(ChainError::VBelowOffset(v))?;
        Ok((ChainId(shifted / 2), (shifted % 2) as u8))
    }
}

impl Default for ChainId {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(chain: ChainId) -> u64 {
        chain.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v_for_known_chains() {
        assert_eq!(ChainId::new(1).signature_v(0).unwrap(), 56);
        assert_eq!(ChainId::new(1).signature_v(1).unwrap(), 57);
        assert_eq!(ChainId::new(3).signature_v(0).unwrap(), 60);
    }

    #[test]
    fn split_recovers_both_parts() {
        for chain in [0u64, 1, 3, 1337] {
            for recid in [0u8, 1] {
                let v = ChainId::new(chain).signature_v(recid).unwrap();
                assert_eq!(ChainId::split_v(v).unwrap(), (ChainId::new(chain), recid));
            }
        }
    }

    #[test]
    fn split_rejects_small_v() {
        assert_eq!(ChainId::split_v(27), Err(ChainError::VBelowOffset(27)));
    }

    #[test]
    fn overflow_is_reported() {
        assert!(ChainId::new(u64::MAX).signature_v(0).is_err());
    }

    #[test]
    fn default_is_one() {
        assert_eq!(ChainId::default().as_u64(), 1);
    }

    #[test]
    fn serde_roundtrip() {
        let json = serde_json::to_string(&ChainId::new(8453)).unwrap();
        assert_eq!(json, "8453");
        let back: ChainId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChainId::new(8453));
    }
}
