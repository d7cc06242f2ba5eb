//! Keccak-256 helpers.

use sha3::{Digest, Keccak256};

use crate::bytes::ByteString;

/// Keccak-256 digest of `data`.
pub fn keccak256(data: impl AsRef<[u8]>) -> [u8; 32] {
    Keccak256::digest(data.as_ref()).into()
}

/// Keccak-256 digest of `data` as a byte-string.
pub fn keccak256_bytes(data: impl AsRef<[u8]>) -> ByteString {
    ByteString::from(keccak256(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_digest() {
        assert_eq!(
            keccak256_bytes([]).to_hex(),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn empty_list_digest() {
        // keccak of RLP([])
        assert_eq!(
            keccak256_bytes([0xc0]).to_hex(),
            "0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347"
        );
    }
}
