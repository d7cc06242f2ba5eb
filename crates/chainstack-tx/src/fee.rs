//! Size-based fee estimate.

use chainstack_core::{FeePolicy, Nat};

/// Estimated fee for a transaction whose broadcast form is `encoded_len`
/// bytes long.
///
/// Unsigned transactions are padded as if the witness were present; a
/// stated fee of zero is padded for the fee field it will grow into.
pub fn estimate_fee(encoded_len: usize, signed: bool, zero_fee: bool, policy: &FeePolicy) -> Nat {
    let mut bytes = encoded_len as u64;
    if !signed {
        bytes += policy.unsigned_witness_bytes;
    }
    if zero_fee {
        bytes += policy.zero_fee_padding_bytes;
    }
    Nat::from(bytes.saturating_mul(policy.rate_per_byte))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_transaction_pays_per_byte() {
        let fee = estimate_fee(104, true, false, &FeePolicy::default());
        assert_eq!(fee, Nat::from(10_400u64));
    }

    #[test]
    fn unsigned_and_zero_fee_padding() {
        let policy = FeePolicy::default();
        assert_eq!(estimate_fee(40, false, false, &policy), Nat::from(10_700u64));
        assert_eq!(estimate_fee(40, true, true, &policy), Nat::from(4_600u64));
        assert_eq!(estimate_fee(40, false, true, &policy), Nat::from(11_300u64));
    }

    #[test]
    fn custom_policy() {
        let policy = FeePolicy {
            rate_per_byte: 2,
            unsigned_witness_bytes: 0,
            zero_fee_padding_bytes: 0,
        };
        assert_eq!(estimate_fee(10, false, true, &policy), Nat::from(20u64));
    }
}
