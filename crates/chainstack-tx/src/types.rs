//! Transaction field types.

use chainstack_core::{Address, ByteString, Nat};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// How a transaction pays for itself.
///
/// The gas layout encodes eight fields, the legacy fee layout seven; decode
/// tells them apart by field count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pricing {
    /// Legacy flat fee.
    Fee { fee: Nat },
    /// Gas price and gas limit. Zero encodes as an empty field.
    Gas {
        #[serde(default, rename = "gasPrice")]
        gas_price: Nat,
        #[serde(default)]
        gas: Nat,
    },
}

impl Pricing {
    pub fn gas(gas_price: Nat, gas: Nat) -> Self {
        Self::Gas { gas_price, gas }
    }

    pub fn fee(fee: Nat) -> Self {
        Self::Fee { fee }
    }

    pub fn is_zero_fee(&self) -> bool {
        matches!(self, Self::Fee { fee } if fee.is_zero())
    }
}

impl Default for Pricing {
    fn default() -> Self {
        Self::Gas {
            gas_price: Nat::zero(),
            gas: Nat::zero(),
        }
    }
}

/// Transaction contents, without signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionData {
    pub nonce: Nat,
    pub to: Address,
    /// Hash-lock digest, encoded verbatim (leading zeros are kept).
    #[serde(default, with = "optional_bytes")]
    pub hash_lock: Option<ByteString>,
    #[serde(default)]
    pub time_lock: Nat,
    #[serde(default)]
    pub value: Nat,
    #[serde(flatten)]
    pub pricing: Pricing,
    /// Arbitrary payload; JSON input without a `0x` prefix is taken as text.
    #[serde(default, deserialize_with = "extra_data")]
    pub extra_data: ByteString,
    /// Sender, needed only for the transaction id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
}

/// Signature plus optional hash-lock preimage.
///
/// `r`, `s` and `v` are stored trimmed, as they are encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Witness {
    pub r: ByteString,
    pub s: ByteString,
    pub v: Nat,
    #[serde(default, with = "optional_bytes")]
    pub hash_key: Option<ByteString>,
}

/// A signed transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedTransaction {
    /// Hex RLP of fields and witness.
    pub raw: ByteString,
    /// Transaction id: keccak-256 over fields and sender.
    pub hash: ByteString,
    pub tx: TransactionData,
    pub witness: Witness,
}

/// `null`, `""` and `"0x"` all mean absent.
mod optional_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<ByteString>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => bytes.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<ByteString>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => {
                let bytes = ByteString::from_hex(s).map_err(de::Error::custom)?;
                Ok((!bytes.is_empty()).then_some(bytes))
            }
        }
    }
}

fn extra_data<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ByteString, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(ByteString::empty()),
        Some(s) if s.starts_with("0x") => ByteString::from_hex(&s).map_err(de::Error::custom),
        Some(s) => Ok(ByteString::from_text(&s)),
    }
}
