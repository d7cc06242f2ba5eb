//! Transaction envelope: signing, serialization and recovery.

use chainstack_core::{Address, AddressKind, ByteString, ChainId, FeePolicy, Nat};
use chainstack_signer::{recover_address, LocalSigner, Signature, Signer};

use crate::codec::{self, CodecError};
use crate::error::{Result, TxError};
use crate::fee;
use crate::types::{SignedTransaction, TransactionData, Witness};

/// A transaction and, once signed, its witness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    data: TransactionData,
    witness: Option<Witness>,
}

impl Transaction {
    pub fn new(data: TransactionData) -> Self {
        Self {
            data,
            witness: None,
        }
    }

    pub fn with_witness(data: TransactionData, witness: Witness) -> Self {
        Self {
            data,
            witness: Some(witness),
        }
    }

    /// Strictly decodes a broadcast-form transaction.
    pub fn from_raw(raw: impl AsRef<[u8]>) -> Result<Self> {
        let (data, witness) = codec::decode_signed(raw.as_ref())?;
        Ok(Self { data, witness })
    }

    /// Decodes a `0x`-hex broadcast-form transaction.
    pub fn from_raw_hex(raw: &str) -> Result<Self> {
        let bytes = ByteString::from_hex(raw)
            .map_err(|e| CodecError::Malformed(e.to_string()))?;
        Self::from_raw(bytes)
    }

    /// Decodes, falling back to an empty unsigned transaction when `raw` is
    /// malformed.
    pub fn from_raw_lenient(raw: impl AsRef<[u8]>) -> Self {
        Self::from_raw(raw).unwrap_or_default()
    }

    pub fn data(&self) -> &TransactionData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut TransactionData {
        &mut self.data
    }

    pub fn witness(&self) -> Option<&Witness> {
        self.witness.as_ref()
    }

    pub fn is_signed(&self) -> bool {
        self.witness.is_some()
    }

    /// Signs for `chain_id`, replacing any existing witness.
    pub fn sign(&mut self, signer: &impl Signer, chain_id: ChainId) -> Result<()> {
        let hash = codec::signing_hash(&self.data, chain_id);
        let sig = signer.sign_hash(&hash)?;
        let v = chain_id.signature_v(sig.recovery_id)?;
        self.witness = Some(Witness {
            r: ByteString::from(sig.r).trim_leading_zeros(),
            s: ByteString::from(sig.s).trim_leading_zeros(),
            v: Nat::from(v),
            hash_key: None,
        });
        Ok(())
    }

    /// Signs with a hex private key.
    pub fn sign_with_key(&mut self, private_key: &str, chain_id: ChainId) -> Result<()> {
        let signer = LocalSigner::from_hex(private_key)?;
        self.sign(&signer, chain_id)
    }

    /// Broadcast form, `RLP([fields, witness])`.
    pub fn serialize(&self) -> ByteString {
        codec::rlp_signed(&self.data, self.witness.as_ref())
    }

    /// Chain id carried by the witness's `v`.
    pub fn chain_id(&self) -> Result<ChainId> {
        let (chain_id, _) = self.split_v()?;
        Ok(chain_id)
    }

    fn split_v(&self) -> Result<(ChainId, u8)> {
        let witness = self.witness.as_ref().ok_or(TxError::Unsigned)?;
        let v = witness
            .v
            .to_u64()
            .ok_or_else(|| CodecError::Malformed(format!("v {} out of range", witness.v)))?;
        Ok(ChainId::split_v(v)?)
    }

    /// Recovers the signer's address from the witness.
    pub fn recover(&self) -> Result<Address> {
        let witness = self.witness.as_ref().ok_or(TxError::Unsigned)?;
        let (chain_id, recovery_id) = self.split_v()?;
        let hash = codec::signing_hash(&self.data, chain_id);
        let sig = Signature::from_parts(witness.r.as_slice(), witness.s.as_slice(), recovery_id)?;
        Ok(recover_address(&hash, &sig, AddressKind::Normal)?)
    }

    /// Transaction id. Uses `from` when set, otherwise the recovered signer.
    pub fn tx_hash(&self) -> Result<ByteString> {
        let mut data = self.data.clone();
        if data.from.is_none() {
            data.from = Some(self.recover()?);
        }
        Ok(ByteString::from(codec::transaction_id(&data)?))
    }

    pub fn signed_transaction(&self) -> Result<SignedTransaction> {
        let witness = self.witness.clone().ok_or(TxError::Unsigned)?;
        Ok(SignedTransaction {
            raw: self.serialize(),
            hash: self.tx_hash()?,
            tx: self.data.clone(),
            witness,
        })
    }

    /// Size-based fee estimate under `policy`.
    pub fn estimate_fee(&self, policy: &FeePolicy) -> Nat {
        fee::estimate_fee(
            self.serialize().len(),
            self.is_signed(),
            self.data.pricing.is_zero_fee(),
            policy,
        )
    }
}

impl From<TransactionData> for Transaction {
    fn from(data: TransactionData) -> Self {
        Self::new(data)
    }
}
