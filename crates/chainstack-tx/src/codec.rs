//! Mapping between transactions and RLP trees.
//!
//! Field order is fixed:
//!
//! - gas layout: `[nonce, to, hashLock, timeLock, value, gasPrice, gas, extraData]`
//! - fee layout: `[nonce, to, hashLock, timeLock, value, fee, extraData]`
//!
//! The signing payload is `[fields, chainId]`, the broadcast form is
//! `[fields, [r, s, v, hashKey]]` and the transaction id hashes
//! `[fields, from]`.

use chainstack_core::rlp::{self, RlpNode};
use chainstack_core::{keccak256, Address, ByteString, ChainId, Nat};
use thiserror::Error;

use crate::types::{Pricing, TransactionData, Witness};

/// Fields in the gas layout.
pub const GAS_FIELD_COUNT: usize = 8;
/// Fields in the legacy fee layout.
pub const FEE_FIELD_COUNT: usize = 7;

/// Errors from the transaction codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("RLP error: {0}")]
    Rlp(#[from] rlp::RlpError),
    #[error("malformed transaction: {0}")]
    Malformed(String),
    #[error("transaction id requires the sender address")]
    MissingSender,
}

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

fn nat_leaf(value: &Nat) -> RlpNode {
    RlpNode::leaf(value.as_bytes().clone())
}

/// The field list in wire order.
pub fn field_nodes(tx: &TransactionData) -> Vec<RlpNode> {
    let mut fields = Vec::with_capacity(GAS_FIELD_COUNT);
    fields.push(nat_leaf(&tx.nonce));
    fields.push(RlpNode::leaf(tx.to.to_byte_string()));
    fields.push(RlpNode::leaf(tx.hash_lock.clone().unwrap_or_default()));
    fields.push(nat_leaf(&tx.time_lock));
    fields.push(nat_leaf(&tx.value));
    match &tx.pricing {
        Pricing::Gas { gas_price, gas } => {
            fields.push(nat_leaf(gas_price));
            fields.push(nat_leaf(gas));
        }
        Pricing::Fee { fee } => fields.push(nat_leaf(fee)),
    }
    fields.push(RlpNode::leaf(tx.extra_data.clone()));
    fields
}

/// Signing payload: `RLP([fields, chainId])`.
pub fn rlp_unsigned(tx: &TransactionData, chain_id: ChainId) -> ByteString {
    rlp::encode(&RlpNode::list(vec![
        RlpNode::list(field_nodes(tx)),
        nat_leaf(&Nat::from(chain_id.as_u64())),
    ]))
}

/// keccak-256 of the signing payload.
pub fn signing_hash(tx: &TransactionData, chain_id: ChainId) -> [u8; 32] {
    keccak256(rlp_unsigned(tx, chain_id))
}

fn witness_node(witness: Option<&Witness>) -> RlpNode {
    let witness = witness.cloned().unwrap_or_default();
    RlpNode::list(vec![
        RlpNode::leaf(witness.r.trim_leading_zeros()),
        RlpNode::leaf(witness.s.trim_leading_zeros()),
        nat_leaf(&witness.v),
        RlpNode::leaf(witness.hash_key.unwrap_or_default().trim_leading_zeros()),
    ])
}

/// Broadcast form: `RLP([fields, [r, s, v, hashKey]])`. A missing witness
/// encodes as four empty fields.
pub fn rlp_signed(tx: &TransactionData, witness: Option<&Witness>) -> ByteString {
    rlp::encode(&RlpNode::list(vec![
        RlpNode::list(field_nodes(tx)),
        witness_node(witness),
    ]))
}

/// Transaction id: keccak-256 of `RLP([fields, from])`.
pub fn transaction_id(tx: &TransactionData) -> Result<[u8; 32]> {
    let from = tx.from.ok_or(CodecError::MissingSender)?;
    let encoded = rlp::encode(&RlpNode::list(vec![
        RlpNode::list(field_nodes(tx)),
        RlpNode::leaf(from.to_byte_string()),
    ]));
    Ok(keccak256(encoded))
}

/// Strictly decodes the broadcast form. A witness of empty `r`, `s` and `v`
/// decodes as `None`.
pub fn decode_signed(raw: &[u8]) -> Result<(TransactionData, Option<Witness>)> {
    let root = rlp::decode(raw)?;
    let parts = expect_list(&root, "transaction")?;
    let [fields, witness] = parts else {
        return Err(CodecError::Malformed(format!(
            "expected [fields, witness], got {} items",
            parts.len()
        )));
    };
    let tx = decode_fields(expect_list(fields, "fields")?)?;
    let witness = decode_witness(expect_list(witness, "witness")?)?;
    Ok((tx, witness))
}

fn decode_fields(fields: &[RlpNode]) -> Result<TransactionData> {
    let leaves = fields
        .iter()
        .map(|f| expect_leaf(f, "field"))
        .collect::<Result<Vec<_>>>()?;

    let (head, pricing, extra) = match leaves.as_slice() {
        [head @ .., gas_price, gas, extra] if leaves.len() == GAS_FIELD_COUNT => (
            head,
            Pricing::gas(nat("gasPrice", gas_price)?, nat("gas", gas)?),
            *extra,
        ),
        [head @ .., fee, extra] if leaves.len() == FEE_FIELD_COUNT => {
            (head, Pricing::fee(nat("fee", fee)?), *extra)
        }
        _ => {
            return Err(CodecError::Malformed(format!(
                "expected {GAS_FIELD_COUNT} or {FEE_FIELD_COUNT} fields, got {}",
                leaves.len()
            )))
        }
    };
    let [nonce, to, hash_lock, time_lock, value] = head else {
        return Err(CodecError::Malformed("field layout".to_string()));
    };

    let to = Address::from_slice(to.as_slice())
        .ok_or_else(|| CodecError::Malformed(format!("bad recipient {to}")))?;

    Ok(TransactionData {
        nonce: nat("nonce", nonce)?,
        to,
        hash_lock: (!hash_lock.is_empty()).then(|| (*hash_lock).clone()),
        time_lock: nat("timeLock", time_lock)?,
        value: nat("value", value)?,
        pricing,
        extra_data: extra.clone(),
        from: None,
    })
}

fn decode_witness(items: &[RlpNode]) -> Result<Option<Witness>> {
    let [r, s, v, hash_key] = items else {
        return Err(CodecError::Malformed(format!(
            "expected 4 witness items, got {}",
            items.len()
        )));
    };
    let r = expect_leaf(r, "r")?;
    let s = expect_leaf(s, "s")?;
    let v = nat("v", expect_leaf(v, "v")?)?;
    let hash_key = expect_leaf(hash_key, "hashKey")?;

    if r.is_empty() && s.is_empty() && v.is_zero() {
        return Ok(None);
    }
    Ok(Some(Witness {
        r: r.clone(),
        s: s.clone(),
        v,
        hash_key: (!hash_key.is_empty()).then(|| hash_key.clone()),
    }))
}

fn nat(name: &str, bytes: &ByteString) -> Result<Nat> {
    Nat::from_be_bytes(bytes.as_slice())
        .map_err(|e| CodecError::Malformed(format!("{name}: {e}")))
}

fn expect_list<'a>(node: &'a RlpNode, what: &str) -> Result<&'a [RlpNode]> {
    node.as_list()
        .ok_or_else(|| CodecError::Malformed(format!("{what} must be a list")))
}

fn expect_leaf<'a>(node: &'a RlpNode, what: &str) -> Result<&'a ByteString> {
    node.as_leaf()
        .ok_or_else(|| CodecError::Malformed(format!("{what} must be a byte string")))
}
