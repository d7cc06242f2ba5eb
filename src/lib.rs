//! # chainstack
//!
//! Client library for chainstack nodes.
//!
//! - [`chainstack_core`]: byte-strings, natural numbers, RLP, addresses and
//!   client configuration.
//! - [`chainstack_signer`]: secp256k1 signing and address recovery.
//! - [`chainstack_tx`]: the transaction envelope codec.
//! - [`chainstack_rpc`]: JSON-RPC over HTTP, WebSocket and IPC with
//!   subscriptions.

pub use chainstack_core::{
    rlp, Address, AddressKind, ByteString, ChainId, ClientConfig, FeePolicy, Nat, RlpNode,
    V_OFFSET,
};
pub use chainstack_rpc::{
    Batch, Client, ConnectionState, RpcError, Subscription, SubscriptionEvent, SubscriptionState,
};
pub use chainstack_signer::{LocalSigner, Signature, Signer};
pub use chainstack_tx::{Pricing, SignedTransaction, Transaction, TransactionData, TxError, Witness};

pub use chainstack_core as primitives;
pub use chainstack_rpc as rpc;
pub use chainstack_signer as signer;
pub use chainstack_tx as tx;

use serde_json::Value;

/// Returns the library version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Broadcasts a signed transaction through `client`.
pub async fn broadcast(client: &Client, tx: &Transaction) -> chainstack_rpc::Result<Value> {
    client.send_raw_transaction(&tx.serialize()).await
}
