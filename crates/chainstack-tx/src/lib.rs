//! # chainstack-tx
//!
//! Transaction envelope: RLP serialization, signing, sender recovery,
//! transaction ids and fee estimation.
//!
//! ## Modules
//!
//! - [`codec`] — field layouts and the RLP forms of a transaction
//! - [`transaction`] — sign, serialize, recover
//! - [`fee`] — size-based fee heuristic

pub mod codec;
pub mod error;
pub mod fee;
pub mod transaction;
pub mod types;

pub use codec::CodecError;
pub use error::{Result, TxError};
pub use transaction::Transaction;
pub use types::{Pricing, SignedTransaction, TransactionData, Witness};
