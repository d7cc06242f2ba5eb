use chainstack_core::ChainError;
use chainstack_signer::SignerError;
use thiserror::Error;

use crate::codec::CodecError;

/// Errors from transaction operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("signer error: {0}")]
    Signer(#[from] SignerError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("transaction is not signed")]
    Unsigned,
}

/// Result alias for transaction operations.
pub type Result<T> = std::result::Result<T, TxError>;
