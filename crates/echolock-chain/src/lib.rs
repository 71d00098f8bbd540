//! Bitcoin broadcast and confirmation tracking against an HTTP
//! chain-explorer interface.
//!
//! This crate never holds spending keys or builds transactions — it
//! validates already-constructed timelock transaction bytes, broadcasts
//! them, and polls an explorer until a target confirmation depth is
//! reached or the transaction is judged dropped.

mod client;
mod config;
mod monitor;

pub use client::{ExplorerClient, ExplorerError};
pub use config::{ChainConfig, Network};
pub use monitor::{wait_for_confirmation, ConfirmationData, TxStatus, TxStatusKind};

use echolock_primitives::kind::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("transaction bytes do not decode as a valid Bitcoin transaction")]
    InvalidTransaction,
    #[error("transaction has no inputs")]
    NoInputs,
    #[error("transaction has no outputs")]
    NoOutputs,
    #[error("explorer rejected broadcast (non-retryable): {0}")]
    BroadcastRejected(String),
    #[error("explorer error: {0}")]
    Explorer(#[from] ExplorerError),
    #[error("confirmation wait timed out after {0}s")]
    ConfirmationTimeout(u64),
    #[error("transaction dropped from mempool")]
    Dropped,
    #[error("mainnet use requires ChainConfig::unsafe_mainnet and ECHOLOCK_ALLOW_MAINNET=1")]
    MainnetNotAllowed,
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::InvalidTransaction | ChainError::NoInputs | ChainError::NoOutputs => {
                ErrorKind::Input
            }
            ChainError::BroadcastRejected(_) => ErrorKind::Permanent,
            ChainError::Explorer(e) => e.kind(),
            ChainError::ConfirmationTimeout(_) => ErrorKind::Timeout,
            ChainError::Dropped => ErrorKind::Permanent,
            ChainError::MainnetNotAllowed => ErrorKind::Input,
        }
    }
}

/// Locally validate a raw transaction before it is ever sent to the
/// explorer: decodable, at least one input, at least one output.
pub fn validate_transaction(tx_hex: &str) -> Result<bitcoin::Transaction, ChainError> {
    let bytes = hex::decode(tx_hex).map_err(|_| ChainError::InvalidTransaction)?;
    let tx: bitcoin::Transaction =
        bitcoin::consensus::deserialize(&bytes).map_err(|_| ChainError::InvalidTransaction)?;

    if tx.input.is_empty() {
        return Err(ChainError::NoInputs);
    }
    if tx.output.is_empty() {
        return Err(ChainError::NoOutputs);
    }

    Ok(tx)
}
