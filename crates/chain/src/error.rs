//! Errors surfaced by the chain adapter and transaction orchestrator.

use thiserror::Error;

use crate::fixed_point::FixedPointError;
use crate::types::H256;

/// Chain-side failure.
///
/// Connection and RPC failures propagate to the caller without retry.
/// Transaction failures (`NoSigningKey`, `Timeout`, `Dropped`, ...) are
/// scoped to the single action that produced them.
#[derive(Debug, Error)]
pub enum ChainError {
    /// No endpoint answered, or the transport failed mid-request.
    #[error("connection error: {0}")]
    Connection(String),

    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// A response could not be decoded into the expected type.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The signing secret URI could not be turned into a key.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Arithmetic(#[from] FixedPointError),

    /// Signing was requested but no signing key is configured.
    #[error("no signing keypair")]
    NoSigningKey,

    /// The node rejected the extrinsic on submission.
    #[error("submission rejected: {0}")]
    Submission(String),

    /// No terminal status within the wait window. The extrinsic may still land.
    #[error("transaction {hash} timed out after {secs}s")]
    Timeout { hash: H256, secs: u64 },

    /// Terminal failure status reported by the node.
    #[error("transaction {hash} failed with status {status}")]
    Dropped { hash: H256, status: &'static str },

    /// The status stream ended before the requested confirmation.
    #[error("status subscription for {hash} closed before confirmation")]
    SubscriptionClosed { hash: H256 },
}

impl ChainError {
    /// Whether this error only affects a single transaction.
    pub fn is_transaction_scoped(&self) -> bool {
        matches!(
            self,
            Self::NoSigningKey
                | Self::Submission(_)
                | Self::Timeout { .. }
                | Self::Dropped { .. }
                | Self::SubscriptionClosed { .. }
        )
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Connection(e.to_string())
        }
    }
}

pub type Result<T, E = ChainError> = std::result::Result<T, E>;
