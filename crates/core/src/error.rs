//! Error taxonomy of the bidder.

use bidder_chain::{ChainError, FixedPointError};
use thiserror::Error;

/// Invalid or missing configuration. Fatal at startup, before any network call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Parameter {0} is not set")]
    Missing(&'static str),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }
}

#[derive(Debug, Error)]
pub enum BidderError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An expected chain record is absent.
    #[error("missing chain data: {0}")]
    DataAbsence(String),

    #[error(transparent)]
    Arithmetic(#[from] FixedPointError),
}

impl BidderError {
    /// Errors that only abort the action that raised them.
    pub fn is_action_scoped(&self) -> bool {
        match self {
            Self::Chain(e) => e.is_transaction_scoped(),
            Self::DataAbsence(_) => true,
            _ => false,
        }
    }
}

pub type Result<T, E = BidderError> = std::result::Result<T, E>;
