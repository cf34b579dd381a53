//! Backend abstraction over the node connection.
//!
//! Everything above this trait talks in typed storage queries and calls, so
//! the scanner, bidder and rebalancer run unchanged against the live
//! gateway ([`crate::HttpBackend`]) or the in-memory mock used in tests.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;
use std::fmt;

use crate::error::Result;
use crate::extrinsic::{Extrinsic, SigningParams};
use crate::types::{AccountId, Call, StorageKey, H256};

/// A storage item plus zero or more key arguments.
///
/// For maps, a prefix of the key arguments selects entries
/// (`loans.positions(KSM)` iterates every owner holding KSM).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageQuery {
    pub pallet: &'static str,
    pub item: &'static str,
    pub keys: Vec<Value>,
}

impl StorageQuery {
    pub fn new(pallet: &'static str, item: &'static str) -> Self {
        Self { pallet, item, keys: Vec::new() }
    }

    pub fn key(mut self, key: impl Serialize) -> Self {
        // Values built here are plain data types; serialization cannot fail.
        self.keys.push(serde_json::to_value(key).unwrap_or(Value::Null));
        self
    }

    pub fn path(&self) -> String {
        format!("{}.{}", self.pallet, self.item)
    }
}

impl fmt::Display for StorageQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.pallet, self.item)?;
        if !self.keys.is_empty() {
            let args: Vec<String> = self.keys.iter().map(|k| k.to_string()).collect();
            write!(f, "({})", args.join(", "))?;
        }
        Ok(())
    }
}

/// One entry of a storage map: the full key, its decoded key arguments and
/// the decoded value (`None` when the node returned an empty slot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub key: StorageKey,
    pub args: SmallVec<[Value; 2]>,
    pub value: Option<Value>,
}

/// Lifecycle status of a submitted extrinsic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TxStatus {
    Future,
    Ready,
    Broadcast(Vec<String>),
    InBlock(H256),
    Retracted(H256),
    FinalityTimeout(H256),
    Finalized(H256),
    Usurped(H256),
    Dropped,
    Invalid,
}

impl TxStatus {
    /// Statuses after which the extrinsic will never be included.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            Self::FinalityTimeout(_) | Self::Usurped(_) | Self::Dropped | Self::Invalid
        )
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Finalized(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Future => "Future",
            Self::Ready => "Ready",
            Self::Broadcast(_) => "Broadcast",
            Self::InBlock(_) => "InBlock",
            Self::Retracted(_) => "Retracted",
            Self::FinalityTimeout(_) => "FinalityTimeout",
            Self::Finalized(_) => "Finalized",
            Self::Usurped(_) => "Usurped",
            Self::Dropped => "Dropped",
            Self::Invalid => "Invalid",
        }
    }
}

/// Status stream of one submitted extrinsic. Dropping it unsubscribes.
pub struct TxSubscription {
    pub hash: H256,
    pub nonce: Option<u64>,
    pub statuses: BoxStream<'static, Result<TxStatus>>,
}

impl fmt::Debug for TxSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxSubscription")
            .field("hash", &self.hash)
            .field("nonce", &self.nonce)
            .finish_non_exhaustive()
    }
}

/// Node connection: storage reads, RPC calls, call encoding and submission.
///
/// Signing happens in [`crate::TxOrchestrator`]; backends only ever see
/// public keys and finished extrinsics.
#[async_trait]
pub trait ChainBackend: Send + Sync + fmt::Debug {
    /// Endpoint this backend is connected to.
    fn endpoint(&self) -> &str;

    /// Read a single storage value. `None` when the slot is empty.
    async fn storage(&self, query: &StorageQuery) -> Result<Option<Value>>;

    /// Read every entry under a (possibly partial) map key.
    async fn storage_entries(&self, query: &StorageQuery) -> Result<Vec<StorageEntry>>;

    /// Read at most `page_size` entries in key order, starting after `start_key`.
    async fn storage_entries_paged(
        &self,
        query: &StorageQuery,
        page_size: u32,
        start_key: Option<&StorageKey>,
    ) -> Result<Vec<StorageEntry>>;

    /// Raw RPC call.
    async fn rpc(&self, method: &str, params: Value) -> Result<Value>;

    /// SCALE-encoded call data of `call`.
    async fn encode_call(&self, call: &Call) -> Result<Vec<u8>>;

    /// Nonce and signed-extension bytes for the next extrinsic of `signer`.
    async fn signing_params(&self, signer: &AccountId) -> Result<SigningParams>;

    /// Submit and subscribe to status updates.
    async fn submit_and_watch(&self, extrinsic: &Extrinsic) -> Result<TxSubscription>;
}
