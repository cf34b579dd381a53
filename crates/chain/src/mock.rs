//! In-memory [`ChainBackend`] for tests.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::backend::{ChainBackend, StorageEntry, StorageQuery, TxStatus, TxSubscription};
use crate::error::{ChainError, Result};
use crate::extrinsic::{Extrinsic, SigningParams};
use crate::types::{AccountId, Call, StorageKey, H256};

/// One recorded paged storage request.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub path: String,
    /// Key prefix the page iterates under
    pub keys: Vec<Value>,
    pub page_size: u32,
    pub start_key: Option<StorageKey>,
}

/// Paged reads and submissions, in the order they reached the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Page(PageRequest),
    Submit(Extrinsic),
}

#[derive(Debug, Default)]
struct State {
    /// Keyed by path and the JSON-encoded key arguments
    values: HashMap<(String, String), Value>,
    /// Map entries per storage path, ordered by key
    entries: HashMap<String, BTreeMap<StorageKey, StorageEntry>>,
    rpc: HashMap<String, Value>,
    /// Status scripts consumed one per submission
    statuses: VecDeque<Vec<TxStatus>>,
    default_statuses: Vec<TxStatus>,
    stalled: bool,
    nonce: u64,
    events: Vec<MockEvent>,
    fail_submission: Option<String>,
}

/// Scriptable backend. Storage, RPC results and transaction statuses are
/// registered up front; submitted extrinsics and paged reads are recorded.
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<State>,
}

fn to_value(v: impl Serialize) -> Value {
    serde_json::to_value(v).unwrap_or(Value::Null)
}

fn slot(query: &StorageQuery) -> (String, String) {
    (query.path(), Value::from(query.keys.clone()).to_string())
}

impl MockBackend {
    pub fn new() -> Self {
        let backend = Self::default();
        backend.state.lock().default_statuses = vec![
            TxStatus::Ready,
            TxStatus::InBlock(H256([0xbb; 32])),
            TxStatus::Finalized(H256([0xbb; 32])),
        ];
        backend
    }

    /// Register a plain value (or a map value at fully specified keys).
    pub fn with_storage(self, query: StorageQuery, value: impl Serialize) -> Self {
        self.state
            .lock()
            .values
            .insert(slot(&query), to_value(value));
        self
    }

    /// Register a map entry. Entries iterate in insertion order.
    pub fn with_entry(self, query: StorageQuery, value: Option<Value>) -> Self {
        {
            let mut state = self.state.lock();
            let path = query.path();
            if let Some(v) = &value {
                state.values.insert(slot(&query), v.clone());
            }
            let map = state.entries.entry(path).or_default();
            let index = map.len() as u32;
            let key = StorageKey(index.to_be_bytes().to_vec());
            map.insert(
                key.clone(),
                StorageEntry { key, args: SmallVec::from_vec(query.keys), value },
            );
        }
        self
    }

    pub fn with_rpc(self, method: &str, result: Value) -> Self {
        self.state.lock().rpc.insert(method.to_string(), result);
        self
    }

    /// Statuses every submission reports unless a script was pushed.
    pub fn with_statuses(self, statuses: Vec<TxStatus>) -> Self {
        self.state.lock().default_statuses = statuses;
        self
    }

    /// Script the statuses of the next submission.
    pub fn push_statuses(&self, statuses: Vec<TxStatus>) {
        self.state.lock().statuses.push_back(statuses);
    }

    /// Submissions never report a status.
    pub fn stalled(self) -> Self {
        self.state.lock().stalled = true;
        self
    }

    /// Reject every submission with `reason`.
    pub fn rejecting(self, reason: &str) -> Self {
        self.state.lock().fail_submission = Some(reason.to_string());
        self
    }

    /// Replace a value after construction.
    pub fn set_storage(&self, query: StorageQuery, value: impl Serialize) {
        self.state
            .lock()
            .values
            .insert(slot(&query), to_value(value));
    }

    pub fn submitted(&self) -> Vec<Extrinsic> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::Submit(xt) => Some(xt),
                MockEvent::Page(_) => None,
            })
            .collect()
    }

    pub fn page_requests(&self) -> Vec<PageRequest> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::Page(page) => Some(page),
                MockEvent::Submit(_) => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.state.lock().events.clone()
    }

    fn matching_entries(&self, query: &StorageQuery) -> Vec<StorageEntry> {
        let state = self.state.lock();
        state
            .entries
            .get(&query.path())
            .map(|map| {
                map.values()
                    .filter(|e| e.args.starts_with(&query.keys))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChainBackend for MockBackend {
    fn endpoint(&self) -> &str {
        "mock://"
    }

    async fn storage(&self, query: &StorageQuery) -> Result<Option<Value>> {
        let state = self.state.lock();
        Ok(state.values.get(&slot(query)).cloned())
    }

    async fn storage_entries(&self, query: &StorageQuery) -> Result<Vec<StorageEntry>> {
        Ok(self.matching_entries(query))
    }

    async fn storage_entries_paged(
        &self,
        query: &StorageQuery,
        page_size: u32,
        start_key: Option<&StorageKey>,
    ) -> Result<Vec<StorageEntry>> {
        self.state.lock().events.push(MockEvent::Page(PageRequest {
            path: query.path(),
            keys: query.keys.clone(),
            page_size,
            start_key: start_key.cloned(),
        }));
        Ok(self
            .matching_entries(query)
            .into_iter()
            .filter(|e| start_key.map_or(true, |start| &e.key > start))
            .take(page_size as usize)
            .collect())
    }

    async fn rpc(&self, method: &str, _params: Value) -> Result<Value> {
        self.state
            .lock()
            .rpc
            .get(method)
            .cloned()
            .ok_or_else(|| ChainError::Rpc { code: -32601, message: format!("method not found: {method}") })
    }

    /// Call data is the call's JSON.
    async fn encode_call(&self, call: &Call) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(call)?)
    }

    /// Nonces count up from zero across all signers.
    async fn signing_params(&self, _signer: &AccountId) -> Result<SigningParams> {
        let mut state = self.state.lock();
        let nonce = state.nonce;
        state.nonce += 1;
        Ok(SigningParams { nonce, extra: nonce.to_le_bytes().to_vec(), additional: b"mock".to_vec() })
    }

    async fn submit_and_watch(&self, extrinsic: &Extrinsic) -> Result<TxSubscription> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.fail_submission {
            return Err(ChainError::Submission(reason.clone()));
        }
        state.events.push(MockEvent::Submit(extrinsic.clone()));
        let hash = extrinsic.hash();

        let statuses = if state.stalled {
            stream::pending::<Result<TxStatus>>().boxed()
        } else {
            let script = state
                .statuses
                .pop_front()
                .unwrap_or_else(|| state.default_statuses.clone());
            stream::iter(script.into_iter().map(Ok)).boxed()
        };

        Ok(TxSubscription { hash, nonce: extrinsic.nonce(), statuses })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_paging_by_prefix() {
        let backend = MockBackend::new()
            .with_entry(StorageQuery::new("m", "x").key(1).key("a"), Some(Value::from(1)))
            .with_entry(StorageQuery::new("m", "x").key(2).key("b"), Some(Value::from(2)))
            .with_entry(StorageQuery::new("m", "x").key(1).key("c"), Some(Value::from(3)));

        let q = StorageQuery::new("m", "x").key(1);
        let first = backend.storage_entries_paged(&q, 1, None).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].value, Some(Value::from(1)));

        let second = backend
            .storage_entries_paged(&q, 1, Some(&first[0].key))
            .await
            .unwrap();
        assert_eq!(second[0].value, Some(Value::from(3)));

        let third = backend
            .storage_entries_paged(&q, 1, Some(&second[0].key))
            .await
            .unwrap();
        assert!(third.is_empty());
        assert_eq!(backend.page_requests().len(), 3);
    }
}
