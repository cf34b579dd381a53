//! Transaction orchestration: sign, submit, watch, time out.
//!
//! Signing is local: the backend encodes the call and reports the signer's
//! nonce and extension bytes, the key signs here.
//!
//! Every extrinsic follows the same lifecycle. Statuses before `Ready` are
//! skipped, `InBlock`/`Broadcast`/`Retracted` are logged, and the wait ends at
//! the first status satisfying the requested [`Confirmation`], a terminal
//! failure status, or the timeout. Dropping the subscription on return
//! unsubscribes from further updates.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::backend::{ChainBackend, TxStatus, TxSubscription};
use crate::error::{ChainError, Result};
use crate::extrinsic::{Extrinsic, KeyPair};
use crate::types::{AccountId, Call, H256};

/// Maximum time to wait for a submitted extrinsic.
pub const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(60);

/// How far a transaction must progress before the caller continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// First status past `Ready` (the node has accepted the extrinsic).
    Accepted,
    /// Included in a finalized block.
    Finalized,
}

/// Result of a transaction that reached its confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    /// Dry run: nothing was signed or submitted.
    Skipped,
    Accepted { hash: H256, status: &'static str },
    Finalized { hash: H256, block: H256 },
}

impl TxOutcome {
    pub fn hash(&self) -> Option<H256> {
        match self {
            Self::Skipped => None,
            Self::Accepted { hash, .. } | Self::Finalized { hash, .. } => Some(*hash),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

/// Status interpreter for a single in-flight transaction.
#[derive(Debug)]
pub struct PendingTransaction {
    hash: H256,
    confirmation: Confirmation,
    included_in: Option<H256>,
}

impl PendingTransaction {
    pub fn new(hash: H256, confirmation: Confirmation) -> Self {
        Self { hash, confirmation, included_in: None }
    }

    /// Feed the next status. `Some` ends the wait.
    pub fn observe(&mut self, status: &TxStatus) -> Option<Result<TxOutcome>> {
        if matches!(status, TxStatus::Future | TxStatus::Ready) {
            return None;
        }
        if status.is_terminal_failure() {
            return Some(Err(ChainError::Dropped { hash: self.hash, status: status.name() }));
        }
        if self.confirmation == Confirmation::Accepted {
            return Some(Ok(TxOutcome::Accepted { hash: self.hash, status: status.name() }));
        }

        match status {
            TxStatus::Broadcast(peers) => {
                debug!(hash = %self.hash, peers = peers.len(), "Transaction broadcast");
                None
            }
            TxStatus::InBlock(block) => {
                info!(hash = %self.hash, block = %block, "Transaction in block");
                self.included_in = Some(*block);
                None
            }
            TxStatus::Retracted(block) => {
                warn!(hash = %self.hash, block = %block, "Transaction block retracted");
                self.included_in = None;
                None
            }
            TxStatus::Finalized(block) => {
                Some(Ok(TxOutcome::Finalized { hash: self.hash, block: *block }))
            }
            _ => None,
        }
    }
}

/// Extrinsic handed to the node. Dry runs never reach the node.
#[derive(Debug)]
pub enum Submission {
    Skipped,
    Pending(TxSubscription),
}

/// Signs, submits and waits on extrinsics for one signing account.
#[derive(Debug, Clone)]
pub struct TxOrchestrator {
    backend: Arc<dyn ChainBackend>,
    signer: Option<KeyPair>,
    dry_run: bool,
    timeout: Duration,
    explorer_url: Option<String>,
}

impl TxOrchestrator {
    pub fn new(backend: Arc<dyn ChainBackend>, signer: Option<KeyPair>) -> Self {
        Self {
            backend,
            signer,
            dry_run: false,
            timeout: DEFAULT_TX_TIMEOUT,
            explorer_url: None,
        }
    }

    /// Log calls instead of submitting them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Block explorer base URL; transaction links are `<base>/extrinsic/<hash>`.
    pub fn with_explorer(mut self, url: impl Into<String>) -> Self {
        self.explorer_url = Some(url.into());
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    /// Address of the signing account, derived from the key.
    pub fn signer_account(&self) -> Result<&AccountId> {
        self.signer.as_ref().map(KeyPair::account).ok_or(ChainError::NoSigningKey)
    }

    /// Sign `call` with the configured key, submit it and wait for `confirmation`.
    #[instrument(skip_all, fields(method = call.method()))]
    pub async fn sign_and_send(&self, call: Call, confirmation: Confirmation) -> Result<TxOutcome> {
        let key = self.signer.as_ref().ok_or(ChainError::NoSigningKey)?;
        if self.dry_run {
            info!(call = %call.to_human(), "Dry run, not submitting");
            return Ok(TxOutcome::Skipped);
        }

        let call_data = self.backend.encode_call(&call).await?;
        let params = self.backend.signing_params(key.account()).await?;
        let extrinsic = Extrinsic::signed(call, &call_data, key, &params);
        debug!(signer = %key.account(), nonce = params.nonce, hash = %extrinsic.hash(), "Signed extrinsic");
        let subscription = self.backend.submit_and_watch(&extrinsic).await?;
        self.wait(Submission::Pending(subscription), confirmation).await
    }

    /// Submit an unsigned extrinsic without waiting.
    ///
    /// Lets the caller fire several liquidations before waiting on any.
    pub async fn submit_unsigned(&self, call: Call) -> Result<Submission> {
        if self.dry_run {
            info!(call = %call.to_human(), "Dry run, not submitting");
            return Ok(Submission::Skipped);
        }
        let call_data = self.backend.encode_call(&call).await?;
        let subscription = self.backend.submit_and_watch(&Extrinsic::unsigned(call, &call_data)).await?;
        Ok(Submission::Pending(subscription))
    }

    /// Wait on a submission's status stream.
    pub async fn wait(&self, submission: Submission, confirmation: Confirmation) -> Result<TxOutcome> {
        let TxSubscription { hash, nonce, mut statuses } = match submission {
            Submission::Skipped => return Ok(TxOutcome::Skipped),
            Submission::Pending(sub) => sub,
        };

        match &self.explorer_url {
            Some(base) => info!(%hash, ?nonce, url = %format!("{}/extrinsic/{}", base.trim_end_matches('/'), hash), "Transaction submitted"),
            None => info!(%hash, ?nonce, "Transaction submitted"),
        }

        let mut pending = PendingTransaction::new(hash, confirmation);
        let watch = async {
            while let Some(status) = statuses.next().await {
                let status = status?;
                debug!(%hash, status = status.name(), "Transaction status");
                if let Some(outcome) = pending.observe(&status) {
                    return outcome;
                }
            }
            Err(ChainError::SubscriptionClosed { hash })
        };

        let outcome = match tokio::time::timeout(self.timeout, watch).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ChainError::Timeout { hash, secs: self.timeout.as_secs() }),
        };

        match &outcome {
            Ok(TxOutcome::Finalized { block, .. }) => info!(%hash, %block, "Transaction finalized"),
            Ok(TxOutcome::Accepted { status, .. }) => info!(%hash, status, "Transaction accepted"),
            Ok(TxOutcome::Skipped) => {}
            Err(e) => warn!(%hash, error = %e, "Transaction failed"),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;
    use crate::types::{AuctionId, Token};

    fn hash(b: u8) -> H256 {
        H256([b; 32])
    }

    fn bid_call() -> Call {
        Call::Bid { id: AuctionId(1), value: 1_000 }
    }

    #[test]
    fn test_observe_accepted_skips_ready() {
        let mut p = PendingTransaction::new(hash(1), Confirmation::Accepted);
        assert!(p.observe(&TxStatus::Future).is_none());
        assert!(p.observe(&TxStatus::Ready).is_none());
        let outcome = p.observe(&TxStatus::Broadcast(vec![])).unwrap().unwrap();
        assert_eq!(outcome, TxOutcome::Accepted { hash: hash(1), status: "Broadcast" });
    }

    #[test]
    fn test_observe_finalized_waits_through_in_block() {
        let mut p = PendingTransaction::new(hash(1), Confirmation::Finalized);
        assert!(p.observe(&TxStatus::Ready).is_none());
        assert!(p.observe(&TxStatus::InBlock(hash(2))).is_none());
        assert!(p.observe(&TxStatus::Retracted(hash(2))).is_none());
        assert!(p.observe(&TxStatus::InBlock(hash(3))).is_none());
        let outcome = p.observe(&TxStatus::Finalized(hash(3))).unwrap().unwrap();
        assert_eq!(outcome, TxOutcome::Finalized { hash: hash(1), block: hash(3) });
    }

    #[test]
    fn test_observe_failure_status() {
        let mut p = PendingTransaction::new(hash(1), Confirmation::Finalized);
        let err = p.observe(&TxStatus::Usurped(hash(9))).unwrap().unwrap_err();
        assert!(matches!(err, ChainError::Dropped { status: "Usurped", .. }));

        let mut p = PendingTransaction::new(hash(1), Confirmation::Accepted);
        assert!(p.observe(&TxStatus::Invalid).unwrap().is_err());
    }

    #[tokio::test]
    async fn test_sign_and_send_without_key() {
        let backend = Arc::new(MockBackend::new());
        let tx = TxOrchestrator::new(backend.clone(), None);
        let err = tx.sign_and_send(bid_call(), Confirmation::Accepted).await.unwrap_err();
        assert!(matches!(err, ChainError::NoSigningKey));
        assert!(backend.submitted().is_empty());
    }

    fn alice() -> KeyPair {
        KeyPair::from_uri("//Alice").unwrap()
    }

    fn liquidate_call() -> Call {
        Call::Liquidate { currency_id: Token::Ksm.into(), who: AccountId::from_public([7; 32]) }
    }

    #[tokio::test]
    async fn test_dry_run_submits_nothing() {
        let backend = Arc::new(MockBackend::new());
        let tx = TxOrchestrator::new(backend.clone(), Some(alice())).with_dry_run(true);

        let outcome = tx.sign_and_send(bid_call(), Confirmation::Finalized).await.unwrap();
        assert!(outcome.is_skipped());

        let submission = tx.submit_unsigned(liquidate_call()).await.unwrap();
        assert!(matches!(submission, Submission::Skipped));
        assert!(tx.wait(submission, Confirmation::Accepted).await.unwrap().is_skipped());
        assert!(backend.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_unsigned_submission() {
        let backend = Arc::new(MockBackend::new());
        let tx = TxOrchestrator::new(backend.clone(), None);

        let submission = tx.submit_unsigned(liquidate_call()).await.unwrap();
        let outcome = tx.wait(submission, Confirmation::Accepted).await.unwrap();

        let submitted = backend.submitted();
        assert_eq!(submitted.len(), 1);
        assert!(!submitted[0].is_signed());
        assert_eq!(outcome.hash(), Some(submitted[0].hash()));
    }

    #[test]
    fn test_signer_account_is_local() {
        let tx = TxOrchestrator::new(Arc::new(MockBackend::new()), Some(alice()));
        assert_eq!(tx.signer_account().unwrap(), alice().account());

        let tx = TxOrchestrator::new(Arc::new(MockBackend::new()), None);
        assert!(matches!(tx.signer_account(), Err(ChainError::NoSigningKey)));
    }

    #[tokio::test]
    async fn test_finalized_flow() {
        let backend = Arc::new(MockBackend::new().with_statuses(vec![
            TxStatus::Ready,
            TxStatus::InBlock(hash(7)),
            TxStatus::Finalized(hash(7)),
        ]));
        let tx = TxOrchestrator::new(backend.clone(), Some(alice())).with_explorer("https://karura.subscan.io");

        let outcome = tx.sign_and_send(bid_call(), Confirmation::Finalized).await.unwrap();
        assert!(matches!(outcome, TxOutcome::Finalized { block, .. } if block == hash(7)));

        let submitted = backend.submitted();
        assert_eq!(submitted.len(), 1);
        assert!(submitted[0].is_signed());
        assert_eq!(submitted[0].signer(), Some(alice().account()));
        assert_eq!(submitted[0].nonce(), Some(0));
        assert_eq!(submitted[0].call(), &bid_call());
    }

    #[tokio::test]
    async fn test_stream_closed_before_finality() {
        let backend = Arc::new(MockBackend::new().with_statuses(vec![
            TxStatus::Ready,
            TxStatus::InBlock(hash(7)),
        ]));
        let tx = TxOrchestrator::new(backend, Some(alice()));
        let err = tx.sign_and_send(bid_call(), Confirmation::Finalized).await.unwrap_err();
        assert!(matches!(err, ChainError::SubscriptionClosed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let backend = Arc::new(MockBackend::new().stalled());
        let tx = TxOrchestrator::new(backend, Some(alice())).with_timeout(Duration::from_secs(60));

        let err = tx.sign_and_send(bid_call(), Confirmation::Accepted).await.unwrap_err();
        assert!(matches!(err, ChainError::Timeout { secs: 60, .. }));
        assert!(err.is_transaction_scoped());
    }
}
