//! Collateral auction bidding.
//!
//! Bids are funded by borrowing against the stash loan. Each bid is one
//! all-or-nothing batch of two proxied calls: raise the loan's debit by the
//! bid amount, then place the bid. The available amount is consumed
//! sequentially across auctions.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use bidder_chain::fixed_point::{self, BALANCE_PRECISION};
use bidder_chain::{
    AccountId, AuctionId, Call, ChainClient, Confirmation, ProxyType, Token, TxOrchestrator, H256,
};

use crate::error::{BidderError, Result};

/// Additional debit the stash loan can take on while staying at `min_ratio`.
///
/// `collateral_value / min_ratio - debit_value`, in stable coin. Negative
/// when the loan is already below the target ratio.
pub fn available_debit(collateral_value: Decimal, debit_value: Decimal, min_ratio: Decimal) -> Result<Decimal> {
    let max_debit = fixed_point::div(collateral_value, min_ratio)?;
    Ok(max_debit - debit_value)
}

/// Why an auction was passed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    NoAuctionInfo,
    AlreadyWinning,
    NoFundsAvailable,
    /// Bid failed; the message is the error
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedBid {
    pub auction_id: AuctionId,
    pub amount: Decimal,
    pub tx_hash: Option<H256>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidSummary {
    pub bids: Vec<PlacedBid>,
    pub skipped: Vec<(AuctionId, SkipReason)>,
    /// Available amount left after all bids
    pub remaining: Decimal,
}

#[derive(Debug, Clone)]
pub struct AuctionBidder {
    client: ChainClient,
    tx: TxOrchestrator,
    stash: AccountId,
    /// Collateral of the loan that funds the bids
    loan_currency: Token,
}

impl AuctionBidder {
    pub fn new(client: ChainClient, tx: TxOrchestrator, stash: AccountId, loan_currency: Token) -> Self {
        Self { client, tx, stash, loan_currency }
    }

    /// Bid on every open collateral auction, spending at most `available`.
    ///
    /// Transaction failures skip the auction; chain read failures abort.
    #[instrument(skip_all, fields(%available))]
    pub async fn run(&self, available: Decimal, debit_exchange_rate: Decimal) -> Result<BidSummary> {
        let mut summary = BidSummary { remaining: available, ..Default::default() };

        for (id, auction) in self.client.collateral_auctions().await? {
            debug!(auction_id = %id, currency = %auction.currency_id, target = auction.target, amount = auction.amount, "Auction");

            let Some(info) = self.client.auction_info(id).await? else {
                warn!(auction_id = %id, "No auction info");
                summary.skipped.push((id, SkipReason::NoAuctionInfo));
                continue;
            };
            debug!(auction_id = %id, winner = ?info.winner(), "Winning bid");

            if info.winner() == Some(&self.stash) {
                debug!(auction_id = %id, "Already winner, skip");
                summary.skipped.push((id, SkipReason::AlreadyWinning));
                continue;
            }

            if summary.remaining <= Decimal::ZERO {
                info!(auction_id = %id, remaining = %summary.remaining, "No more money, skip");
                summary.skipped.push((id, SkipReason::NoFundsAvailable));
                continue;
            }

            let target = fixed_point::from_chain(auction.target, BALANCE_PRECISION)?;
            let amount = target.min(summary.remaining);

            match self.bid(id, amount, debit_exchange_rate).await {
                Ok(tx_hash) => {
                    summary.remaining -= amount;
                    summary.bids.push(PlacedBid { auction_id: id, amount, tx_hash });
                }
                Err(BidderError::Chain(e)) if e.is_transaction_scoped() => {
                    warn!(auction_id = %id, error = %e, "Bid failed");
                    summary.skipped.push((id, SkipReason::Failed(e.to_string())));
                }
                Err(e) => return Err(e),
            }
        }

        info!(bids = summary.bids.len(), skipped = summary.skipped.len(), remaining = %summary.remaining, "Bidding complete");
        Ok(summary)
    }

    /// Borrow `amount` and bid it on auction `id`, atomically.
    async fn bid(&self, id: AuctionId, amount: Decimal, debit_exchange_rate: Decimal) -> Result<Option<H256>> {
        info!(auction_id = %id, %amount, "bid");

        let debit = fixed_point::div(amount, debit_exchange_rate)?;
        let debit_adjustment = fixed_point::to_chain_signed(debit, BALANCE_PRECISION)?;
        let value = fixed_point::to_chain(amount, BALANCE_PRECISION)?;

        let call = Call::BatchAll {
            calls: vec![
                Call::proxy(
                    &self.stash,
                    ProxyType::Loan,
                    Call::AdjustLoan {
                        currency_id: self.loan_currency.into(),
                        collateral_adjustment: 0,
                        debit_adjustment,
                    },
                ),
                Call::proxy(&self.stash, ProxyType::Auction, Call::Bid { id, value }),
            ],
        };
        let outcome = self.tx.sign_and_send(call, Confirmation::Accepted).await?;
        Ok(outcome.hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidder_chain::mock::MockBackend;
    use bidder_chain::{queries, ChainError, KeyPair, TxStatus};
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use std::sync::Arc;

    const E12: u128 = 1_000_000_000_000;
    const STASH: &str = "t6X8qpY26nsi6WDMkhbyaTz6cLtNBt7xfs4H9k94D3kM1Lm";
    const OTHER: &str = "rXMrmePtNnyZ61hvpjfEEZ1zmKzueUnTqijDncTzE8Wa2sJ";

    fn stash() -> AccountId {
        AccountId::parse(STASH).unwrap()
    }

    fn auction_record(target: u128) -> Value {
        json!({
            "refundRecipient": OTHER,
            "currencyId": {"token": "KSM"},
            "initialAmount": (10 * E12).to_string(),
            "amount": (10 * E12).to_string(),
            "target": (target * E12).to_string(),
            "startTime": 100
        })
    }

    /// Auctions `(id, target, current winner)`.
    fn backend(auctions: &[(u32, u128, Option<&str>)]) -> MockBackend {
        auctions.iter().fold(MockBackend::new(), |backend, (id, target, winner)| {
            let bid = winner.map(|w| json!([w, "1"])).unwrap_or(Value::Null);
            backend
                .with_entry(queries::collateral_auctions().key(AuctionId(*id)), Some(auction_record(*target)))
                .with_storage(queries::auction(AuctionId(*id)), json!({"bid": bid, "start": 1, "end": null}))
        })
    }

    fn bidder(backend: Arc<MockBackend>) -> AuctionBidder {
        let client = ChainClient::new(backend.clone());
        let tx = TxOrchestrator::new(backend, Some(KeyPair::from_uri("//Proxy").unwrap()));
        AuctionBidder::new(client, tx, stash(), Token::Lksm)
    }

    fn bid_values(backend: &MockBackend) -> Vec<u128> {
        backend
            .submitted()
            .iter()
            .filter_map(|x| match x.call() {
                Call::BatchAll { calls } => calls.iter().find_map(|c| match c {
                    Call::Proxy { call, .. } => match call.as_ref() {
                        Call::Bid { value, .. } => Some(*value),
                        _ => None,
                    },
                    _ => None,
                }),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_available_debit() {
        // 2600 / 2.6 - 600
        assert_eq!(available_debit(dec!(2600), dec!(600), dec!(2.6)).unwrap(), dec!(400));
        assert_eq!(available_debit(dec!(2600), dec!(1200), dec!(2.6)).unwrap(), dec!(-200));
        assert!(available_debit(dec!(1), dec!(0), Decimal::ZERO).is_err());
    }

    #[tokio::test]
    async fn test_sequential_consumption() {
        let backend = Arc::new(backend(&[(1, 300, None), (2, 300, None), (3, 300, None)]));
        let summary = bidder(backend.clone()).run(dec!(500), dec!(0.1)).await.unwrap();

        let amounts: Vec<_> = summary.bids.iter().map(|b| b.amount).collect();
        assert_eq!(amounts, vec![dec!(300), dec!(200)]);
        assert_eq!(summary.remaining, Decimal::ZERO);
        assert_eq!(summary.skipped, vec![(AuctionId(3), SkipReason::NoFundsAvailable)]);
        assert_eq!(bid_values(&backend), vec![300 * E12, 200 * E12]);
    }

    #[tokio::test]
    async fn test_bid_batch_shape() {
        let backend = Arc::new(backend(&[(7, 50, Some(OTHER))]));
        bidder(backend.clone()).run(dec!(1000), dec!(0.1)).await.unwrap();

        let submitted = backend.submitted();
        assert_eq!(submitted.len(), 1);
        assert!(submitted[0].is_signed());
        assert_eq!(
            submitted[0].call(),
            &Call::BatchAll {
                calls: vec![
                    Call::proxy(
                        &stash(),
                        ProxyType::Loan,
                        Call::AdjustLoan {
                            currency_id: Token::Lksm.into(),
                            collateral_adjustment: 0,
                            debit_adjustment: 500 * E12 as i128,
                        },
                    ),
                    Call::proxy(&stash(), ProxyType::Auction, Call::Bid { id: AuctionId(7), value: 50 * E12 }),
                ],
            }
        );
    }

    #[tokio::test]
    async fn test_skip_when_already_winning() {
        let backend = Arc::new(backend(&[(1, 100, Some(STASH)), (2, 100, Some(OTHER))]));
        let summary = bidder(backend.clone()).run(dec!(1000), dec!(1)).await.unwrap();

        assert_eq!(summary.skipped, vec![(AuctionId(1), SkipReason::AlreadyWinning)]);
        assert_eq!(summary.bids.len(), 1);
        assert_eq!(summary.bids[0].auction_id, AuctionId(2));
        assert_eq!(summary.remaining, dec!(900));
    }

    #[tokio::test]
    async fn test_winner_matched_across_address_prefixes() {
        // The stash key, written with the generic substrate prefix
        let winner = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
        let backend = Arc::new(backend(&[(1, 100, Some(winner))]));
        let summary = bidder(backend.clone()).run(dec!(1000), dec!(1)).await.unwrap();

        assert_eq!(summary.skipped, vec![(AuctionId(1), SkipReason::AlreadyWinning)]);
        assert!(summary.bids.is_empty());
        assert!(backend.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_missing_auction_info_skipped() {
        let backend = MockBackend::new()
            .with_entry(queries::collateral_auctions().key(AuctionId(4)), Some(auction_record(10)));
        let backend = Arc::new(backend);
        let summary = bidder(backend.clone()).run(dec!(1000), dec!(1)).await.unwrap();
        assert_eq!(summary.skipped, vec![(AuctionId(4), SkipReason::NoAuctionInfo)]);
        assert!(backend.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_no_funds_submits_nothing() {
        let backend = Arc::new(backend(&[(1, 100, None)]));
        let summary = bidder(backend.clone()).run(dec!(-5), dec!(1)).await.unwrap();
        assert_eq!(summary.skipped, vec![(AuctionId(1), SkipReason::NoFundsAvailable)]);
        assert!(backend.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_failed_bid_keeps_available() {
        let backend = Arc::new(backend(&[(1, 100, None), (2, 100, None)]));
        backend.push_statuses(vec![TxStatus::Ready, TxStatus::Invalid]);
        let summary = bidder(backend.clone()).run(dec!(150), dec!(1)).await.unwrap();

        assert!(matches!(summary.skipped[0], (AuctionId(1), SkipReason::Failed(_))));
        assert_eq!(summary.bids.len(), 1);
        assert_eq!(summary.bids[0].amount, dec!(100));
        assert_eq!(summary.remaining, dec!(50));
    }

    #[tokio::test]
    async fn test_missing_signer_skips_every_auction() {
        let backend = Arc::new(backend(&[(1, 100, None)]));
        let client = ChainClient::new(backend.clone());
        let tx = TxOrchestrator::new(backend.clone(), None);
        let summary = AuctionBidder::new(client, tx, stash(), Token::Lksm)
            .run(dec!(150), dec!(1))
            .await
            .unwrap();
        assert_eq!(
            summary.skipped,
            vec![(AuctionId(1), SkipReason::Failed(ChainError::NoSigningKey.to_string()))]
        );
        assert_eq!(summary.remaining, dec!(150));
    }
}
