//! Token balances of an account.

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::client::{queries, ChainClient};
use crate::error::Result;
use crate::fixed_point::{from_chain, BALANCE_PRECISION};
use crate::types::{balance, AccountId, Balance, Token};

/// Balance record of one account in one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBalance {
    pub token: Token,
    pub free: Balance,
    pub reserved: Balance,
    pub frozen: Balance,
}

impl TokenBalance {
    /// Spendable amount: free minus frozen.
    pub fn available(&self) -> Balance {
        self.free.saturating_sub(self.frozen)
    }

    pub fn available_decimal(&self) -> Result<Decimal> {
        Ok(from_chain(self.available(), BALANCE_PRECISION)?)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAccountData {
    #[serde(default, with = "balance")]
    free: Balance,
    #[serde(default, with = "balance")]
    reserved: Balance,
    #[serde(default, with = "balance")]
    frozen: Balance,
    /// Older runtimes split frozen into misc/fee
    #[serde(default, with = "balance")]
    misc_frozen: Balance,
    #[serde(default, with = "balance")]
    fee_frozen: Balance,
}

impl RawAccountData {
    fn into_balance(self, token: Token) -> TokenBalance {
        TokenBalance {
            token,
            free: self.free,
            reserved: self.reserved,
            frozen: self.frozen.max(self.misc_frozen).max(self.fee_frozen),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawSystemAccount {
    #[serde(default)]
    data: RawAccountData,
}

/// Balance queries for arbitrary accounts.
#[derive(Debug, Clone)]
pub struct Wallet {
    client: ChainClient,
}

impl Wallet {
    pub fn new(client: ChainClient) -> Self {
        Self { client }
    }

    /// Balance of `who` in a multi-currency token. Absent accounts read as zero.
    pub async fn query_balance(&self, who: &AccountId, token: Token) -> Result<TokenBalance> {
        if token == Token::Kar {
            return self.query_native_balance(who).await;
        }
        let raw: RawAccountData = self
            .client
            .read(&queries::token_account(who, token))
            .await?
            .unwrap_or_default();
        let balance = raw.into_balance(token);
        debug!(account = %who, %token, free = balance.free, frozen = balance.frozen, "Queried balance");
        Ok(balance)
    }

    /// Native token balance held in `system.account`.
    pub async fn query_native_balance(&self, who: &AccountId) -> Result<TokenBalance> {
        let raw: RawSystemAccount = self
            .client
            .read(&queries::system_account(who))
            .await?
            .unwrap_or_default();
        Ok(raw.data.into_balance(Token::Kar))
    }
}
