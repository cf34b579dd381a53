//! Chain primitive types: tokens, accounts, keys, hashes and calls.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sp_core::crypto::{AccountId32, Ss58AddressFormat, Ss58Codec};
use std::fmt;
use std::str::FromStr;

use crate::error::ChainError;

/// Raw on-chain balance (12 decimals for every token this agent touches).
pub type Balance = u128;

/// Raw signed adjustment passed to `honzon.adjustLoan`.
pub type Amount = i128;

/// Tokens known to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Token {
    /// Native token, pays fees for the signing account
    Kar,
    /// Stable coin debts are denominated in
    Kusd,
    Ksm,
    /// Liquid-staked KSM, priced through the staking exchange rate
    Lksm,
}

impl Token {
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Kar => "KAR",
            Self::Kusd => "KUSD",
            Self::Ksm => "KSM",
            Self::Lksm => "LKSM",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Token {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "KAR" => Ok(Self::Kar),
            "KUSD" | "AUSD" => Ok(Self::Kusd),
            "KSM" => Ok(Self::Ksm),
            "LKSM" => Ok(Self::Lksm),
            other => Err(ChainError::Decode(format!("unknown token {other}"))),
        }
    }
}

/// Currency identifier as the runtime encodes it: `{"token": "KSM"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CurrencyId {
    Token(Token),
}

impl CurrencyId {
    pub fn as_token(&self) -> Token {
        match self {
            Self::Token(t) => *t,
        }
    }
}

impl From<Token> for CurrencyId {
    fn from(token: Token) -> Self {
        Self::Token(token)
    }
}

impl fmt::Display for CurrencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{\"token\":\"{}\"}}", self.as_token())
    }
}

/// SS58 prefix addresses are rendered with.
pub const SS58_PREFIX: u16 = 8;

/// Account identified by its 32-byte public key.
///
/// Parsing accepts SS58 under any network prefix (checksum verified) or a
/// `0x`-prefixed hex key, so one key written for different networks compares
/// equal. Rendered as SS58 with [`SS58_PREFIX`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId([u8; 32]);

impl AccountId {
    pub const fn from_public(public: [u8; 32]) -> Self {
        Self(public)
    }

    pub fn parse(s: &str) -> Result<Self, ChainError> {
        let s = s.trim();
        if let Some(raw) = s.strip_prefix("0x") {
            let bytes = hex::decode(raw).map_err(|e| ChainError::InvalidAddress(format!("{s}: {e}")))?;
            let public: [u8; 32] = bytes
                .try_into()
                .map_err(|_| ChainError::InvalidAddress(format!("{s}: expected a 32-byte public key")))?;
            return Ok(Self(public));
        }
        let (account, _) = AccountId32::from_ss58check_with_version(s)
            .map_err(|e| ChainError::InvalidAddress(format!("{s}: {e:?}")))?;
        Ok(Self(account.into()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// SS58 rendering under `prefix`.
    pub fn to_ss58(&self, prefix: u16) -> String {
        AccountId32::new(self.0).to_ss58check_with_version(Ss58AddressFormat::custom(prefix))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ss58(SS58_PREFIX))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({self})")
    }
}

impl FromStr for AccountId {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuctionId(pub u32);

impl fmt::Display for AuctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 32-byte hash (extrinsic or block).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct H256(pub [u8; 32]);

impl H256 {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for H256 {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| ChainError::Decode(format!("invalid hash {s}: {e}")))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| ChainError::Decode(format!("invalid hash length: {s}")))?;
        Ok(Self(bytes))
    }
}

impl Serialize for H256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for H256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Opaque storage key, used as the continuation cursor for paged reads.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey(pub Vec<u8>);

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for StorageKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for StorageKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x"))
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// Proxy capability the signing account holds on the stash account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyType {
    Any,
    Loan,
    Auction,
}

/// Runtime calls the agent builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", content = "args", rename_all_fields = "camelCase")]
pub enum Call {
    /// Force-liquidate an unsafe position. Submitted unsigned.
    #[serde(rename = "cdpEngine.liquidate")]
    Liquidate { currency_id: CurrencyId, who: AccountId },

    /// Deposit/withdraw collateral and issue/repay debit in one call.
    #[serde(rename = "honzon.adjustLoan")]
    AdjustLoan {
        currency_id: CurrencyId,
        #[serde(with = "amount")]
        collateral_adjustment: Amount,
        #[serde(with = "amount")]
        debit_adjustment: Amount,
    },

    #[serde(rename = "auction.bid")]
    Bid {
        id: AuctionId,
        #[serde(with = "balance")]
        value: Balance,
    },

    /// Dispatch `call` as `real`, authorised by the signer's proxy capability.
    #[serde(rename = "proxy.proxy")]
    Proxy {
        real: AccountId,
        force_proxy_type: Option<ProxyType>,
        call: Box<Call>,
    },

    /// All-or-nothing batch.
    #[serde(rename = "utility.batchAll")]
    BatchAll { calls: Vec<Call> },
}

impl Call {
    /// Wrap `call` so it executes on behalf of `real`.
    pub fn proxy(real: &AccountId, proxy_type: ProxyType, call: Call) -> Self {
        Self::Proxy {
            real: real.clone(),
            force_proxy_type: Some(proxy_type),
            call: Box::new(call),
        }
    }

    /// `pallet.method` name, for logs.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Liquidate { .. } => "cdpEngine.liquidate",
            Self::AdjustLoan { .. } => "honzon.adjustLoan",
            Self::Bid { .. } => "auction.bid",
            Self::Proxy { .. } => "proxy.proxy",
            Self::BatchAll { .. } => "utility.batchAll",
        }
    }

    /// Human-readable rendering of the call tree.
    pub fn to_human(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.method().to_string())
    }
}

/// Parse a balance given as decimal digits or `0x`-prefixed hex.
pub fn parse_balance(s: &str) -> Result<Balance, String> {
    match s.strip_prefix("0x") {
        Some(hex) if hex.is_empty() => Ok(0),
        Some(hex) => u128::from_str_radix(hex, 16).map_err(|e| format!("invalid hex balance {s}: {e}")),
        None => s.parse().map_err(|e| format!("invalid balance {s}: {e}")),
    }
}

/// Serde adapter for `u128` balances: written as decimal strings, read from
/// strings (decimal or hex) or JSON numbers.
pub mod balance {
    use super::{parse_balance, Balance};
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(u64),
    }

    pub fn serialize<S: Serializer>(value: &Balance, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Balance, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(n as Balance),
            Raw::Str(s) => parse_balance(&s).map_err(de::Error::custom),
        }
    }
}

/// Serde adapter for optional balances (`null` = absent).
pub mod option_balance {
    use super::Balance;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    struct Wrapped(#[serde(with = "super::balance")] Balance);

    pub fn serialize<S: Serializer>(value: &Option<Balance>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Balance>, D::Error> {
        Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|w| w.0))
    }
}

/// Serde adapter for signed `i128` amounts, as decimal strings.
pub mod amount {
    use super::Amount;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Serde adapter for byte strings carried as `0x`-prefixed hex.
pub mod hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(value)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "t6X8qpY26nsi6WDMkhbyaTz6cLtNBt7xfs4H9k94D3kM1Lm";
    const ALICE_PUBLIC: &str = "d43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";

    #[test]
    fn test_account_parse() {
        let account = AccountId::parse(ALICE).unwrap();
        assert_eq!(hex::encode(account.as_bytes()), ALICE_PUBLIC);
        assert_eq!(account.to_string(), ALICE);

        assert!(AccountId::parse("").is_err());
        assert!(AccountId::parse("0xdeadbeef").is_err());
        // '0' is not base58
        assert!(AccountId::parse("t6X8qpY26nsi6WDMkhbyaTz6cLtNBt7xfs4H9k94D3kM1L0").is_err());
        // valid alphabet, broken checksum
        assert!(AccountId::parse("t6X8qpY26nsi6WDMkhbyaTz6cLtNBt7xfs4H9k94D3kM1Ln").is_err());
    }

    #[test]
    fn test_account_equal_across_prefixes() {
        let karura = AccountId::parse(ALICE).unwrap();
        let substrate = AccountId::parse("5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY").unwrap();
        let polkadot = AccountId::parse("15oF4uVJwmo4TdGW7VfQxNLavjCXviqxT9S1MgbjMNHr6Sp5").unwrap();
        let raw = AccountId::parse(&format!("0x{ALICE_PUBLIC}")).unwrap();
        assert_eq!(karura, substrate);
        assert_eq!(karura, polkadot);
        assert_eq!(karura, raw);
        assert_eq!(polkadot.to_string(), ALICE);
        assert_eq!(karura.to_ss58(42), "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY");

        let decoded: AccountId = serde_json::from_value(serde_json::json!(
            "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY"
        ))
        .unwrap();
        assert_eq!(decoded, karura);
        assert_eq!(serde_json::to_value(&decoded).unwrap(), serde_json::json!(ALICE));
    }

    #[test]
    fn test_token_parse() {
        assert_eq!("lksm".parse::<Token>().unwrap(), Token::Lksm);
        assert_eq!("kUSD".parse::<Token>().unwrap(), Token::Kusd);
        assert!("DOT".parse::<Token>().is_err());
    }

    #[test]
    fn test_currency_id_json() {
        let json = serde_json::to_value(CurrencyId::Token(Token::Ksm)).unwrap();
        assert_eq!(json, serde_json::json!({"token": "KSM"}));
    }

    #[test]
    fn test_parse_balance() {
        assert_eq!(parse_balance("1000").unwrap(), 1000);
        assert_eq!(parse_balance("0x3e8").unwrap(), 1000);
        assert_eq!(parse_balance("0x").unwrap(), 0);
        assert!(parse_balance("abc").is_err());
    }

    #[test]
    fn test_h256_roundtrip_display() {
        let hash: H256 = "0x0101010101010101010101010101010101010101010101010101010101010101"
            .parse()
            .unwrap();
        assert_eq!(hash.0, [1u8; 32]);
        assert!(!hash.is_zero());
        assert!("0x0102".parse::<H256>().is_err());
    }

    #[test]
    fn test_call_json_shape() {
        let stash = AccountId::parse(ALICE).unwrap();
        let call = Call::proxy(
            &stash,
            ProxyType::Loan,
            Call::AdjustLoan {
                currency_id: Token::Lksm.into(),
                collateral_adjustment: 0,
                debit_adjustment: -5,
            },
        );

        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["call"], "proxy.proxy");
        assert_eq!(json["args"]["forceProxyType"], "Loan");
        assert_eq!(json["args"]["call"]["call"], "honzon.adjustLoan");
        assert_eq!(json["args"]["call"]["args"]["debitAdjustment"], "-5");
        assert_eq!(call.method(), "proxy.proxy");
    }
}
