//! Bidder runtime configuration.
//!
//! Built from an environment profile, an optional TOML overlay file and
//! environment variables, then validated once at startup. Components get
//! the pieces they need at construction; there is no global config.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::info;

use bidder_chain::{AccountId, Token};

use super::env::{expand_env, parse_flag, split_endpoints, Environment};
use crate::error::ConfigError;

/// Secret string (signing seed). Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub environment: Environment,

    /// Gateway endpoints in failover order. Empty means the environment's defaults.
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Account whose loan the bidder manages
    #[serde(default)]
    pub stash: Option<AccountId>,

    /// Seed of the proxy account that signs on behalf of the stash
    #[serde(skip)]
    pub proxy_seed: Option<Secret>,

    /// Log calls instead of submitting them. Defaults to "not production".
    #[serde(default)]
    pub dry_run: Option<bool>,

    #[serde(default)]
    pub risk: RiskConfig,

    #[serde(default)]
    pub assets: AssetsConfig,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub rebalance: RebalanceConfig,

    #[serde(default)]
    pub transaction: TransactionConfig,

    #[serde(default)]
    pub oracle: OracleConfig,
}

/// Collateral ratio and price alert thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Target ratio the bidder borrows down to
    #[serde(default = "default_min_collateral_ratio")]
    pub min_collateral_ratio: Decimal,

    /// Own ratio below which an alert is logged
    #[serde(default = "default_alert_collateral_ratio")]
    pub alert_collateral_ratio: Decimal,

    /// Relative oracle/market price difference that triggers an alert
    #[serde(default = "default_alert_oracle_price_diff")]
    pub alert_oracle_price_diff: Decimal,
}

fn default_min_collateral_ratio() -> Decimal {
    Decimal::new(26, 1)
}
fn default_alert_collateral_ratio() -> Decimal {
    Decimal::new(22, 1)
}
fn default_alert_oracle_price_diff() -> Decimal {
    Decimal::new(4, 2)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_collateral_ratio: default_min_collateral_ratio(),
            alert_collateral_ratio: default_alert_collateral_ratio(),
            alert_oracle_price_diff: default_alert_oracle_price_diff(),
        }
    }
}

/// How a collateral token's price is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pricing {
    /// Quoted by the oracle directly
    Oracle,
    /// Priced from `base` through the liquid-staking exchange rate
    Pegged { base: Token },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralAsset {
    pub token: Token,
    #[serde(default = "default_pricing")]
    pub pricing: Pricing,
}

fn default_pricing() -> Pricing {
    Pricing::Oracle
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Collateral types scanned for liquidations
    #[serde(default = "default_collateral")]
    pub collateral: Vec<CollateralAsset>,

    /// Collateral of the stash loan
    #[serde(default = "default_own_collateral")]
    pub own_collateral: Token,

    /// Stable coin debts are denominated in
    #[serde(default = "default_stable")]
    pub stable: Token,

    /// Symbol to market API id, for the price deviation check
    #[serde(default = "default_market_ids")]
    pub market_price_ids: HashMap<Token, String>,
}

fn default_collateral() -> Vec<CollateralAsset> {
    vec![
        CollateralAsset { token: Token::Ksm, pricing: Pricing::Oracle },
        CollateralAsset { token: Token::Lksm, pricing: Pricing::Pegged { base: Token::Ksm } },
    ]
}
fn default_own_collateral() -> Token {
    Token::Lksm
}
fn default_stable() -> Token {
    Token::Kusd
}
fn default_market_ids() -> HashMap<Token, String> {
    HashMap::from([(Token::Ksm, "kusama".to_string())])
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            collateral: default_collateral(),
            own_collateral: default_own_collateral(),
            stable: default_stable(),
            market_price_ids: default_market_ids(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Positions fetched per storage page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    100
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self { page_size: default_page_size() }
    }
}

/// Own-loan rebalance thresholds, in whole token units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceConfig {
    /// Deposit collateral once this much is idle
    #[serde(default = "default_deposit_dust")]
    pub deposit_dust: Decimal,

    /// Repay once this much stable coin is idle
    #[serde(default = "default_repay_dust")]
    pub repay_dust: Decimal,

    /// Stable coin kept back so the loan never drops below the minimum debt
    #[serde(default = "default_repay_buffer")]
    pub repay_buffer: Decimal,

    /// Decimal places the repay amount is rounded down to
    #[serde(default = "default_repay_decimals")]
    pub repay_decimals: u32,
}

fn default_deposit_dust() -> Decimal {
    Decimal::new(1, 1)
}
fn default_repay_dust() -> Decimal {
    Decimal::from(100)
}
fn default_repay_buffer() -> Decimal {
    Decimal::from(21)
}
fn default_repay_decimals() -> u32 {
    4
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            deposit_dust: default_deposit_dust(),
            repay_dust: default_repay_dust(),
            repay_buffer: default_repay_buffer(),
            repay_decimals: default_repay_decimals(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Status poll interval of the HTTP backend
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_explorer_url")]
    pub explorer_url: String,

    /// Signer native balance at or below which a warning is logged
    #[serde(default = "default_signer_min_balance")]
    pub signer_min_balance: Decimal,
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_explorer_url() -> String {
    "https://karura.subscan.io".to_string()
}
fn default_signer_min_balance() -> Decimal {
    Decimal::ONE
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            explorer_url: default_explorer_url(),
            signer_min_balance: default_signer_min_balance(),
        }
    }
}

impl TransactionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Oracle provider queried with `oracle_getAllValues`
    #[serde(default = "default_oracle_provider")]
    pub provider: String,

    #[serde(default = "default_market_api_url")]
    pub market_api_url: String,

    /// Currency market prices are quoted in
    #[serde(default = "default_quote")]
    pub quote: String,
}

fn default_oracle_provider() -> String {
    "Acala".to_string()
}
fn default_market_api_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}
fn default_quote() -> String {
    "usd".to_string()
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_oracle_provider(),
            market_api_url: default_market_api_url(),
            quote: default_quote(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self::for_environment(Environment::default())
    }
}

fn parse_decimal(field: &'static str, value: &str) -> Result<Decimal, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::invalid(field, format!("{value}: {e}")))
}

impl BotConfig {
    /// Defaults for `environment`, with its built-in endpoints.
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            environment,
            endpoints: environment.default_endpoints(),
            stash: None,
            proxy_seed: None,
            dry_run: None,
            risk: RiskConfig::default(),
            assets: AssetsConfig::default(),
            scanner: ScannerConfig::default(),
            rebalance: RebalanceConfig::default(),
            transaction: TransactionConfig::default(),
            oracle: OracleConfig::default(),
        }
    }

    /// Parse a TOML document. Missing sections take their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a TOML config file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    /// Build the configuration from a variable lookup.
    ///
    /// - `NODE_ENV_OVERRIDE` / `NODE_ENV`: environment (default development)
    /// - `GATEWAY_ENDPOINTS`: comma-separated gateway endpoints, required in
    ///   staging and production
    /// - `ENV_CONFIG`: take endpoints from another environment's profile
    /// - `BIDDER_CONFIG`: optional TOML overlay file
    /// - `STASH_ACCOUNT` (required), `PROXY_ACCOUNT_SEED` (required when live)
    /// - `DRY_RUN`, `MIN_COLLATERAL_RATIO`, `ALERT_COLLATERAL_RATIO`,
    ///   `ALERT_ORACLE_PRICE_DIFF`: overrides
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_name = lookup("NODE_ENV_OVERRIDE").or_else(|| lookup("NODE_ENV"));

        let mut config = match lookup("BIDDER_CONFIG") {
            Some(path) => Self::from_file(&path)?,
            None => Self::for_environment(Environment::default()),
        };
        if let Some(name) = env_name.as_deref() {
            config.environment = Environment::resolve(Some(name));
        }

        let profile = lookup("ENV_CONFIG").as_deref().and_then(Environment::parse);
        if let Some(list) = lookup("GATEWAY_ENDPOINTS") {
            config.endpoints = split_endpoints(&list);
        } else if let Some(profile) = profile {
            config.endpoints = profile.default_endpoints();
        } else if config.endpoints.is_empty() || lookup("BIDDER_CONFIG").is_none() {
            config.endpoints = config.environment.default_endpoints();
        }
        config.endpoints = config
            .endpoints
            .iter()
            .map(|e| expand_env(e, &lookup))
            .collect();

        if let Some(stash) = lookup("STASH_ACCOUNT") {
            let account = AccountId::parse(&stash)
                .map_err(|e| ConfigError::invalid("STASH_ACCOUNT", e.to_string()))?;
            config.stash = Some(account);
        }
        if config.stash.is_none() {
            return Err(ConfigError::Missing("STASH_ACCOUNT"));
        }

        if let Some(flag) = lookup("DRY_RUN") {
            let dry_run = parse_flag(&flag)
                .ok_or_else(|| ConfigError::invalid("DRY_RUN", format!("not a boolean: {flag}")))?;
            config.dry_run = Some(dry_run);
        }

        config.proxy_seed = lookup("PROXY_ACCOUNT_SEED").map(Secret::new);
        if config.proxy_seed.is_none() && !config.is_dry_run() {
            return Err(ConfigError::Missing("PROXY_ACCOUNT_SEED"));
        }

        if let Some(v) = lookup("MIN_COLLATERAL_RATIO") {
            config.risk.min_collateral_ratio = parse_decimal("MIN_COLLATERAL_RATIO", &v)?;
        }
        if let Some(v) = lookup("ALERT_COLLATERAL_RATIO") {
            config.risk.alert_collateral_ratio = parse_decimal("ALERT_COLLATERAL_RATIO", &v)?;
        }
        if let Some(v) = lookup("ALERT_ORACLE_PRICE_DIFF") {
            config.risk.alert_oracle_price_diff = parse_decimal("ALERT_ORACLE_PRICE_DIFF", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Whether calls are logged instead of submitted.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run.unwrap_or(!self.environment.is_production())
    }

    pub fn stash(&self) -> Result<&AccountId, ConfigError> {
        self.stash.as_ref().ok_or(ConfigError::Missing("STASH_ACCOUNT"))
    }

    /// Market API id for a token, if it has one.
    pub fn market_id(&self, token: Token) -> Option<&str> {
        self.assets.market_price_ids.get(&token).map(String::as_str)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let risk = &self.risk;
        if risk.min_collateral_ratio <= Decimal::ZERO {
            return Err(ConfigError::invalid("min_collateral_ratio", "must be positive"));
        }
        if risk.alert_collateral_ratio <= Decimal::ZERO {
            return Err(ConfigError::invalid("alert_collateral_ratio", "must be positive"));
        }
        if risk.alert_collateral_ratio > risk.min_collateral_ratio {
            return Err(ConfigError::invalid(
                "alert_collateral_ratio",
                format!(
                    "{} exceeds min_collateral_ratio {}",
                    risk.alert_collateral_ratio, risk.min_collateral_ratio
                ),
            ));
        }
        if risk.alert_oracle_price_diff < Decimal::ZERO {
            return Err(ConfigError::invalid("alert_oracle_price_diff", "must not be negative"));
        }
        if self.endpoints.is_empty() {
            return Err(ConfigError::invalid(
                "endpoints",
                format!("no gateway endpoints configured for {}, set GATEWAY_ENDPOINTS", self.environment),
            ));
        }
        if self.scanner.page_size == 0 {
            return Err(ConfigError::invalid("page_size", "must be positive"));
        }
        if self.transaction.timeout_secs == 0 {
            return Err(ConfigError::invalid("timeout_secs", "must be positive"));
        }
        if self.assets.collateral.is_empty() {
            return Err(ConfigError::invalid("collateral", "no collateral assets configured"));
        }
        for asset in &self.assets.collateral {
            if let Pricing::Pegged { base } = asset.pricing {
                if base == asset.token {
                    return Err(ConfigError::invalid(
                        "collateral",
                        format!("{} cannot be pegged to itself", asset.token),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Log the effective configuration. Secrets are not printed.
    pub fn log_config(&self) {
        info!(
            environment = %self.environment,
            dry_run = self.is_dry_run(),
            endpoints = ?self.endpoints,
            stash = ?self.stash.as_ref().map(ToString::to_string),
            signer = self.proxy_seed.is_some(),
            "Configuration loaded"
        );
        info!(
            min_collateral_ratio = %self.risk.min_collateral_ratio,
            alert_collateral_ratio = %self.risk.alert_collateral_ratio,
            alert_oracle_price_diff = %self.risk.alert_oracle_price_diff,
            collateral = ?self.assets.collateral.iter().map(|a| a.token).collect::<Vec<_>>(),
            page_size = self.scanner.page_size,
            timeout_secs = self.transaction.timeout_secs,
            "Risk configuration"
        );
    }
}
