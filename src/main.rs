//! Karura Auction Bidder
//!
//! Single-pass keeper for the Karura CDP engine:
//! - Scans every loan and liquidates the unsafe ones
//! - Rebalances the stash loan with idle collateral and stable coin
//! - Bids on collateral auctions with debit borrowed from the stash loan
//!
//! Scheduling is external: run it from cron or a systemd timer.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bidder_api::CoinGeckoClient;
use bidder_chain::{ChainClient, HttpBackend, KeyPair, TxOrchestrator};
use bidder_core::{BotConfig, Runner};

#[tokio::main]
async fn main() -> ExitCode {
    print_banner();

    dotenvy::dotenv().ok();
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Run failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bidder_core=debug,bidder_chain=debug"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn run() -> Result<()> {
    let config = BotConfig::from_env()?;
    config.log_config();

    let backend = HttpBackend::connect(&config.endpoints)
        .await
        .context("no endpoint reachable")?
        .with_poll_interval(config.transaction.poll_interval());
    info!(chain = backend.chain(), "Connected");

    let client = ChainClient::new(Arc::new(backend));
    let signer = config
        .proxy_seed
        .as_ref()
        .map(|s| KeyPair::from_uri(s.expose()))
        .transpose()
        .context("invalid PROXY_ACCOUNT_SEED")?;
    let tx = TxOrchestrator::new(client.backend().clone(), signer)
        .with_dry_run(config.is_dry_run())
        .with_timeout(config.transaction.timeout())
        .with_explorer(config.transaction.explorer_url.clone());
    let market = CoinGeckoClient::new(config.oracle.market_api_url.clone());

    let runner = Runner::new(config, client, tx)?.with_market_prices(Arc::new(market));
    runner.preflight().await?;

    let summary = runner.run().await?;
    info!(
        liquidations = summary.report.liquidations.len(),
        bids = summary.bids.bids.len(),
        skipped = summary.bids.skipped.len(),
        available = %summary.available,
        "Pass complete"
    );
    Ok(())
}

fn print_banner() {
    println!(r#"
    ╦╔═┌─┐┬─┐┬ ┬┬─┐┌─┐  ╔╗ ┬┌┬┐┌┬┐┌─┐┬─┐
    ╠╩╗├─┤├┬┘│ │├┬┘├─┤  ╠╩╗│ ││ ││├┤ ├┬┘
    ╩ ╩┴ ┴┴└─└─┘┴└─┴ ┴  ╚═╝┴─┴┘─┴┘└─┘┴└─
    Auction Bidder v0.1.0
    "#);
}
