use crate::cli::{display::OfferDisplay, QuoteArgs};
use crate::core::{Config, QuoteRequest, SwapError, SwapResult, WalletRef};
use crate::orchestrator::QuoteOrchestrator;
use crate::providers::default_providers;
use crate::services::{StaticRateService, StaticWalletService};
use colored::*;
use log::info;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

pub async fn execute(args: QuoteArgs) -> SwapResult<()> {
    println!("{}", "Swap Quote Aggregator".bold().cyan());

    let config = Config::from_env()?;
    config.validate()?;

    let amount = Decimal::from_f64(args.amount)
        .filter(|a| !a.is_sign_negative() && !a.is_zero())
        .ok_or_else(|| SwapError::InvalidAmount(format!("{}", args.amount)))?;

    let coin_from = args.coin_from.to_lowercase();
    let coin_to = args.coin_to.to_lowercase();
    let chain_from = args
        .chain_from
        .map(|c| c.to_lowercase())
        .unwrap_or_else(|| coin_from.clone());
    let chain_to = args
        .chain_to
        .map(|c| c.to_lowercase())
        .unwrap_or_else(|| coin_to.clone());

    let request = QuoteRequest {
        amount_from: amount,
        coin_from: coin_from.clone(),
        chain_from: chain_from.clone(),
        coin_to: coin_to.clone(),
        chain_to: chain_to.clone(),
        wallet_from: WalletRef {
            id: format!("cli-{}-{}", coin_from, chain_from),
            coin: coin_from.clone(),
            chain: chain_from,
            token_address: args.token_address,
            spendable_balance: None,
        },
        wallet_to: WalletRef {
            id: format!("cli-{}", coin_to),
            coin: coin_to.clone(),
            chain: chain_to,
            token_address: None,
            spendable_balance: None,
        },
        country: args.country,
    };

    info!(
        "Requesting quotes: {} {} -> {}",
        amount, request.coin_from, request.coin_to
    );

    let wallet_service = Arc::new(StaticWalletService::new());
    let rate_service = Arc::new(
        StaticRateService::new()
            .with_price("btc", &config.fiat_code, Decimal::from(60000))
            .with_price("eth", &config.fiat_code, Decimal::from(3000))
            .with_price("usdc", &config.fiat_code, Decimal::ONE)
            .with_price("usdt", &config.fiat_code, Decimal::ONE),
    );
    let providers = default_providers(&config, wallet_service.clone(), rate_service);

    let orchestrator = QuoteOrchestrator::new(providers, config, HashMap::new(), wallet_service);

    let pb = OfferDisplay::create_progress_bar("Collecting offers...");
    let mut snapshots = orchestrator.observe_offers();
    orchestrator.start_round(request);

    let settled = timeout(Duration::from_secs(60), async {
        loop {
            {
                let snapshot = snapshots.borrow_and_update();
                if snapshot.settled {
                    return snapshot.clone();
                }
            }
            if snapshots.changed().await.is_err() {
                return orchestrator.latest();
            }
        }
    })
    .await;

    pb.finish_and_clear();
    orchestrator.shutdown();

    match settled {
        Ok(snapshot) => {
            if snapshot.offers.is_empty() && snapshot.warning.is_none() {
                println!("{}", "No offers returned".red().bold());
            } else {
                OfferDisplay::display_snapshot(&snapshot, &coin_from, &coin_to, args.all);
            }
            Ok(())
        }
        Err(_) => {
            println!("{}", "Timed out waiting for offers".red().bold());
            Ok(())
        }
    }
}
