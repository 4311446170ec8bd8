//! Boundary traits for the external collaborators the engine consumes:
//! the wallet service (addresses, asset precision) and the fiat rate
//! service. In-memory implementations back the CLI and tests.

use crate::core::{SwapError, SwapResult, WalletRef};
use async_trait::async_trait;
use dashmap::DashMap;
use num_bigint::BigUint;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

/// Conversion factors between an asset's display unit and its smallest
/// on-chain unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetPrecision {
    pub unit_to_satoshi: u64,
    pub unit_decimals: u32,
}

impl AssetPrecision {
    pub fn of_decimals(decimals: u32) -> Self {
        Self {
            unit_to_satoshi: 10u64.pow(decimals),
            unit_decimals: decimals,
        }
    }

    /// Convert a display-unit amount into smallest units, as the integer
    /// the allowance comparison runs on. Negative amounts have no
    /// smallest-unit representation.
    pub fn to_smallest_units(&self, amount: Decimal) -> Option<BigUint> {
        if amount.is_sign_negative() {
            return None;
        }
        let units = (amount * Decimal::from(self.unit_to_satoshi)).round();
        BigUint::from_str(&units.trunc().to_string()).ok()
    }
}

#[async_trait]
pub trait WalletService: Send + Sync {
    /// Resolve the wallet's deposit address, creating one if necessary.
    async fn create_or_get_deposit_address(&self, wallet: &WalletRef) -> SwapResult<String>;

    fn asset_precision(
        &self,
        coin: &str,
        chain: &str,
        token_address: Option<&str>,
    ) -> Option<AssetPrecision>;
}

pub trait RateService: Send + Sync {
    /// Convert an amount in smallest units into the given fiat currency.
    /// `None` when no rate is known for the asset.
    fn to_fiat(&self, sat_amount: Decimal, coin: &str, chain: &str, fiat_code: &str)
        -> Option<Decimal>;
}

/// Wallet service backed by static precision tables, deriving a
/// deterministic deposit address per wallet id.
pub struct StaticWalletService {
    addresses: DashMap<String, String>,
    precisions: HashMap<String, AssetPrecision>,
}

impl StaticWalletService {
    pub fn new() -> Self {
        let mut precisions = HashMap::new();
        for (coin, decimals) in [
            ("btc", 8u32),
            ("bch", 8),
            ("ltc", 8),
            ("doge", 8),
            ("eth", 18),
            ("matic", 18),
            ("dai", 18),
            ("wbtc", 8),
            ("usdc", 6),
            ("usdt", 6),
            ("sol", 9),
            ("xrp", 6),
        ] {
            precisions.insert(coin.to_string(), AssetPrecision::of_decimals(decimals));
        }
        Self {
            addresses: DashMap::new(),
            precisions,
        }
    }

    pub fn with_address(self, wallet_id: &str, address: &str) -> Self {
        self.addresses
            .insert(wallet_id.to_string(), address.to_string());
        self
    }
}

impl Default for StaticWalletService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletService for StaticWalletService {
    async fn create_or_get_deposit_address(&self, wallet: &WalletRef) -> SwapResult<String> {
        if let Some(address) = self.addresses.get(&wallet.id) {
            return Ok(address.clone());
        }
        let address = format!("0x{:0>40}", wallet.id);
        self.addresses.insert(wallet.id.clone(), address.clone());
        Ok(address)
    }

    fn asset_precision(
        &self,
        coin: &str,
        _chain: &str,
        _token_address: Option<&str>,
    ) -> Option<AssetPrecision> {
        self.precisions.get(&coin.to_lowercase()).copied()
    }
}

/// Rate service over a static fiat-price table (price of one display
/// unit, per coin and fiat code).
pub struct StaticRateService {
    prices: HashMap<(String, String), Decimal>,
    precisions: HashMap<String, AssetPrecision>,
}

impl StaticRateService {
    pub fn new() -> Self {
        Self {
            prices: HashMap::new(),
            precisions: HashMap::new(),
        }
    }

    pub fn with_price(mut self, coin: &str, fiat_code: &str, unit_price: Decimal) -> Self {
        self.prices
            .insert((coin.to_lowercase(), fiat_code.to_uppercase()), unit_price);
        self.precisions
            .entry(coin.to_lowercase())
            .or_insert_with(|| default_precision(coin));
        self
    }
}

impl Default for StaticRateService {
    fn default() -> Self {
        Self::new()
    }
}

impl RateService for StaticRateService {
    fn to_fiat(
        &self,
        sat_amount: Decimal,
        coin: &str,
        _chain: &str,
        fiat_code: &str,
    ) -> Option<Decimal> {
        let unit_price = self
            .prices
            .get(&(coin.to_lowercase(), fiat_code.to_uppercase()))?;
        let precision = self.precisions.get(&coin.to_lowercase())?;
        Some(sat_amount / Decimal::from(precision.unit_to_satoshi) * unit_price)
    }
}

fn default_precision(coin: &str) -> AssetPrecision {
    match coin.to_lowercase().as_str() {
        "btc" | "bch" | "ltc" | "doge" | "wbtc" => AssetPrecision::of_decimals(8),
        "usdc" | "usdt" | "xrp" => AssetPrecision::of_decimals(6),
        "sol" => AssetPrecision::of_decimals(9),
        _ => AssetPrecision::of_decimals(18),
    }
}

/// Smallest-unit helper for callers holding a wallet and an amount.
pub fn deposit_in_smallest_units(
    wallet_service: &dyn WalletService,
    wallet: &WalletRef,
    amount: Decimal,
) -> SwapResult<BigUint> {
    let precision = wallet_service
        .asset_precision(&wallet.coin, &wallet.chain, wallet.token_address.as_deref())
        .ok_or_else(|| {
            SwapError::WalletServiceError(format!(
                "no precision known for {}/{}",
                wallet.coin, wallet.chain
            ))
        })?;
    precision.to_smallest_units(amount).ok_or_else(|| {
        SwapError::InvalidAmount(format!("cannot convert {} to smallest units", amount))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_smallest_units() {
        let usdc = AssetPrecision::of_decimals(6);
        assert_eq!(
            usdc.to_smallest_units(Decimal::from(500)),
            Some(BigUint::from(500_000_000u64))
        );
        assert_eq!(
            usdc.to_smallest_units(Decimal::new(15, 1)),
            Some(BigUint::from(1_500_000u64))
        );
        assert_eq!(usdc.to_smallest_units(Decimal::from(-1)), None);
    }

    #[test]
    fn test_static_rates_convert_sat_amounts() {
        let rates = StaticRateService::new().with_price("eth", "USD", Decimal::from(3000));
        // One whole ETH in wei.
        let one_eth_sat = Decimal::from(10u64.pow(18));
        assert_eq!(
            rates.to_fiat(one_eth_sat, "eth", "eth", "usd"),
            Some(Decimal::from(3000))
        );
        assert_eq!(rates.to_fiat(one_eth_sat, "pepe", "eth", "usd"), None);
    }

    #[tokio::test]
    async fn test_deposit_address_is_stable() {
        let wallets = StaticWalletService::new();
        let wallet = WalletRef {
            id: "w1".to_string(),
            coin: "usdc".to_string(),
            chain: "eth".to_string(),
            token_address: None,
            spendable_balance: None,
        };
        let a = wallets.create_or_get_deposit_address(&wallet).await.unwrap();
        let b = wallets.create_or_get_deposit_address(&wallet).await.unwrap();
        assert_eq!(a, b);
    }
}
