pub mod changelly;
pub mod limits;
pub mod thorswap;

use crate::core::{
    Config, ExchangeKey, NormalizedQuote, ProviderError, QuoteRequest, SlippageOpts, SwapLimits,
};
use crate::services::{RateService, WalletService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use changelly::ChangellyAdapter;
pub use limits::{check_limits, out_of_limits_message, LimitCheck};
pub use thorswap::ThorswapAdapter;

/// One entry of a preloaded supported-coin list, narrowing a provider's
/// static capability table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedCoin {
    pub symbol: String,
    pub chain: String,
}

impl SupportedCoin {
    pub fn matches(&self, coin: &str, chain: &str) -> bool {
        self.symbol.eq_ignore_ascii_case(coin) && self.chain.eq_ignore_ascii_case(chain)
    }
}

/// Externally sourced per-provider data fetched ahead of a round:
/// amount limits and an optional supported-coin list.
#[derive(Debug, Clone, Default)]
pub struct PreloadedProviderData {
    pub limits: SwapLimits,
    pub supported_coins: Option<Vec<SupportedCoin>>,
}

/// One integration per exchange backend. Pure request/response: adapters
/// share no state and never see each other's results.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn key(&self) -> ExchangeKey;

    fn display_name(&self) -> &'static str {
        self.key().display_name()
    }

    /// Whether this provider exposes user-adjustable quote options
    /// (slippage tolerance, route choice).
    fn slippage_opts(&self) -> Option<SlippageOpts> {
        None
    }

    /// Whether a swap through this provider needs a token spending
    /// approval before execution, known ahead of the quote.
    fn requires_approval(&self, _request: &QuoteRequest) -> bool {
        false
    }

    /// Static pair-support check against the provider capability table,
    /// optionally narrowed by a preloaded coin list and the caller's
    /// country. Must not perform network calls.
    fn supports_pair(
        &self,
        request: &QuoteRequest,
        supported_coins: Option<&[SupportedCoin]>,
    ) -> bool;

    /// Fetch and normalize a quote. Fails fast on admin-disabled and
    /// out-of-limits without touching the network.
    async fn get_quote(
        &self,
        request: &QuoteRequest,
        limits: &SwapLimits,
    ) -> Result<NormalizedQuote, ProviderError>;
}

/// Build the default adapter set in declaration order.
pub fn default_providers(
    config: &Config,
    wallet_service: Arc<dyn WalletService>,
    rate_service: Arc<dyn RateService>,
) -> Vec<Arc<dyn ProviderAdapter>> {
    vec![
        Arc::new(ChangellyAdapter::new(
            config,
            wallet_service.clone(),
            rate_service.clone(),
        )) as Arc<dyn ProviderAdapter>,
        Arc::new(ThorswapAdapter::new(config, wallet_service, rate_service)),
    ]
}

pub(crate) fn coin_listed(table: &[&str], coin: &str) -> bool {
    table.iter().any(|c| c.eq_ignore_ascii_case(coin))
}

pub(crate) fn preload_allows(
    supported_coins: Option<&[SupportedCoin]>,
    coin: &str,
    chain: &str,
) -> bool {
    match supported_coins {
        Some(coins) => coins.iter().any(|c| c.matches(coin, chain)),
        None => true,
    }
}

/// Fiat value of the destination-unit rate: `rate * unit_to_satoshi`
/// converted through the rate table. `None` when the precision or rate
/// lookup fails; the quote then simply omits fiat fields.
pub(crate) fn rate_in_fiat(
    wallet_service: &dyn WalletService,
    rate_service: &dyn RateService,
    request: &QuoteRequest,
    rate: rust_decimal::Decimal,
    fiat_code: &str,
) -> Option<rust_decimal::Decimal> {
    let precision = wallet_service.asset_precision(
        &request.coin_to,
        &request.chain_to,
        request.wallet_to.token_address.as_deref(),
    )?;
    rate_service.to_fiat(
        rate * rust_decimal::Decimal::from(precision.unit_to_satoshi),
        &request.coin_to,
        &request.chain_to,
        fiat_code,
    )
}
