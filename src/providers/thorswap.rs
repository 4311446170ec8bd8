use crate::core::constants::{
    SLIPPAGE_MAX_LIMIT, SLIPPAGE_MIN_LIMIT, SLIPPAGE_STEP, THORSWAP_DEFAULT_SLIPPAGE,
    THORSWAP_RESTRICTED_COUNTRIES, THORSWAP_SUPPORTED_COINS, THORSWAP_SUPPORTED_ETH_ERC20_TOKENS,
};
use crate::core::{
    Config, ExchangeKey, NormalizedQuote, ProviderConfig, ProviderError, QuoteData, QuoteRequest,
    SlippageOpts, SwapLimits, ThorswapRoute,
};
use crate::providers::{
    check_limits, coin_listed, preload_allows, rate_in_fiat, LimitCheck, ProviderAdapter,
    SupportedCoin,
};
use crate::selection::clamp_slippage;
use crate::services::{RateService, WalletService};
use log::{debug, error};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;

const DEFAULT_DISABLED_MSG: &str = "Can't get rates at this moment. Please try again later";

/// Adapter for the THORSwap-style REST backend. A quote is a set of
/// routes, each a chain of sub-providers; one route is surfaced per
/// round and the rest stay switchable on the offer.
pub struct ThorswapAdapter {
    client: reqwest::Client,
    base_url: String,
    config: ProviderConfig,
    fiat_code: String,
    wallet_service: Arc<dyn WalletService>,
    rate_service: Arc<dyn RateService>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    #[serde(default)]
    routes: Vec<ThorswapRoute>,
    #[serde(default)]
    message: Option<String>,
}

/// Offer fields derived from one route. Shared between quote
/// normalization and interactive route switching.
#[derive(Debug, Clone)]
pub struct RoutePatch {
    pub amount_receiving: Decimal,
    pub rate: Decimal,
    pub route_path: String,
    pub selected_route: Option<String>,
    pub spender_address: Option<String>,
    pub estimated_time_secs: Option<u64>,
    pub slippage: Option<Decimal>,
    pub fee_total: Option<Decimal>,
}

fn default_slippage_opts() -> SlippageOpts {
    SlippageOpts {
        steps: *SLIPPAGE_STEP,
        min_limit: *SLIPPAGE_MIN_LIMIT,
        max_limit: *SLIPPAGE_MAX_LIMIT,
        default: *THORSWAP_DEFAULT_SLIPPAGE,
    }
}

/// Collapse a route's ordered sub-providers into a display path.
pub fn providers_path(route: &ThorswapRoute) -> String {
    route.providers.join(" > ")
}

/// Route selection order: an explicitly requested provider key, else the
/// route flagged optimal, else the first listed.
pub fn pick_route<'a>(
    routes: &'a [ThorswapRoute],
    preferred_key: Option<&str>,
) -> Option<&'a ThorswapRoute> {
    if let Some(key) = preferred_key {
        if let Some(route) = routes
            .iter()
            .find(|r| r.route_key().is_some_and(|k| k.eq_ignore_ascii_case(key)))
        {
            return Some(route);
        }
    }
    routes.iter().find(|r| r.optimal).or_else(|| routes.first())
}

/// The spender contract for the ERC-20 approval, wherever the backend
/// put it on this route.
pub fn spender_address(route: &ThorswapRoute) -> Option<String> {
    for candidate in [&route.approval_target, &route.contract, &route.target_address] {
        if let Some(address) = candidate {
            if !address.is_empty() {
                return Some(address.clone());
            }
        }
    }
    None
}

/// Derive the offer-facing fields from one route.
pub fn route_patch(
    route: &ThorswapRoute,
    amount_from: Decimal,
    slippage_opts: &SlippageOpts,
) -> Result<RoutePatch, ProviderError> {
    let amount_receiving = Decimal::from_str(&route.expected_output).map_err(|_| {
        ProviderError::MalformedResponse(format!(
            "unparseable expectedOutput: {}",
            route.expected_output
        ))
    })?;

    if amount_from <= Decimal::ZERO {
        return Err(ProviderError::MalformedResponse(
            "rate undefined for zero amount".to_string(),
        ));
    }
    let rate = amount_receiving / amount_from;

    let slippage = route
        .meta
        .as_ref()
        .and_then(|m| m.slippage_percentage)
        .map(|s| clamp_slippage(s, slippage_opts));

    let estimated_time_secs = route
        .time_estimates
        .as_ref()
        .map(|t| t.total_ms() / 1000)
        .filter(|&secs| secs > 0);

    Ok(RoutePatch {
        amount_receiving,
        rate,
        route_path: providers_path(route),
        selected_route: route.route_key().map(|k| k.to_string()),
        spender_address: spender_address(route),
        estimated_time_secs,
        slippage,
        fee_total: None,
    })
}

impl ThorswapAdapter {
    pub fn new(
        config: &Config,
        wallet_service: Arc<dyn WalletService>,
        rate_service: Arc<dyn RateService>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.thorswap_api_url.clone(),
            config: config.thorswap.clone(),
            fiat_code: config.fiat_code.clone(),
            wallet_service,
            rate_service,
        }
    }

    /// Asset notation the backend expects: `CHAIN.COIN`, with the token
    /// contract appended for ERC-20 assets.
    fn fixed_coin(coin: &str, chain: &str, token_address: Option<&str>) -> String {
        let base = format!("{}.{}", chain.to_uppercase(), coin.to_uppercase());
        match token_address {
            Some(address) if !address.is_empty() => format!("{}-{}", base, address),
            _ => base,
        }
    }

    fn coin_supported(coin: &str, chain: &str) -> bool {
        let coin_lc = coin.to_lowercase();
        let chain_lc = chain.to_lowercase();
        if coin_lc == chain_lc {
            return coin_listed(THORSWAP_SUPPORTED_COINS, &coin_lc);
        }
        match chain_lc.as_str() {
            "eth" => coin_listed(THORSWAP_SUPPORTED_ETH_ERC20_TOKENS, &coin_lc),
            _ => coin_listed(THORSWAP_SUPPORTED_COINS, &coin_lc),
        }
    }

    fn fee_total_for(route: &ThorswapRoute, chain_from: &str) -> Option<Decimal> {
        route
            .fees
            .as_ref()
            .and_then(|fees| fees.get(&chain_from.to_uppercase()))
            .and_then(|entries| entries.first())
            .and_then(|fee| fee.total_fee)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for ThorswapAdapter {
    fn key(&self) -> ExchangeKey {
        ExchangeKey::Thorswap
    }

    fn slippage_opts(&self) -> Option<SlippageOpts> {
        Some(default_slippage_opts())
    }

    fn requires_approval(&self, request: &QuoteRequest) -> bool {
        request.wallet_from.is_erc20_token()
    }

    fn supports_pair(
        &self,
        request: &QuoteRequest,
        supported_coins: Option<&[SupportedCoin]>,
    ) -> bool {
        if let Some(country) = request.country.as_deref() {
            if THORSWAP_RESTRICTED_COUNTRIES
                .iter()
                .any(|c| c.eq_ignore_ascii_case(country))
            {
                return false;
            }
        }

        Self::coin_supported(&request.coin_from, &request.chain_from)
            && Self::coin_supported(&request.coin_to, &request.chain_to)
            && preload_allows(supported_coins, &request.coin_from, &request.chain_from)
            && preload_allows(supported_coins, &request.coin_to, &request.chain_to)
    }

    async fn get_quote(
        &self,
        request: &QuoteRequest,
        limits: &SwapLimits,
    ) -> Result<NormalizedQuote, ProviderError> {
        if self.config.disabled {
            let msg = self
                .config
                .disabled_message
                .clone()
                .unwrap_or_else(|| DEFAULT_DISABLED_MSG.to_string());
            return Err(ProviderError::Disabled(msg));
        }

        if let LimitCheck::OutOfLimits(limits) = check_limits(limits, request.amount_from) {
            return Err(ProviderError::OutOfLimits {
                min: limits.min,
                max: limits.max,
            });
        }

        let sell_asset = Self::fixed_coin(
            &request.coin_from,
            &request.chain_from,
            request.wallet_from.token_address.as_deref(),
        );
        let buy_asset = Self::fixed_coin(
            &request.coin_to,
            &request.chain_to,
            request.wallet_to.token_address.as_deref(),
        );

        let mut query: Vec<(&str, String)> = vec![
            ("sellAsset", sell_asset),
            ("buyAsset", buy_asset),
            ("sellAmount", request.amount_from.to_string()),
        ];
        if let Some(address) = &self.config.affiliate_address {
            query.push(("affiliateAddress", address.clone()));
            query.push((
                "affiliateBasisPoints",
                self.config.affiliate_basis_points.unwrap_or(100).to_string(),
            ));
        }

        debug!("Thorswap getting quote");

        let url = format!("{}/quote", self.base_url);
        let response = self.client.get(&url).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::NetworkError(format!(
                "thorswap returned HTTP {}",
                status
            )));
        }
        let text = response.text().await?;
        let parsed: QuoteResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        if parsed.routes.is_empty() {
            let msg = parsed
                .message
                .unwrap_or_else(|| DEFAULT_DISABLED_MSG.to_string());
            error!("Thorswap error: {}", msg);
            return Err(ProviderError::NoRouteFound(msg));
        }

        let opts = default_slippage_opts();
        let route = pick_route(&parsed.routes, None).ok_or_else(|| {
            ProviderError::MalformedResponse("no selectable route in quote".to_string())
        })?;
        let mut patch = route_patch(route, request.amount_from, &opts)?;
        patch.fee_total = Self::fee_total_for(route, &request.chain_from);

        let rate_fiat = rate_in_fiat(
            self.wallet_service.as_ref(),
            self.rate_service.as_ref(),
            request,
            patch.rate,
            &self.fiat_code,
        );

        debug!(
            "Thorswap getting quote: SUCCESS (route: {})",
            patch.route_path
        );

        Ok(NormalizedQuote {
            amount_receiving: patch.amount_receiving,
            rate: patch.rate,
            rate_fiat,
            route_path: Some(patch.route_path),
            selected_route: patch.selected_route,
            spender_address: patch.spender_address,
            requires_approval: request.wallet_from.is_erc20_token(),
            slippage: Some(patch.slippage.unwrap_or(*THORSWAP_DEFAULT_SLIPPAGE)),
            estimated_time_secs: patch.estimated_time_secs,
            fee_total: patch.fee_total,
            data: QuoteData::Thorswap(parsed.routes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WalletRef;
    use crate::services::{StaticRateService, StaticWalletService};
    use pretty_assertions::assert_eq;

    fn adapter_for(url: &str, provider: ProviderConfig) -> ThorswapAdapter {
        let config = Config {
            thorswap_api_url: url.to_string(),
            thorswap: provider,
            ..Config::default()
        };
        ThorswapAdapter::new(
            &config,
            Arc::new(StaticWalletService::new()),
            Arc::new(StaticRateService::new().with_price("eth", "USD", Decimal::from(3000))),
        )
    }

    fn request() -> QuoteRequest {
        QuoteRequest {
            amount_from: Decimal::from(500),
            coin_from: "usdc".to_string(),
            chain_from: "eth".to_string(),
            coin_to: "eth".to_string(),
            chain_to: "eth".to_string(),
            wallet_from: WalletRef {
                id: "w-from".to_string(),
                coin: "usdc".to_string(),
                chain: "eth".to_string(),
                token_address: Some("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".to_string()),
                spendable_balance: Some(Decimal::from(1000)),
            },
            wallet_to: WalletRef {
                id: "w-to".to_string(),
                coin: "eth".to_string(),
                chain: "eth".to_string(),
                token_address: None,
                spendable_balance: None,
            },
            country: None,
        }
    }

    fn route_json(provider: &str, output: &str, optimal: bool) -> String {
        format!(
            r#"{{"providers":["{}"],"expectedOutput":"{}","optimal":{},"approvalTarget":"0xspender{}"}}"#,
            provider, output, optimal, provider
        )
    }

    #[tokio::test]
    async fn test_optimal_route_preferred_over_first() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/quote")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(format!(
                r#"{{"routes":[{},{}]}}"#,
                route_json("SUSHISWAP", "0.31", false),
                route_json("UNISWAPV3", "0.33", true)
            ))
            .create_async()
            .await;

        let adapter = adapter_for(&server.url(), ProviderConfig::default());
        let quote = adapter
            .get_quote(&request(), &SwapLimits::default())
            .await
            .unwrap();

        assert_eq!(quote.amount_receiving, Decimal::from_str("0.33").unwrap());
        assert_eq!(quote.selected_route.as_deref(), Some("UNISWAPV3"));
        assert_eq!(quote.route_path.as_deref(), Some("UNISWAPV3"));
        assert!(quote.requires_approval);
        assert_eq!(
            quote.spender_address.as_deref(),
            Some("0xspenderUNISWAPV3")
        );
        // 0.33 / 500 = 0.00066; 0.00066 * 3000 = 1.98 USD
        assert_eq!(quote.rate, Decimal::from_str("0.00066").unwrap());
        assert_eq!(quote.rate_fiat, Some(Decimal::from_str("1.98").unwrap()));
    }

    #[tokio::test]
    async fn test_out_of_range_quote_slippage_clamped_to_default() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/quote")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"routes":[{"providers":["THORCHAIN"],"expectedOutput":"0.5","optimal":true,"meta":{"slippagePercentage":15}}]}"#,
            )
            .create_async()
            .await;

        let adapter = adapter_for(&server.url(), ProviderConfig::default());
        let quote = adapter
            .get_quote(&request(), &SwapLimits::default())
            .await
            .unwrap();
        assert_eq!(quote.slippage, Some(*THORSWAP_DEFAULT_SLIPPAGE));
    }

    #[tokio::test]
    async fn test_empty_routes_is_no_route() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/quote")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"routes":[],"message":"no routes for pair"}"#)
            .create_async()
            .await;

        let adapter = adapter_for(&server.url(), ProviderConfig::default());
        let err = adapter
            .get_quote(&request(), &SwapLimits::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ProviderError::NoRouteFound("no routes for pair".to_string())
        );
    }

    #[test]
    fn test_multi_hop_path_collapses() {
        let route = ThorswapRoute {
            providers: vec![
                "THORCHAIN".to_string(),
                "UNISWAPV2".to_string(),
                "SUSHISWAP".to_string(),
            ],
            expected_output: "1".to_string(),
            optimal: true,
            approval_target: None,
            contract: None,
            target_address: None,
            time_estimates: None,
            meta: None,
            fees: None,
        };
        assert_eq!(providers_path(&route), "THORCHAIN > UNISWAPV2 > SUSHISWAP");
    }

    #[test]
    fn test_spender_address_fallback_chain() {
        let mut route = ThorswapRoute {
            providers: vec!["UNISWAPV3".to_string()],
            expected_output: "1".to_string(),
            optimal: false,
            approval_target: Some("0xapproval".to_string()),
            contract: Some("0xcontract".to_string()),
            target_address: Some("0xtarget".to_string()),
            time_estimates: None,
            meta: None,
            fees: None,
        };
        assert_eq!(spender_address(&route).as_deref(), Some("0xapproval"));

        route.approval_target = Some(String::new());
        assert_eq!(spender_address(&route).as_deref(), Some("0xcontract"));

        route.contract = None;
        assert_eq!(spender_address(&route).as_deref(), Some("0xtarget"));

        route.target_address = None;
        assert_eq!(spender_address(&route), None);
    }

    #[test]
    fn test_pick_route_by_caller_key() {
        let routes: Vec<ThorswapRoute> = serde_json::from_str(&format!(
            "[{},{}]",
            route_json("SUSHISWAP", "0.31", false),
            route_json("UNISWAPV3", "0.33", true)
        ))
        .unwrap();

        let picked = pick_route(&routes, Some("sushiswap")).unwrap();
        assert_eq!(picked.route_key(), Some("SUSHISWAP"));

        // Unknown key falls back to the optimal route.
        let picked = pick_route(&routes, Some("ONEINCH")).unwrap();
        assert_eq!(picked.route_key(), Some("UNISWAPV3"));
    }

    #[test]
    fn test_estimated_time_sums_route_segments() {
        let route: ThorswapRoute = serde_json::from_str(
            r#"{"providers":["THORCHAIN"],"expectedOutput":"2","timeEstimates":{"inboundMs":60000,"outboundMs":30000,"swapMs":15000}}"#,
        )
        .unwrap();
        let opts = SlippageOpts {
            steps: *SLIPPAGE_STEP,
            min_limit: *SLIPPAGE_MIN_LIMIT,
            max_limit: *SLIPPAGE_MAX_LIMIT,
            default: *THORSWAP_DEFAULT_SLIPPAGE,
        };
        let patch = route_patch(&route, Decimal::ONE, &opts).unwrap();
        assert_eq!(patch.estimated_time_secs, Some(105));
    }

    #[test]
    fn test_pair_support_erc20_on_eth() {
        let adapter = adapter_for("http://127.0.0.1:1", ProviderConfig::default());
        let mut req = request();
        assert!(adapter.supports_pair(&req, None));

        req.coin_from = "pepe".to_string();
        assert!(!adapter.supports_pair(&req, None));
    }
}
