use crate::core::constants::{CHANGELLY_RESTRICTED_COUNTRIES, CHANGELLY_SUPPORTED_COINS};
use crate::core::{
    ChangellyRateResult, Config, ExchangeKey, NormalizedQuote, ProviderConfig, ProviderError,
    QuoteData, QuoteRequest, SwapLimits,
};
use crate::providers::{
    check_limits, coin_listed, preload_allows, rate_in_fiat, LimitCheck, ProviderAdapter,
    SupportedCoin,
};
use crate::services::{RateService, WalletService};
use crate::utils::correlation_id;
use log::{debug, error};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

const DEFAULT_DISABLED_MSG: &str = "Can't get rates at this moment. Please try again later";

/// Fixed-rate adapter for the Changelly-style JSON-RPC backend.
pub struct ChangellyAdapter {
    client: reqwest::Client,
    base_url: String,
    config: ProviderConfig,
    fiat_code: String,
    wallet_service: Arc<dyn WalletService>,
    rate_service: Arc<dyn RateService>,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    id: &'a str,
    jsonrpc: &'static str,
    method: &'static str,
    params: FixRateParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FixRateParams {
    from: String,
    to: String,
    amount_from: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    result: Option<Vec<ChangellyRateResult>>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

impl ChangellyAdapter {
    pub fn new(
        config: &Config,
        wallet_service: Arc<dyn WalletService>,
        rate_service: Arc<dyn RateService>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.changelly_api_url.clone(),
            config: config.changelly.clone(),
            fiat_code: config.fiat_code.clone(),
            wallet_service,
            rate_service,
        }
    }

    /// The backend keys some assets differently from their wallet-side
    /// abbreviation.
    fn fixed_currency_abbreviation(coin: &str, chain: &str) -> String {
        match (coin.to_lowercase().as_str(), chain.to_lowercase().as_str()) {
            ("usdt", "eth") => "usdt20".to_string(),
            ("matic", "matic") => "maticpolygon".to_string(),
            ("usdc", "matic") => "usdcmatic".to_string(),
            (coin, _) => coin.to_string(),
        }
    }

    async fn quote_with_id(
        &self,
        request: &QuoteRequest,
        limits: &SwapLimits,
        id: &str,
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

        let body = RpcRequest {
            id,
            jsonrpc: "2.0",
            method: "getFixRateForAmount",
            params: FixRateParams {
                from: Self::fixed_currency_abbreviation(&request.coin_from, &request.chain_from),
                to: Self::fixed_currency_abbreviation(&request.coin_to, &request.chain_to),
                amount_from: request.amount_from.to_string(),
            },
        };

        debug!("Changelly getting quote (id: {})", id);

        let response = self.client.post(&self.base_url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::NetworkError(format!(
                "changelly returned HTTP {}",
                status
            )));
        }
        let text = response.text().await?;
        let parsed: RpcResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        // A response for a different request must never be applied.
        match parsed.id.as_deref() {
            Some(echoed) if echoed == id => {}
            other => {
                error!(
                    "Changelly correlation id mismatch: sent {}, got {:?}",
                    id, other
                );
                return Err(ProviderError::MalformedResponse(
                    "correlation id mismatch".to_string(),
                ));
            }
        }

        if let Some(err) = parsed.error {
            error!("Changelly rpc error {}: {}", err.code, err.message);
            return Err(ProviderError::NetworkError(err.message));
        }

        let results = parsed.result.unwrap_or_default();
        let result = results.into_iter().next().ok_or_else(|| {
            ProviderError::NoRouteFound(format!(
                "Changelly has temporarily disabled the {}({}) - {}({}) pair",
                request.coin_from.to_uppercase(),
                request.chain_from.to_uppercase(),
                request.coin_to.to_uppercase(),
                request.chain_to.to_uppercase()
            ))
        })?;

        let amount_receiving = Decimal::from_str(&result.amount_to).map_err(|_| {
            ProviderError::MalformedResponse(format!("unparseable amountTo: {}", result.amount_to))
        })?;
        let rate = Decimal::from_str(&result.result).map_err(|_| {
            ProviderError::MalformedResponse(format!("unparseable rate: {}", result.result))
        })?;

        let rate_fiat = rate_in_fiat(
            self.wallet_service.as_ref(),
            self.rate_service.as_ref(),
            request,
            rate,
            &self.fiat_code,
        );

        debug!("Changelly getting quote: SUCCESS");

        Ok(NormalizedQuote {
            amount_receiving,
            rate,
            rate_fiat,
            route_path: None,
            selected_route: None,
            spender_address: None,
            requires_approval: false,
            slippage: None,
            estimated_time_secs: None,
            fee_total: None,
            data: QuoteData::Changelly(result),
        })
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for ChangellyAdapter {
    fn key(&self) -> ExchangeKey {
        ExchangeKey::Changelly
    }

    fn supports_pair(
        &self,
        request: &QuoteRequest,
        supported_coins: Option<&[SupportedCoin]>,
    ) -> bool {
        if let Some(country) = request.country.as_deref() {
            if CHANGELLY_RESTRICTED_COUNTRIES
                .iter()
                .any(|c| c.eq_ignore_ascii_case(country))
            {
                return false;
            }
        }

        coin_listed(CHANGELLY_SUPPORTED_COINS, &request.coin_from)
            && coin_listed(CHANGELLY_SUPPORTED_COINS, &request.coin_to)
            && preload_allows(supported_coins, &request.coin_from, &request.chain_from)
            && preload_allows(supported_coins, &request.coin_to, &request.chain_to)
    }

    async fn get_quote(
        &self,
        request: &QuoteRequest,
        limits: &SwapLimits,
    ) -> Result<NormalizedQuote, ProviderError> {
        let id = correlation_id();
        self.quote_with_id(request, limits, &id).await
    }
}
