use crate::core::{constants::*, error::SwapResult, ExchangeKey, SwapError};
use serde::{Deserialize, Serialize};
use std::env;

/// Externally supplied per-provider switches. `disabled` keeps the offer
/// card visible with a message; `removed` hides the provider entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub disabled: bool,
    pub disabled_message: Option<String>,
    pub removed: bool,
    pub affiliate_address: Option<String>,
    pub affiliate_basis_points: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub changelly_api_url: String,
    pub thorswap_api_url: String,
    pub allowance_indexer_url: String,
    pub fiat_code: String,
    pub debounce_ms: u64,
    pub settle_ms: u64,
    pub allowance_poll_interval_ms: u64,
    pub allowance_max_poll_attempts: u32,
    pub allowance_query_retries: u32,
    pub changelly: ProviderConfig,
    pub thorswap: ProviderConfig,
}

impl Config {
    pub fn from_env() -> SwapResult<Self> {
        Ok(Self {
            changelly_api_url: env::var("CHANGELLY_API_URL")
                .unwrap_or_else(|_| CHANGELLY_API_URL.to_string()),
            thorswap_api_url: env::var("THORSWAP_API_URL")
                .unwrap_or_else(|_| THORSWAP_API_URL.to_string()),
            allowance_indexer_url: env::var("ALLOWANCE_INDEXER_URL")
                .unwrap_or_else(|_| ALLOWANCE_INDEXER_URL.to_string()),
            fiat_code: env::var("FIAT_CODE").unwrap_or_else(|_| "USD".to_string()),
            debounce_ms: env::var("QUOTE_DEBOUNCE_MS")
                .unwrap_or_default()
                .parse()
                .unwrap_or(QUOTE_DEBOUNCE_MS),
            settle_ms: env::var("ROUND_SETTLE_MS")
                .unwrap_or_default()
                .parse()
                .unwrap_or(ROUND_SETTLE_MS),
            allowance_poll_interval_ms: env::var("ALLOWANCE_POLL_INTERVAL_MS")
                .unwrap_or_default()
                .parse()
                .unwrap_or(ALLOWANCE_POLL_INTERVAL_MS),
            allowance_max_poll_attempts: env::var("ALLOWANCE_MAX_POLL_ATTEMPTS")
                .unwrap_or_default()
                .parse()
                .unwrap_or(ALLOWANCE_MAX_POLL_ATTEMPTS),
            allowance_query_retries: env::var("ALLOWANCE_QUERY_RETRIES")
                .unwrap_or_default()
                .parse()
                .unwrap_or(ALLOWANCE_QUERY_RETRIES),
            changelly: ProviderConfig::default(),
            thorswap: ProviderConfig::default(),
        })
    }

    pub fn validate(&self) -> SwapResult<()> {
        if self.allowance_poll_interval_ms == 0 {
            return Err(SwapError::ConfigError(
                "Allowance poll interval must be greater than 0".to_string(),
            ));
        }

        if self.allowance_max_poll_attempts == 0 {
            return Err(SwapError::ConfigError(
                "Allowance poll budget must be greater than 0".to_string(),
            ));
        }

        if self.fiat_code.is_empty() {
            return Err(SwapError::ConfigError(
                "Fiat code cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn provider(&self, key: ExchangeKey) -> &ProviderConfig {
        match key {
            ExchangeKey::Changelly => &self.changelly,
            ExchangeKey::Thorswap => &self.thorswap,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            changelly_api_url: CHANGELLY_API_URL.to_string(),
            thorswap_api_url: THORSWAP_API_URL.to_string(),
            allowance_indexer_url: ALLOWANCE_INDEXER_URL.to_string(),
            fiat_code: "USD".to_string(),
            debounce_ms: QUOTE_DEBOUNCE_MS,
            settle_ms: ROUND_SETTLE_MS,
            allowance_poll_interval_ms: ALLOWANCE_POLL_INTERVAL_MS,
            allowance_max_poll_attempts: ALLOWANCE_MAX_POLL_ATTEMPTS,
            allowance_query_retries: ALLOWANCE_QUERY_RETRIES,
            changelly: ProviderConfig::default(),
            thorswap: ProviderConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let config = Config {
            allowance_poll_interval_ms: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
