use crate::core::types::ExchangeKey;
use rust_decimal::Decimal;
use thiserror::Error;

pub type SwapResult<T> = Result<T, SwapError>;

#[derive(Error, Debug)]
pub enum SwapError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("No offers available for {0}/{1}")]
    NoOffersAvailable(String, String),

    #[error("Offer from {0} is not in a swappable state")]
    OfferNotReady(ExchangeKey),

    #[error("Token spending approval required for {0} before execution")]
    ApprovalRequired(ExchangeKey),

    #[error("Allowance query failed: {0}")]
    AllowanceQueryFailed(String),

    #[error("Wallet service error: {0}")]
    WalletServiceError(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Engine is shut down")]
    EngineClosed,

    #[error("Other error: {0}")]
    Other(String),
}

/// Failure reasons a provider adapter can surface for a single round.
/// Every variant maps onto a user-visible offer state; none of them
/// ever aborts sibling providers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("{0}")]
    Disabled(String),

    #[error("amount out of limits (min: {min:?}, max: {max:?})")]
    OutOfLimits {
        min: Option<Decimal>,
        max: Option<Decimal>,
    },

    #[error("no route found: {0}")]
    NoRouteFound(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<anyhow::Error> for SwapError {
    fn from(err: anyhow::Error) -> Self {
        SwapError::Other(err.to_string())
    }
}

impl From<reqwest::Error> for SwapError {
    fn from(err: reqwest::Error) -> Self {
        SwapError::NetworkError(err.to_string())
    }
}

impl From<serde_json::Error> for SwapError {
    fn from(err: serde_json::Error) -> Self {
        SwapError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::NetworkError(err.to_string())
    }
}
