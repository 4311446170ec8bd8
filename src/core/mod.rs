pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::{Config, ProviderConfig};
pub use error::{ProviderError, SwapError, SwapResult};
pub use types::{
    AllowanceState, ChangellyRateResult, ExchangeKey, NormalizedQuote, Offer, OfferState,
    QuoteData, QuoteRequest, RequestIdentity, RouteFee, RouteMeta, RouteTimeEstimates,
    SlippageOpts, SwapLimits, ThorswapRoute, WalletRef,
};
