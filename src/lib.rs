#[macro_use]
extern crate lazy_static;

pub mod allowance;
pub mod cli;
pub mod core;
pub mod orchestrator;
pub mod providers;
pub mod selection;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use crate::core::{
    AllowanceState, Config, ExchangeKey, Offer, OfferState, QuoteRequest, SwapError, SwapLimits,
    SwapResult, WalletRef,
};
pub use crate::orchestrator::{OffersSnapshot, QuoteOrchestrator};
pub use crate::providers::{PreloadedProviderData, ProviderAdapter};
pub use crate::selection::Selection;
