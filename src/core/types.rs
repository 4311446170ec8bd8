use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::core::constants::EVM_CHAINS;

/// Exchange backends the engine can aggregate, in declaration order.
/// Declaration order breaks best-offer ties (first listed wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeKey {
    Changelly,
    Thorswap,
}

impl ExchangeKey {
    pub const ALL: &'static [ExchangeKey] = &[ExchangeKey::Changelly, ExchangeKey::Thorswap];

    pub fn display_name(&self) -> &'static str {
        match self {
            ExchangeKey::Changelly => "Changelly",
            ExchangeKey::Thorswap => "THORSwap",
        }
    }
}

impl fmt::Display for ExchangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeKey::Changelly => write!(f, "changelly"),
            ExchangeKey::Thorswap => write!(f, "thorswap"),
        }
    }
}

/// Caller-side view of a wallet. Key management lives in the external
/// wallet service; the engine only needs identity, asset coordinates and
/// the spendable balance for the validation gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRef {
    pub id: String,
    pub coin: String,
    pub chain: String,
    pub token_address: Option<String>,
    pub spendable_balance: Option<Decimal>,
}

impl WalletRef {
    /// Tokens on EVM chains need a spending approval before a swap can
    /// pull funds from the wallet.
    pub fn is_erc20_token(&self) -> bool {
        self.token_address.is_some() && EVM_CHAINS.contains(&self.chain.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub amount_from: Decimal,
    pub coin_from: String,
    pub chain_from: String,
    pub coin_to: String,
    pub chain_to: String,
    pub wallet_from: WalletRef,
    pub wallet_to: WalletRef,
    pub country: Option<String>,
}

impl QuoteRequest {
    /// Identity tuple used for debounce coalescing and round supersession.
    pub fn identity(&self) -> RequestIdentity {
        RequestIdentity {
            amount_from: self.amount_from,
            coin_from: self.coin_from.clone(),
            chain_from: self.chain_from.clone(),
            coin_to: self.coin_to.clone(),
            chain_to: self.chain_to.clone(),
            wallet_from_id: self.wallet_from.id.clone(),
            wallet_to_id: self.wallet_to.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestIdentity {
    pub amount_from: Decimal,
    pub coin_from: String,
    pub chain_from: String,
    pub coin_to: String,
    pub chain_to: String,
    pub wallet_from_id: String,
    pub wallet_to_id: String,
}

/// Per-provider swap amount bounds, sourced externally (preloaded or
/// fetched ahead of the round). Read-only input to the limit filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwapLimits {
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

/// Lifecycle of one provider's offer within one round. Created as
/// `Loading`, transitions exactly once per round to a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OfferState {
    Loading,
    Success,
    OutOfLimits(SwapLimits),
    Error(String),
}

impl OfferState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OfferState::Loading)
    }
}

/// Bounds for the user-adjustable slippage tolerance slider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlippageOpts {
    pub steps: Decimal,
    pub min_limit: Decimal,
    pub max_limit: Decimal,
    pub default: Decimal,
}

/// Allowance confirmation lifecycle for one (owner, spender, token) key.
/// `Sufficient` is re-enterable: a changed spend amount restarts the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllowanceState {
    Unknown,
    Checking,
    Sufficient,
    InsufficientNeedsApproval,
    ApprovalPending,
    ApprovalConfirming,
    Failed,
}

impl fmt::Display for AllowanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AllowanceState::Unknown => "unknown",
            AllowanceState::Checking => "checking",
            AllowanceState::Sufficient => "sufficient",
            AllowanceState::InsufficientNeedsApproval => "insufficient, needs approval",
            AllowanceState::ApprovalPending => "approval pending",
            AllowanceState::ApprovalConfirming => "approval confirming",
            AllowanceState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One provider's normalized quote result for the current round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub key: ExchangeKey,
    pub name: String,
    pub state: OfferState,
    pub amount_receiving: Option<Decimal>,
    pub rate: Option<Decimal>,
    pub rate_fiat: Option<Decimal>,
    pub min_receive: Option<Decimal>,
    pub fee_total: Option<Decimal>,
    pub estimated_time_secs: Option<u64>,
    pub requires_approval: bool,
    pub approval: Option<AllowanceState>,
    pub slippage: Option<Decimal>,
    pub slippage_opts: Option<SlippageOpts>,
    pub route_path: Option<String>,
    pub selected_route: Option<String>,
    pub spender_address: Option<String>,
    pub quote: Option<QuoteData>,
}

impl Offer {
    pub fn loading(key: ExchangeKey, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            state: OfferState::Loading,
            amount_receiving: None,
            rate: None,
            rate_fiat: None,
            min_receive: None,
            fee_total: None,
            estimated_time_secs: None,
            requires_approval: false,
            approval: None,
            slippage: None,
            slippage_opts: None,
            route_path: None,
            selected_route: None,
            spender_address: None,
            quote: None,
        }
    }

    /// An offer the best-offer selector may pick: quoted successfully
    /// with a parseable, non-zero receive amount.
    pub fn is_viable(&self) -> bool {
        self.state == OfferState::Success
            && self
                .amount_receiving
                .map(|a| a > Decimal::ZERO)
                .unwrap_or(false)
    }
}

/// Provider-specific quote payload kept alongside the normalized fields,
/// so route switching can re-derive offer data without a new round. The
/// best-offer selector never looks inside this union.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QuoteData {
    Changelly(ChangellyRateResult),
    Thorswap(Vec<ThorswapRoute>),
}

/// One fixed-rate result from the Changelly-style backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangellyRateResult {
    pub id: String,
    /// Rate as a decimal string.
    pub result: String,
    pub amount_to: String,
    #[serde(default)]
    pub min_from: Option<String>,
    #[serde(default)]
    pub max_from: Option<String>,
}

/// One route from the THORSwap-style backend. A quote response carries
/// several of these, each a chain of sub-providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThorswapRoute {
    pub providers: Vec<String>,
    pub expected_output: String,
    #[serde(default)]
    pub optimal: bool,
    #[serde(default)]
    pub approval_target: Option<String>,
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default)]
    pub target_address: Option<String>,
    #[serde(default)]
    pub time_estimates: Option<RouteTimeEstimates>,
    #[serde(default)]
    pub meta: Option<RouteMeta>,
    #[serde(default)]
    pub fees: Option<HashMap<String, Vec<RouteFee>>>,
}

impl ThorswapRoute {
    /// Stable key a caller uses to select this route: its leading provider.
    pub fn route_key(&self) -> Option<&str> {
        self.providers.first().map(|p| p.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTimeEstimates {
    #[serde(default)]
    pub inbound_ms: Option<u64>,
    #[serde(default)]
    pub outbound_ms: Option<u64>,
    #[serde(default)]
    pub streaming_ms: Option<u64>,
    #[serde(default)]
    pub swap_ms: Option<u64>,
}

impl RouteTimeEstimates {
    pub fn total_ms(&self) -> u64 {
        self.inbound_ms.unwrap_or(0)
            + self.outbound_ms.unwrap_or(0)
            + self.streaming_ms.unwrap_or(0)
            + self.swap_ms.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMeta {
    #[serde(default)]
    pub slippage_percentage: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteFee {
    #[serde(default)]
    pub total_fee: Option<Decimal>,
}

/// Common offer model every adapter normalizes into. Fiat fields are
/// best-effort: a failed precision lookup omits them rather than failing
/// the quote.
#[derive(Debug, Clone)]
pub struct NormalizedQuote {
    pub amount_receiving: Decimal,
    pub rate: Decimal,
    pub rate_fiat: Option<Decimal>,
    pub route_path: Option<String>,
    pub selected_route: Option<String>,
    pub spender_address: Option<String>,
    pub requires_approval: bool,
    pub slippage: Option<Decimal>,
    pub estimated_time_secs: Option<u64>,
    pub fee_total: Option<Decimal>,
    pub data: QuoteData,
}
