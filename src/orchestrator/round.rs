//! Round state and its event reducer. Provider completions, approval
//! updates and user overrides arrive as immutable events on a single
//! consumer; an event carrying a superseded round sequence is dropped
//! before it can touch visible state.

use crate::core::{
    AllowanceState, ExchangeKey, NormalizedQuote, Offer, OfferState, ProviderError, QuoteData,
    QuoteRequest, SwapLimits,
};
use crate::providers::thorswap::{pick_route, route_patch};
use crate::selection::{self, Selection};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use rust_decimal::Decimal;

pub type RoundSeq = u64;

#[derive(Debug)]
pub enum RoundEvent {
    Started {
        round: RoundSeq,
        request: QuoteRequest,
        offers: Vec<Offer>,
    },
    Offer {
        round: RoundSeq,
        key: ExchangeKey,
        result: Result<NormalizedQuote, ProviderError>,
    },
    Approval {
        round: RoundSeq,
        key: ExchangeKey,
        state: AllowanceState,
    },
    Settled {
        round: RoundSeq,
    },
    SetSlippage {
        key: ExchangeKey,
        value: Decimal,
    },
    SelectRoute {
        key: ExchangeKey,
        route_key: String,
    },
    Cleared {
        warning: Option<String>,
    },
    Shutdown,
}

/// Round-scoped view handed to observers on every state change.
#[derive(Debug, Clone, Default)]
pub struct OffersSnapshot {
    pub round: RoundSeq,
    pub request: Option<QuoteRequest>,
    pub started_at: Option<DateTime<Utc>>,
    pub offers: Vec<Offer>,
    pub selected: Option<ExchangeKey>,
    pub warning: Option<String>,
    pub settled: bool,
}

impl OffersSnapshot {
    pub fn offer(&self, key: ExchangeKey) -> Option<&Offer> {
        self.offers.iter().find(|o| o.key == key)
    }

    pub fn selected_offer(&self) -> Option<&Offer> {
        self.selected.and_then(|key| self.offer(key))
    }

    pub fn all_settled(&self) -> bool {
        self.settled
    }
}

/// Owned by the reducer task; never touched from provider callbacks.
#[derive(Default)]
pub struct RoundState {
    current: RoundSeq,
    request: Option<QuoteRequest>,
    started_at: Option<DateTime<Utc>>,
    offers: Vec<Offer>,
    warning: Option<String>,
    settled: bool,
}

impl RoundState {
    /// Apply one event. Returns false when the event was stale or a
    /// no-op and observers need no update.
    pub fn apply(&mut self, event: RoundEvent) -> bool {
        match event {
            RoundEvent::Started {
                round,
                request,
                offers,
            } => {
                debug!("Round {} started with {} offer(s)", round, offers.len());
                self.current = round;
                self.request = Some(request);
                self.started_at = Some(Utc::now());
                self.offers = offers;
                self.warning = None;
                self.settled = false;
                true
            }
            RoundEvent::Offer { round, key, result } => {
                if !self.is_current(round, key) {
                    return false;
                }
                self.apply_offer_result(key, result)
            }
            RoundEvent::Approval { round, key, state } => {
                if !self.is_current(round, key) {
                    return false;
                }
                if let Some(offer) = self.offer_mut(key) {
                    offer.approval = Some(state);
                    true
                } else {
                    false
                }
            }
            RoundEvent::Settled { round } => {
                if round != self.current {
                    debug!("Ignoring settle for superseded round {}", round);
                    return false;
                }
                self.settled = true;
                true
            }
            RoundEvent::SetSlippage { key, value } => self.apply_slippage(key, value),
            RoundEvent::SelectRoute { key, route_key } => self.apply_route(key, &route_key),
            RoundEvent::Cleared { warning } => {
                debug!("Selection cleared");
                self.request = None;
                self.started_at = None;
                self.offers.clear();
                self.warning = warning;
                self.settled = false;
                true
            }
            RoundEvent::Shutdown => false,
        }
    }

    fn is_current(&self, round: RoundSeq, key: ExchangeKey) -> bool {
        if round != self.current {
            debug!(
                "Dropping result from {} for superseded round {} (current: {})",
                key, round, self.current
            );
            return false;
        }
        true
    }

    fn offer_mut(&mut self, key: ExchangeKey) -> Option<&mut Offer> {
        self.offers.iter_mut().find(|o| o.key == key)
    }

    fn apply_offer_result(
        &mut self,
        key: ExchangeKey,
        result: Result<NormalizedQuote, ProviderError>,
    ) -> bool {
        // NoRouteFound hides the provider instead of showing a failure.
        if let Err(ProviderError::NoRouteFound(msg)) = &result {
            debug!("{}: no route found ({}), hiding offer", key, msg);
            self.offers.retain(|o| o.key != key);
            return true;
        }

        let Some(offer) = self.offer_mut(key) else {
            warn!("Result for unknown provider {}", key);
            return false;
        };
        if offer.state.is_terminal() {
            warn!("{} already settled this round, dropping duplicate result", key);
            return false;
        }

        match result {
            Ok(quote) => {
                offer.state = OfferState::Success;
                offer.amount_receiving = Some(quote.amount_receiving);
                offer.rate = Some(quote.rate);
                offer.rate_fiat = quote.rate_fiat;
                offer.route_path = quote.route_path;
                offer.selected_route = quote.selected_route;
                offer.spender_address = quote.spender_address;
                offer.requires_approval = quote.requires_approval;
                offer.fee_total = quote.fee_total;
                offer.estimated_time_secs = quote.estimated_time_secs;
                if quote.slippage.is_some() {
                    offer.slippage = quote.slippage;
                }
                offer.min_receive = offer
                    .slippage
                    .map(|s| selection::min_receive(quote.amount_receiving, s));
                offer.quote = Some(quote.data);
            }
            Err(ProviderError::OutOfLimits { min, max }) => {
                offer.state = OfferState::OutOfLimits(SwapLimits { min, max });
            }
            Err(ProviderError::Disabled(msg)) => {
                offer.state = OfferState::Error(msg);
            }
            Err(ProviderError::NetworkError(msg))
            | Err(ProviderError::MalformedResponse(msg))
            | Err(ProviderError::NoRouteFound(msg)) => {
                offer.state = OfferState::Error(msg);
            }
        }
        true
    }

    fn apply_slippage(&mut self, key: ExchangeKey, value: Decimal) -> bool {
        let Some(offer) = self.offer_mut(key) else {
            return false;
        };
        let Some(opts) = offer.slippage_opts.clone() else {
            debug!("{} has no adjustable slippage", key);
            return false;
        };

        let value = value.clamp(opts.min_limit, opts.max_limit);
        offer.slippage = Some(value);
        offer.min_receive = offer
            .amount_receiving
            .map(|amount| selection::min_receive(amount, value));
        true
    }

    /// Switch a multi-route offer to another route without a new round.
    /// Fiat rate is rescaled from the previous normalization; the fiat
    /// price of the destination unit does not depend on the route.
    fn apply_route(&mut self, key: ExchangeKey, route_key: &str) -> bool {
        let Some(idx) = self.offers.iter().position(|o| o.key == key) else {
            return false;
        };
        let Some(QuoteData::Thorswap(routes)) = self.offers[idx].quote.clone() else {
            debug!("{} has no switchable routes", key);
            return false;
        };
        let Some(opts) = self.offers[idx].slippage_opts.clone() else {
            return false;
        };
        let Some(route) = pick_route(&routes, Some(route_key)) else {
            warn!("{}: route {} not present in quote", key, route_key);
            return false;
        };
        let amount_from = match self.request.as_ref() {
            Some(request) => request.amount_from,
            None => return false,
        };

        let patch = match route_patch(route, amount_from, &opts) {
            Ok(patch) => patch,
            Err(err) => {
                warn!("{}: cannot apply route {}: {}", key, route_key, err);
                return false;
            }
        };
        let offer = &mut self.offers[idx];

        if let (Some(old_rate), Some(old_fiat)) = (offer.rate, offer.rate_fiat) {
            if !old_rate.is_zero() {
                offer.rate_fiat = Some(old_fiat * patch.rate / old_rate);
            }
        }
        offer.amount_receiving = Some(patch.amount_receiving);
        offer.rate = Some(patch.rate);
        offer.route_path = Some(patch.route_path);
        offer.selected_route = patch.selected_route;
        offer.spender_address = patch.spender_address;
        offer.estimated_time_secs = patch.estimated_time_secs;
        if patch.slippage.is_some() {
            offer.slippage = patch.slippage;
        }
        offer.min_receive = offer
            .slippage
            .map(|s| selection::min_receive(patch.amount_receiving, s));
        true
    }

    pub fn snapshot(&self) -> OffersSnapshot {
        let (selected, warning) = if self.request.is_some() {
            match selection::select_best(&self.offers, self.settled) {
                Selection::Selected(key) => (Some(key), None),
                Selection::Loading => (None, None),
                Selection::NoOffers { warning } => (None, Some(warning)),
            }
        } else {
            (None, self.warning.clone())
        };

        OffersSnapshot {
            round: self.current,
            request: self.request.clone(),
            started_at: self.started_at,
            offers: self.offers.clone(),
            selected,
            warning: warning.or_else(|| self.warning.clone()),
            settled: self.settled,
        }
    }

    pub fn current_round(&self) -> RoundSeq {
        self.current
    }
}
