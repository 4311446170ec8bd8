//! Pure functions over the current round's offer set: best-offer
//! selection and slippage math. No I/O, safe to call on every update.

use crate::core::{ExchangeKey, Offer, OfferState, SlippageOpts};
use log::debug;
use rust_decimal::Decimal;

/// Outcome of a selection pass over one round's offers.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Offers are still streaming in and the settle delay has not
    /// elapsed; keep whatever the UI currently shows.
    Loading,
    Selected(ExchangeKey),
    /// Terminal: no provider produced a viable offer this round.
    NoOffers { warning: String },
}

/// Pick the offer with the numerically largest receive amount. Ties go
/// to the provider listed first. While any offer is still `Loading` the
/// selection only collapses to `NoOffers` after the round has settled,
/// so a fast provider's failure cannot flash an empty state.
pub fn select_best(offers: &[Offer], settled: bool) -> Selection {
    let mut best: Option<&Offer> = None;
    for offer in offers.iter().filter(|o| o.is_viable()) {
        match best {
            // Strictly-greater keeps the first-listed offer on ties.
            Some(current) if offer.amount_receiving <= current.amount_receiving => {}
            _ => best = Some(offer),
        }
    }

    if let Some(offer) = best {
        debug!(
            "Best offer: {} ({} receiving)",
            offer.key,
            offer.amount_receiving.unwrap_or_default()
        );
        return Selection::Selected(offer.key);
    }

    let still_loading = offers.iter().any(|o| o.state == OfferState::Loading);
    if still_loading && !settled {
        return Selection::Loading;
    }

    Selection::NoOffers {
        warning: "There are currently no offers that satisfy your request. Please try again later."
            .to_string(),
    }
}

/// Minimum acceptable receive amount for a quoted amount and a slippage
/// tolerance in percent: `amount / (1 + slippage / 100)`.
pub fn min_receive(amount_receiving: Decimal, slippage_percent: Decimal) -> Decimal {
    let divisor = Decimal::ONE + slippage_percent / Decimal::ONE_HUNDRED;
    if divisor <= Decimal::ZERO {
        return amount_receiving;
    }
    amount_receiving / divisor
}

/// A slippage value reported by a quote is only trusted inside the
/// provider's limits; anything else falls back to the provider default.
pub fn clamp_slippage(value: Decimal, opts: &SlippageOpts) -> Decimal {
    if value >= opts.min_limit && value <= opts.max_limit {
        value
    } else {
        debug!(
            "Quoted slippage {} outside [{}, {}], using default {}",
            value, opts.min_limit, opts.max_limit, opts.default
        );
        opts.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::{
        SLIPPAGE_MAX_LIMIT, SLIPPAGE_MIN_LIMIT, SLIPPAGE_STEP, THORSWAP_DEFAULT_SLIPPAGE,
    };
    use crate::core::SwapLimits;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn success_offer(key: ExchangeKey, amount: &str) -> Offer {
        let mut offer = Offer::loading(key, key.display_name());
        offer.state = OfferState::Success;
        offer.amount_receiving = Some(Decimal::from_str(amount).unwrap());
        offer
    }

    fn error_offer(key: ExchangeKey) -> Offer {
        let mut offer = Offer::loading(key, key.display_name());
        offer.state = OfferState::Error("boom".to_string());
        offer
    }

    fn default_opts() -> SlippageOpts {
        SlippageOpts {
            steps: *SLIPPAGE_STEP,
            min_limit: *SLIPPAGE_MIN_LIMIT,
            max_limit: *SLIPPAGE_MAX_LIMIT,
            default: *THORSWAP_DEFAULT_SLIPPAGE,
        }
    }

    #[test]
    fn test_select_largest_receive() {
        let offers = vec![
            success_offer(ExchangeKey::Changelly, "100"),
            success_offer(ExchangeKey::Thorswap, "105"),
        ];
        assert_eq!(
            select_best(&offers, false),
            Selection::Selected(ExchangeKey::Thorswap)
        );
    }

    #[test]
    fn test_errors_do_not_block_selection() {
        let offers = vec![
            success_offer(ExchangeKey::Changelly, "100"),
            error_offer(ExchangeKey::Thorswap),
        ];
        assert_eq!(
            select_best(&offers, false),
            Selection::Selected(ExchangeKey::Changelly)
        );
    }

    #[test]
    fn test_tie_goes_to_first_listed() {
        let offers = vec![
            success_offer(ExchangeKey::Changelly, "100"),
            success_offer(ExchangeKey::Thorswap, "100"),
        ];
        assert_eq!(
            select_best(&offers, true),
            Selection::Selected(ExchangeKey::Changelly)
        );
    }

    #[test]
    fn test_all_failed_yields_warning() {
        let mut out_of_limits = Offer::loading(ExchangeKey::Changelly, "Changelly");
        out_of_limits.state = OfferState::OutOfLimits(SwapLimits::default());
        let offers = vec![out_of_limits, error_offer(ExchangeKey::Thorswap)];

        match select_best(&offers, true) {
            Selection::NoOffers { warning } => assert!(!warning.is_empty()),
            other => panic!("expected NoOffers, got {:?}", other),
        }
    }

    #[test]
    fn test_no_flicker_while_loading() {
        let offers = vec![
            error_offer(ExchangeKey::Changelly),
            Offer::loading(ExchangeKey::Thorswap, "THORSwap"),
        ];
        // Not settled yet: stay in Loading rather than flashing "no offers".
        assert_eq!(select_best(&offers, false), Selection::Loading);
        // Settled: the loading offer can no longer arrive this round.
        assert!(matches!(
            select_best(&offers, true),
            Selection::NoOffers { .. }
        ));
    }

    #[test]
    fn test_zero_amount_offer_is_not_viable() {
        let offers = vec![
            success_offer(ExchangeKey::Changelly, "0"),
            success_offer(ExchangeKey::Thorswap, "0.5"),
        ];
        assert_eq!(
            select_best(&offers, true),
            Selection::Selected(ExchangeKey::Thorswap)
        );
    }

    #[test]
    fn test_min_receive() {
        let amount = Decimal::from(100);
        assert_eq!(
            min_receive(amount, Decimal::TWO),
            amount / Decimal::from_str("1.02").unwrap()
        );
        assert_eq!(min_receive(amount, Decimal::ZERO), amount);
    }

    #[test]
    fn test_quote_slippage_outside_limits_uses_default() {
        let opts = default_opts();
        assert_eq!(
            clamp_slippage(Decimal::from(15), &opts),
            *THORSWAP_DEFAULT_SLIPPAGE
        );
        assert_eq!(
            clamp_slippage(Decimal::from_str("0.1").unwrap(), &opts),
            *THORSWAP_DEFAULT_SLIPPAGE
        );
        assert_eq!(
            clamp_slippage(Decimal::from_str("1.5").unwrap(), &opts),
            Decimal::from_str("1.5").unwrap()
        );
    }

    proptest! {
        #[test]
        fn prop_min_receive_never_exceeds_amount(
            amount in 0u64..1_000_000_000,
            slippage_tenths in 0u32..=100,
        ) {
            let amount = Decimal::from(amount);
            let slippage = Decimal::new(slippage_tenths as i64, 1);
            let min = min_receive(amount, slippage);
            prop_assert!(min <= amount);
            if slippage > Decimal::ZERO && amount > Decimal::ZERO {
                prop_assert!(min < amount);
            }
        }

        #[test]
        fn prop_min_receive_monotonic_in_slippage(
            amount in 1u64..1_000_000_000,
            a in 0u32..=95,
            b in 0u32..=95,
        ) {
            let amount = Decimal::from(amount);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let lo = Decimal::new(lo as i64, 1);
            let hi = Decimal::new(hi as i64, 1);
            prop_assert!(min_receive(amount, hi) <= min_receive(amount, lo));
        }
    }
}
