use crate::core::SwapLimits;
use crate::utils::format_amount;
use rust_decimal::Decimal;

/// Result of checking a requested amount against a provider's cached
/// swap limits. Pure and synchronous; limits are supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum LimitCheck {
    InLimits,
    OutOfLimits(SwapLimits),
}

pub fn check_limits(limits: &SwapLimits, amount: Decimal) -> LimitCheck {
    if let Some(min) = limits.min {
        if amount < min {
            return LimitCheck::OutOfLimits(limits.clone());
        }
    }
    if let Some(max) = limits.max {
        if amount > max {
            return LimitCheck::OutOfLimits(limits.clone());
        }
    }
    LimitCheck::InLimits
}

/// User-facing message for an out-of-limits offer card.
pub fn out_of_limits_message(provider_name: &str, coin: &str, limits: &SwapLimits) -> String {
    let min = limits
        .min
        .map(|m| format_amount(m, 8))
        .unwrap_or_else(|| "-".to_string());
    let max = limits
        .max
        .map(|m| format_amount(m, 8))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "There are no {} offers available, as the current swap limits for this exchange must be between {} and {} {}",
        provider_name,
        min,
        max,
        coin.to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn limits(min: Option<i64>, max: Option<i64>) -> SwapLimits {
        SwapLimits {
            min: min.map(Decimal::from),
            max: max.map(Decimal::from),
        }
    }

    #[test_case(Some(10), Some(100), 50 => true; "inside both bounds")]
    #[test_case(Some(10), Some(100), 10 => true; "at minimum")]
    #[test_case(Some(10), Some(100), 100 => true; "at maximum")]
    #[test_case(Some(10), Some(100), 5 => false; "below minimum")]
    #[test_case(Some(10), Some(100), 200 => false; "above maximum")]
    #[test_case(None, None, 200 => true; "no bounds")]
    #[test_case(None, Some(100), 200 => false; "max only")]
    #[test_case(Some(10), None, 5 => false; "min only")]
    fn test_check_limits(min: Option<i64>, max: Option<i64>, amount: i64) -> bool {
        check_limits(&limits(min, max), Decimal::from(amount)) == LimitCheck::InLimits
    }

    #[test]
    fn test_out_of_limits_message_formats_bounds() {
        let msg = out_of_limits_message("Changelly", "usdc", &limits(Some(20), Some(5000)));
        assert!(msg.contains("Changelly"));
        assert!(msg.contains("between 20 and 5000 USDC"));
    }
}
