//! Amount conversion and rounding.
//!
//! CRITICAL: Rounding strategy for converted amounts:
//! - Full precision is kept on the conversion record
//! - Display and posting round to the currency's decimal places
//! - Use banker's rounding (round half to even)

use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;

use super::error::CurrencyError;

/// Decimal places used when displaying a converted amount.
pub const DISPLAY_DECIMAL_PLACES: u32 = 2;

/// Converts an amount using the given exchange rate, keeping full precision.
///
/// # Errors
///
/// Returns `CurrencyError::AmountOverflow` if the product does not fit.
pub fn apply_rate(amount: Decimal, rate: Decimal) -> Result<Decimal, CurrencyError> {
    amount
        .checked_mul(rate)
        .ok_or(CurrencyError::AmountOverflow { amount, rate })
}

/// Converts an amount using the given exchange rate and rounds the result.
///
/// Uses banker's rounding (round half to even) to minimize cumulative errors.
///
/// # Errors
///
/// Returns `CurrencyError::AmountOverflow` if the product does not fit.
pub fn convert_amount(
    amount: Decimal,
    rate: Decimal,
    decimal_places: u32,
) -> Result<Decimal, CurrencyError> {
    apply_rate(amount, rate).map(|converted| round_amount(converted, decimal_places))
}

/// Rounds an amount with banker's rounding.
#[must_use]
pub fn round_amount(amount: Decimal, decimal_places: u32) -> Decimal {
    amount.round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointNearestEven)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_apply_rate_keeps_precision() {
        // 100 USD * 0.85 = 85 EUR
        assert_eq!(apply_rate(dec!(100), dec!(0.85)), Ok(dec!(85.00)));
        // 33.33 USD * 0.8512 = 28.370496 EUR
        assert_eq!(apply_rate(dec!(33.33), dec!(0.8512)), Ok(dec!(28.370496)));
    }

    #[test]
    fn test_convert_with_rounding() {
        // 100.50 USD * 83.123 = 8353.8615 INR -> rounds to 8353.86
        let result = convert_amount(dec!(100.50), dec!(83.123), 2);
        assert_eq!(result, Ok(dec!(8353.86)));
    }

    #[test]
    fn test_bankers_rounding() {
        // 2.5 rounds to 2, 3.5 rounds to 4
        assert_eq!(convert_amount(dec!(1), dec!(2.5), 0), Ok(dec!(2)));
        assert_eq!(convert_amount(dec!(1), dec!(3.5), 0), Ok(dec!(4)));
        assert_eq!(round_amount(dec!(0.125), 2), dec!(0.12));
        assert_eq!(round_amount(dec!(0.135), 2), dec!(0.14));
    }

    #[test]
    fn test_overflowing_product_is_an_error() {
        assert_eq!(
            apply_rate(Decimal::MAX, dec!(1.5)),
            Err(CurrencyError::AmountOverflow {
                amount: Decimal::MAX,
                rate: dec!(1.5)
            })
        );
        assert!(convert_amount(Decimal::MAX, dec!(83.123), 2).is_err());
        // shrinking rates stay in range
        assert!(apply_rate(Decimal::MAX, dec!(0.5)).is_ok());
    }
}
