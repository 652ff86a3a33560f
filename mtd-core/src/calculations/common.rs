//! Rounding and clamping shared by the personal and company calculators.

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a money amount to pence, halves away from zero.
///
/// ```
/// use rust_decimal_macros::dec;
/// use mtd_core::calculations::common::round_pence;
///
/// assert_eq!(round_pence(dec!(10.004)), dec!(10.00));
/// assert_eq!(round_pence(dec!(10.005)), dec!(10.01));
/// assert_eq!(round_pence(dec!(-10.005)), dec!(-10.01));
/// ```
pub fn round_pence(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds a rate to four decimal places (hundredths of a percent).
pub fn round_rate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

/// `max(value, 0)`.
pub fn floor_at_zero(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

/// The part of `amount` that falls in the band `[lower, upper)`.
///
/// ```
/// use rust_decimal_macros::dec;
/// use mtd_core::calculations::common::slice_between;
///
/// assert_eq!(slice_between(dec!(60000), dec!(50270), dec!(125140)), dec!(9730));
/// assert_eq!(slice_between(dec!(40000), dec!(50270), dec!(125140)), dec!(0));
/// ```
pub fn slice_between(amount: Decimal, lower: Decimal, upper: Decimal) -> Decimal {
    floor_at_zero(amount.min(upper) - lower)
}
