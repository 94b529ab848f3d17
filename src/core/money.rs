//! Money helpers shared by the pricing code.
//!
//! The database keeps amounts as integer minor units; pricing works on `Decimal`
//! with two decimal places. Conversions round half-up at the cent.

use crate::errors::{Error, Result};
use rust_decimal::prelude::*;

/// Decimal places kept for monetary values
pub const DECIMAL_PLACES: u32 = 2;

/// Lowest price any discounted line or cart may reach
pub const PRICE_FLOOR: Decimal = Decimal::ONE;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Converts stored minor units into a two-place decimal.
#[must_use]
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, DECIMAL_PLACES)
}

/// Converts a decimal into minor units, rounding half-up at the cent.
pub fn to_cents(amount: Decimal) -> Result<i64> {
    (amount.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        * HUNDRED)
        .to_i64()
        .ok_or_else(|| Error::InvalidAmount {
            amount: amount.to_string(),
        })
}

/// `amount` percent of `base`, rounded to two places.
#[must_use]
pub fn percent_of(base: Decimal, amount: Decimal) -> Decimal {
    (base * amount / HUNDRED).round_dp(DECIMAL_PLACES)
}

/// `price - discount`, never below [`PRICE_FLOOR`].
#[must_use]
pub fn floor_price(price: Decimal, discount: Decimal) -> Decimal {
    (price - discount).max(PRICE_FLOOR)
}
