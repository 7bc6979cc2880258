//! Price reconciliation - the sole authority for derived totals.
//!
//! Every monetary value is rounded to two decimal places after each
//! arithmetic step so repeated increments cannot accumulate drift. Tax is
//! applied once to the aggregate subtotal, never per line.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::{CartLine, Totals};

/// Sales tax rate applied to the aggregate subtotal.
pub const TAX_RATE: Decimal = Decimal::from_parts(8, 0, 0, false, 2);

/// Round a monetary value to two decimal places, half away from zero.
#[must_use]
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Compute a line subtotal from its unit price and quantity.
///
/// Always recomputed; a subtotal carried in a payload is never trusted.
#[must_use]
pub fn line_subtotal(unit_price: Decimal, quantity: u32) -> Decimal {
    round_money(unit_price * Decimal::from(quantity))
}

/// Derive aggregate totals from the current line set.
///
/// Pure function of the lines: `subtotal` is the sum of line subtotals,
/// `tax` is `round(subtotal * TAX_RATE, 2)` applied once, and `total` is
/// their sum. An empty line set yields all zeros.
#[must_use]
pub fn reconcile(lines: &[CartLine]) -> Totals {
    let subtotal = round_money(lines.iter().map(|line| line.subtotal).sum());
    let tax = round_money(subtotal * TAX_RATE);
    let total = round_money(subtotal + tax);

    Totals {
        subtotal,
        tax,
        total,
    }
}
