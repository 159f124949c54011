//! # Order Pricing
//!
//! Prices are fixed when an order is created:
//!
//! ```text
//! total_amount = unit_price × quantity
//! tax_amount   = total_amount × tax_rate_bps / 10 000   (truncated)
//! grand_total  = total_amount + tax_amount
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{RsmError, ValidationError};
use crate::money::{apply_rate_bps, line_total, Cents};

/// The price breakdown stored on every stamp order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPricing {
    pub quantity: i64,
    pub unit_price: Cents,
    pub total_amount: Cents,
    pub tax_rate_bps: i64,
    pub tax_amount: Cents,
    pub grand_total: Cents,
}

impl OrderPricing {
    /// Price `quantity` stamps at `unit_price`.
    ///
    /// `quantity` must lie in `1..=max_quantity`; every product is checked
    /// for `i64` overflow.
    pub fn compute(
        unit_price: Cents,
        quantity: i64,
        tax_rate_bps: i64,
        max_quantity: i64,
    ) -> Result<Self, RsmError> {
        if !(1..=max_quantity).contains(&quantity) {
            return Err(ValidationError::QuantityOutOfRange {
                value: quantity,
                min: 1,
                max: max_quantity,
            }
            .into());
        }
        if unit_price < 0 {
            return Err(ValidationError::InvalidAmount(unit_price.to_string()).into());
        }

        let overflow = || RsmError::AmountOverflow(format!("{unit_price} × {quantity}"));
        let total_amount = line_total(unit_price, quantity).ok_or_else(overflow)?;
        let tax_amount = apply_rate_bps(total_amount, tax_rate_bps).ok_or_else(overflow)?;
        let grand_total = total_amount.checked_add(tax_amount).ok_or_else(overflow)?;

        Ok(Self {
            quantity,
            unit_price,
            total_amount,
            tax_rate_bps,
            tax_amount,
            grand_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixteen_percent_on_one_hundred_stamps() {
        let p = OrderPricing::compute(250, 100, 1600, 100_000).unwrap();
        assert_eq!(p.total_amount, 25_000);
        assert_eq!(p.tax_amount, 4_000);
        assert_eq!(p.grand_total, 29_000);
    }

    #[test]
    fn tax_truncates() {
        // 3 × 0.33 = 0.99, 16% = 0.1584 → 15 cents
        let p = OrderPricing::compute(33, 3, 1600, 10).unwrap();
        assert_eq!(p.total_amount, 99);
        assert_eq!(p.tax_amount, 15);
        assert_eq!(p.grand_total, 114);
    }

    #[test]
    fn quantity_bounds() {
        assert!(matches!(
            OrderPricing::compute(100, 0, 1600, 10),
            Err(RsmError::Validation(ValidationError::QuantityOutOfRange { .. }))
        ));
        assert!(OrderPricing::compute(100, 10, 1600, 10).is_ok());
        assert!(OrderPricing::compute(100, 11, 1600, 10).is_err());
    }

    #[test]
    fn overflow_is_an_error() {
        assert!(matches!(
            OrderPricing::compute(i64::MAX / 2, 3, 0, 10),
            Err(RsmError::AmountOverflow(_))
        ));
    }

    #[test]
    fn zero_rate() {
        let p = OrderPricing::compute(500, 2, 0, 10).unwrap();
        assert_eq!(p.tax_amount, 0);
        assert_eq!(p.grand_total, 1_000);
    }
}
