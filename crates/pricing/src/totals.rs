use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gescom_core::{DomainError, DomainResult, Money, TaxRate};

/// One priced line: `quantity × unit_price`.
///
/// Quantity is signed on purpose so that a negative quantity coming from a
/// caller is reported as `InvalidInput` instead of being unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub quantity: i64,
    pub unit_price: Decimal,
}

impl PricedLine {
    pub fn new(quantity: i64, unit_price: Decimal) -> Self {
        Self { quantity, unit_price }
    }

    fn line_total(&self, index: usize) -> DomainResult<Money> {
        if self.quantity <= 0 {
            return Err(DomainError::invalid_input(format!(
                "line {}: quantity must be positive (got {})",
                index + 1,
                self.quantity
            )));
        }
        let quantity = u32::try_from(self.quantity).map_err(|_| {
            DomainError::invalid_input(format!("line {}: quantity too large", index + 1))
        })?;
        if self.unit_price.is_sign_negative() && !self.unit_price.is_zero() {
            return Err(DomainError::invalid_input(format!(
                "line {}: unit price must not be negative (got {})",
                index + 1,
                self.unit_price
            )));
        }
        // Rounded once, on the line amount; the unit price keeps its full precision.
        let amount = self
            .unit_price
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(|| DomainError::invalid_input(format!("line {}: amount overflow", index + 1)))?;
        Money::new(amount)
    }
}

/// Result of a pricing computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax_amount: Money,
    pub total: Money,
}

/// `Σ quantity × unit_price`, each line rounded to cents.
pub fn order_subtotal(lines: &[PricedLine]) -> DomainResult<Money> {
    lines
        .iter()
        .enumerate()
        .try_fold(Money::zero(), |acc, (idx, line)| acc.checked_add(line.line_total(idx)?))
}

/// Discount and tax applied to an already computed subtotal.
///
/// - `taxAmount = (subtotal − discount) × taxRate / 100`
/// - `total = subtotal − discount + taxAmount`
pub fn invoice_totals(subtotal: Money, discount: Money, tax_rate: TaxRate) -> DomainResult<Totals> {
    let taxable = subtotal.checked_sub(discount).map_err(|_| {
        DomainError::invalid_input(format!(
            "discount {discount} exceeds subtotal {subtotal}"
        ))
    })?;
    let tax_amount = taxable.percent(tax_rate)?;
    let total = taxable.checked_add(tax_amount)?;

    Ok(Totals {
        subtotal,
        discount,
        tax_amount,
        total,
    })
}

/// Full computation from raw inputs.
///
/// Fails with `InvalidInput` on a non-positive quantity, a negative price or
/// discount, a discount above the subtotal, or a tax rate outside `[0, 100]`.
pub fn compute_totals(
    lines: &[PricedLine],
    discount: Decimal,
    tax_rate: Decimal,
) -> DomainResult<Totals> {
    let discount = Money::new(discount)?;
    let tax_rate = TaxRate::new(tax_rate)?;
    let subtotal = order_subtotal(lines)?;
    invoice_totals(subtotal, discount, tax_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn money(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    #[test]
    fn two_lines_with_twenty_percent_tax() {
        let lines = [
            PricedLine::new(3, dec("10.00")),
            PricedLine::new(1, dec("5.00")),
        ];
        let totals = compute_totals(&lines, Decimal::ZERO, dec("20")).unwrap();

        assert_eq!(totals.subtotal, money("35.00"));
        assert_eq!(totals.discount, Money::zero());
        assert_eq!(totals.tax_amount, money("7.00"));
        assert_eq!(totals.total, money("42.00"));
        assert_eq!(totals.total.to_string(), "42.00");
    }

    #[test]
    fn discount_reduces_the_taxable_base() {
        let lines = [PricedLine::new(2, dec("50"))];
        let totals = compute_totals(&lines, dec("10"), dec("20")).unwrap();

        assert_eq!(totals.subtotal, money("100"));
        assert_eq!(totals.tax_amount, money("18"));
        assert_eq!(totals.total, money("108"));
    }

    #[test]
    fn tax_is_rounded_half_up() {
        // 1.10 × 5.5% = 0.0605 → 0.06
        let lines = [PricedLine::new(1, dec("1.10"))];
        let totals = compute_totals(&lines, Decimal::ZERO, dec("5.5")).unwrap();
        assert_eq!(totals.tax_amount, money("0.06"));
        assert_eq!(totals.total, money("1.16"));

        // 0.25 × 10% = 0.025 → 0.03
        let lines = [PricedLine::new(1, dec("0.25"))];
        let totals = compute_totals(&lines, Decimal::ZERO, dec("10")).unwrap();
        assert_eq!(totals.tax_amount, money("0.03"));
    }

    #[test]
    fn sub_cent_unit_price_is_rounded_on_the_line_amount() {
        // 3 × 0.335 = 1.005 → 1.01, not 3 × 0.34 = 1.02
        let lines = [PricedLine::new(3, dec("0.335"))];
        let totals = compute_totals(&lines, Decimal::ZERO, Decimal::ZERO).unwrap();
        assert_eq!(totals.subtotal, money("1.01"));

        // 7 × 0.0149 = 0.1043 → 0.10, pre-rounding the price would give 0.07
        let lines = [PricedLine::new(7, dec("0.0149"))];
        assert_eq!(order_subtotal(&lines).unwrap(), money("0.10"));
    }

    #[test]
    fn empty_lines_total_zero() {
        let totals = compute_totals(&[], Decimal::ZERO, dec("20")).unwrap();
        assert_eq!(totals.total, Money::zero());
    }

    #[test]
    fn negative_inputs_are_invalid() {
        let neg_price = [PricedLine::new(1, dec("-1"))];
        assert!(matches!(
            compute_totals(&neg_price, Decimal::ZERO, Decimal::ZERO),
            Err(DomainError::InvalidInput(msg)) if msg.contains("unit price")
        ));

        let neg_qty = [PricedLine::new(-2, dec("1"))];
        assert!(matches!(
            compute_totals(&neg_qty, Decimal::ZERO, Decimal::ZERO),
            Err(DomainError::InvalidInput(msg)) if msg.contains("quantity")
        ));

        let zero_qty = [PricedLine::new(0, dec("1"))];
        assert!(matches!(
            compute_totals(&zero_qty, Decimal::ZERO, Decimal::ZERO),
            Err(DomainError::InvalidInput(_))
        ));

        let ok = [PricedLine::new(1, dec("1"))];
        assert!(matches!(
            compute_totals(&ok, dec("-0.5"), Decimal::ZERO),
            Err(DomainError::InvalidInput(_))
        ));
        assert!(matches!(
            compute_totals(&ok, Decimal::ZERO, dec("-5")),
            Err(DomainError::InvalidInput(_))
        ));
        assert!(matches!(
            compute_totals(&ok, Decimal::ZERO, dec("120")),
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[test]
    fn discount_above_subtotal_is_invalid() {
        let lines = [PricedLine::new(1, dec("10"))];
        match compute_totals(&lines, dec("10.01"), Decimal::ZERO) {
            Err(DomainError::InvalidInput(msg)) if msg.contains("exceeds subtotal") => {}
            other => panic!("expected InvalidInput, got {other:?}"),
        }
        // Discount equal to subtotal is fine.
        let totals = compute_totals(&lines, dec("10"), dec("20")).unwrap();
        assert_eq!(totals.total, Money::zero());
    }
}
