//! Order monetary arithmetic
//!
//! The order total identity: total = item totals + shipping fee + tax
//! (when enabled) - discount. All arithmetic is fixed-point decimal.

use rust_decimal::Decimal;

use crate::models::CreateOrderItem;

/// Line item total
pub fn item_total(unit_price: Decimal, quantity: i32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

/// Computed monetary breakdown of an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

impl OrderTotals {
    pub fn compute(
        items: &[CreateOrderItem],
        shipping_fee: Decimal,
        tax: Decimal,
        tax_enabled: bool,
        discount: Decimal,
    ) -> Self {
        let subtotal: Decimal =
            items.iter().map(|i| item_total(i.unit_price, i.quantity)).sum();

        let effective_tax = if tax_enabled { tax } else { Decimal::ZERO };
        let total = subtotal + shipping_fee + effective_tax - discount;

        Self { subtotal, shipping_fee, tax, discount, total }
    }

    /// Recompute the total from stored order fields after an update
    pub fn recompute_total(
        subtotal: Decimal,
        shipping_fee: Decimal,
        tax: Decimal,
        tax_enabled: bool,
        discount: Decimal,
    ) -> Decimal {
        let effective_tax = if tax_enabled { tax } else { Decimal::ZERO };
        subtotal + shipping_fee + effective_tax - discount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn item(quantity: i32, unit_price: Decimal) -> CreateOrderItem {
        CreateOrderItem {
            product_id: Uuid::new_v4(),
            quantity,
            unit_price,
            price_overridden: false,
            override_reason: None,
        }
    }

    #[test]
    fn test_single_item_total() {
        // Two units at 10.99 each
        let totals =
            OrderTotals::compute(&[item(2, dec!(10.99))], Decimal::ZERO, Decimal::ZERO, false, Decimal::ZERO);
        assert_eq!(totals.subtotal, dec!(21.98));
        assert_eq!(totals.total, dec!(21.98));
    }

    #[test]
    fn test_total_identity() {
        let items = vec![item(1, dec!(100.00)), item(3, dec!(25.50))];
        let totals = OrderTotals::compute(&items, dec!(40.00), dec!(12.39), true, dec!(15.00));

        // 176.50 + 40.00 + 12.39 - 15.00
        assert_eq!(totals.subtotal, dec!(176.50));
        assert_eq!(totals.total, dec!(213.89));
    }

    #[test]
    fn test_tax_disabled_excluded_from_total() {
        let totals =
            OrderTotals::compute(&[item(1, dec!(50))], dec!(10), dec!(3.50), false, Decimal::ZERO);
        assert_eq!(totals.total, dec!(60));
        // The tax amount is still carried on the order for reporting
        assert_eq!(totals.tax, dec!(3.50));
    }

    #[test]
    fn test_recompute_matches_compute() {
        let items = vec![item(2, dec!(10.99))];
        let totals = OrderTotals::compute(&items, dec!(50), dec!(5), true, dec!(20));
        let recomputed =
            OrderTotals::recompute_total(totals.subtotal, dec!(50), dec!(5), true, dec!(20));
        assert_eq!(totals.total, recomputed);
    }
}
