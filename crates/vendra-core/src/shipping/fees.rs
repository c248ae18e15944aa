//! Delivery fee calculation
//!
//! fee = base + per-km rate * distance, zeroed entirely when the order
//! value reaches the area's free-delivery threshold. Fixed-point decimal
//! throughout, two fractional digits on the way out.

use rust_decimal::Decimal;

use crate::models::CoverageArea;

pub struct FeeCalculator;

impl FeeCalculator {
    /// Delivery fee for an order shipped into `area` over a straight-line
    /// distance. Negative distances are treated as zero and the result is
    /// clamped at zero.
    pub fn calculate(area: &CoverageArea, distance_km: Decimal, order_value: Decimal) -> Decimal {
        if area.free_delivery_threshold > Decimal::ZERO
            && order_value >= area.free_delivery_threshold
        {
            return Decimal::ZERO;
        }

        let distance = distance_km.max(Decimal::ZERO);
        let fee = area.base_delivery_fee + area.per_km_rate * distance;

        fee.max(Decimal::ZERO).round_dp(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn area(base: Decimal, per_km: Decimal, threshold: Decimal) -> CoverageArea {
        CoverageArea {
            id: Uuid::new_v4(),
            province: "BKK".to_string(),
            district: None,
            subdistrict: None,
            postal_code: None,
            is_self_delivery_area: true,
            delivery_route: None,
            delivery_zone: None,
            base_delivery_fee: base,
            per_km_rate: per_km,
            free_delivery_threshold: threshold,
            standard_hours: 48,
            express_hours: None,
            same_day_available: false,
            max_daily_capacity: 100,
            priority_order: 1,
            auto_assign: true,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_base_plus_distance() {
        let area = area(dec!(50), dec!(5), dec!(500));

        // Just under the threshold: full fee
        let fee = FeeCalculator::calculate(&area, dec!(10), dec!(499.99));
        assert_eq!(fee, dec!(100.00));
    }

    #[test]
    fn test_free_delivery_threshold() {
        let area = area(dec!(50), dec!(5), dec!(500));

        assert_eq!(FeeCalculator::calculate(&area, dec!(10), dec!(500.00)), Decimal::ZERO);
        // Distance is irrelevant once the threshold is met
        assert_eq!(FeeCalculator::calculate(&area, dec!(900), dec!(500.00)), Decimal::ZERO);
    }

    #[test]
    fn test_zero_threshold_disables_free_delivery() {
        let area = area(dec!(50), dec!(5), Decimal::ZERO);
        assert_eq!(FeeCalculator::calculate(&area, dec!(2), dec!(10000)), dec!(60));
    }

    #[test]
    fn test_negative_distance_clamped() {
        let area = area(dec!(50), dec!(5), Decimal::ZERO);
        assert_eq!(FeeCalculator::calculate(&area, dec!(-3), dec!(100)), dec!(50));
    }

    #[test]
    fn test_rounded_to_two_digits() {
        let area = area(dec!(10), dec!(3.333), Decimal::ZERO);
        // 10 + 3.333 * 1.5 = 14.9995 -> 15.00
        assert_eq!(FeeCalculator::calculate(&area, dec!(1.5), dec!(100)), dec!(15.00));
    }
}
