//! Tariff domain entity

/// Pricing policy applied to a station's transactions.
///
/// All prices are in the operator's currency unit. `price_per_kwh` is the
/// off-peak energy price; the billing engine applies the peak multiplier.
#[derive(Debug, Clone, PartialEq)]
pub struct Tariff {
    pub name: String,
    pub price_per_kwh: f64,
    pub price_per_minute: f64,
    /// Flat fee charged once per session
    pub session_fee: f64,
    pub tax_percentage: f64,
    /// Minutes a vehicle may stay plugged in past charging before idle
    /// charges become eligible
    pub grace_period_minutes: i64,
}

impl Default for Tariff {
    fn default() -> Self {
        Self {
            name: "Standard".to_string(),
            price_per_kwh: 2500.0,
            price_per_minute: 0.0,
            session_fee: 0.0,
            tax_percentage: 0.0,
            grace_period_minutes: 15,
        }
    }
}
