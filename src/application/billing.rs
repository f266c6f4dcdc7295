//! Billing engine
//!
//! Stateless pricing of a completed charging session: a pure function over
//! (tariff, usage, duration, wall clock). Monetary results are rounded to
//! 2 decimals, half away from zero.

use chrono::{DateTime, Local, Timelike};

use crate::domain::Tariff;

/// Avoided combustion-engine emissions per delivered kWh (kg CO2).
pub const CARBON_SAVING_FACTOR: f64 = 0.85;

/// Energy price multiplier inside the peak window.
pub const PEAK_MULTIPLIER: f64 = 1.5;

/// Peak window on the station's local clock: [17:00, 22:00).
const PEAK_START_HOUR: u32 = 17;
const PEAK_END_HOUR: u32 = 22;

const PEAK_SUFFIX: &str = " (PEAK RATE)";

/// Itemized, taxed outcome of a completed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Bill {
    pub cost_energy: f64,
    pub cost_parking: f64,
    pub cost_session: f64,
    /// Always zero for now; see the idle-fee note on [`compute_bill`].
    pub cost_idle: f64,
    pub subtotal: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
    /// Tariff name, annotated when the peak rate applied
    pub tariff_name: String,
    pub is_peak_hour: bool,
    pub carbon_saved_kg: f64,
}

impl Bill {
    /// Zero-valued bill for a station with no assigned tariff. The
    /// transaction still closes; only the pricing is absent. Carbon savings
    /// depend on usage alone and are still reported.
    fn unpriced(kwh_usage: f64) -> Self {
        Self {
            cost_energy: 0.0,
            cost_parking: 0.0,
            cost_session: 0.0,
            cost_idle: 0.0,
            subtotal: 0.0,
            tax_amount: 0.0,
            total_amount: 0.0,
            tariff_name: "Unknown".to_string(),
            is_peak_hour: false,
            carbon_saved_kg: compute_carbon_saved(kwh_usage),
        }
    }
}

/// Price a completed session.
///
/// The effective kWh price is the tariff price, multiplied by
/// [`PEAK_MULTIPLIER`] when the local hour of `now` falls in [17, 22);
/// the tariff name is annotated accordingly.
///
/// Idle fees: a session running past `grace_period_minutes` is eligible in
/// principle, but total plugged-in time cannot distinguish idling from
/// charging, so no idle amount is computed until stations report a real
/// idle signal. `cost_idle` stays zero.
pub fn compute_bill(
    tariff: Option<&Tariff>,
    kwh_usage: f64,
    duration_minutes: f64,
    now: DateTime<Local>,
) -> Bill {
    let Some(tariff) = tariff else {
        return Bill::unpriced(kwh_usage);
    };

    let mut tariff_name = tariff.name.clone();
    let is_peak_hour = (PEAK_START_HOUR..PEAK_END_HOUR).contains(&now.hour());
    let effective_price_kwh = if is_peak_hour {
        tariff_name.push_str(PEAK_SUFFIX);
        tariff.price_per_kwh * PEAK_MULTIPLIER
    } else {
        tariff.price_per_kwh
    };

    let cost_energy = round2(kwh_usage * effective_price_kwh);
    let cost_parking = round2(duration_minutes * tariff.price_per_minute);
    let cost_session = round2(tariff.session_fee);

    let subtotal = round2(cost_energy + cost_parking + cost_session);
    let tax_amount = round2(subtotal * tariff.tax_percentage / 100.0);
    let total_amount = round2(subtotal + tax_amount);

    Bill {
        cost_energy,
        cost_parking,
        cost_session,
        cost_idle: 0.0,
        subtotal,
        tax_amount,
        total_amount,
        tariff_name,
        is_peak_hour,
        carbon_saved_kg: compute_carbon_saved(kwh_usage),
    }
}

/// Estimated avoided CO2 for the delivered energy, in kg.
pub fn compute_carbon_saved(kwh_usage: f64) -> f64 {
    round2(kwh_usage * CARBON_SAVING_FACTOR)
}

/// Round to 2 decimals, half away from zero.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ── Tests ──────────────────────────────────────────────────────
