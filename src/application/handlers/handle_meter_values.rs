//! MeterValues handler
//!
//! Updates the station's live telemetry only. Transactions are billed
//! exclusively from the reconciled Start/Stop register totals, so nothing
//! here touches the ledger or the transaction store.

use tracing::{debug, info};

use crate::domain::LiveTelemetry;
use crate::infrastructure::WriteJob;
use crate::protocol::messages::{MeterValuesRequest, MeterValuesResponse};
use crate::session::ChargePointSession;

const MEASURAND_ENERGY: &str = "Energy.Active.Import.Register";
const MEASURAND_POWER: &str = "Power.Active.Import";
const MEASURAND_SOC: &str = "SoC";

pub async fn handle_meter_values(
    session: &ChargePointSession,
    request: MeterValuesRequest,
) -> MeterValuesResponse {
    info!(
        station_id = session.station_id.as_str(),
        connector_id = request.connector_id,
        samples = request.meter_value.len(),
        "MeterValues"
    );

    let telemetry = extract_telemetry(&request);
    if !telemetry.is_empty() {
        session.writes.submit(WriteJob::UpdateLiveTelemetry {
            station_id: session.station_id.clone(),
            telemetry,
        });
    }

    MeterValuesResponse {}
}

/// Pull the measurands we care about out of the sampled values.
/// Unparseable samples are skipped individually; a later sample of the
/// same measurand wins.
fn extract_telemetry(request: &MeterValuesRequest) -> LiveTelemetry {
    let mut telemetry = LiveTelemetry::default();

    for meter_value in &request.meter_value {
        for sample in &meter_value.sampled_value {
            let Ok(value) = sample.value.parse::<f64>() else {
                debug!(value = sample.value.as_str(), "Skipping unparseable sample");
                continue;
            };
            let unit = sample.unit.as_deref();

            match sample.measurand.as_deref().unwrap_or(MEASURAND_ENERGY) {
                MEASURAND_ENERGY => {
                    let kwh = if unit == Some("kWh") { value } else { value / 1000.0 };
                    telemetry.session_energy_kwh = Some(kwh);
                }
                MEASURAND_POWER => {
                    let kw = if unit == Some("kW") { value } else { value / 1000.0 };
                    telemetry.power_kw = Some(kw);
                }
                MEASURAND_SOC => {
                    telemetry.soc_percent = Some(value as i32);
                }
                other => {
                    debug!(measurand = other, value, "Ignoring measurand");
                }
            }
        }
    }

    telemetry
}

// ── Tests ──────────────────────────────────────────────────────
