//! Station domain entity

use chrono::{DateTime, Utc};

/// Connector/station status as reported over the wire (OCPP 1.6 vocabulary),
/// plus `Offline` which is applied locally when the transport drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationStatus {
    Available,
    Preparing,
    Charging,
    SuspendedEvse,
    SuspendedEv,
    Finishing,
    Reserved,
    Unavailable,
    Faulted,
    Offline,
}

impl StationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Preparing => "Preparing",
            Self::Charging => "Charging",
            Self::SuspendedEvse => "SuspendedEVSE",
            Self::SuspendedEv => "SuspendedEV",
            Self::Finishing => "Finishing",
            Self::Reserved => "Reserved",
            Self::Unavailable => "Unavailable",
            Self::Faulted => "Faulted",
            Self::Offline => "Offline",
        }
    }

    /// Parse a wire status string. Returns `None` for values outside the
    /// OCPP 1.6 vocabulary; callers acknowledge the frame either way.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Available" => Some(Self::Available),
            "Preparing" => Some(Self::Preparing),
            "Charging" => Some(Self::Charging),
            "SuspendedEVSE" => Some(Self::SuspendedEvse),
            "SuspendedEV" => Some(Self::SuspendedEv),
            "Finishing" => Some(Self::Finishing),
            "Reserved" => Some(Self::Reserved),
            "Unavailable" => Some(Self::Unavailable),
            "Faulted" => Some(Self::Faulted),
            "Offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

impl std::fmt::Display for StationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A physical charging unit, keyed by the identifier it connects with.
///
/// Created on first BootNotification, updated on every status and meter
/// event. Never deleted; a dropped transport marks it `Offline`.
#[derive(Debug, Clone)]
pub struct Station {
    pub id: String,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub status: StationStatus,
    /// Instantaneous charging power (kW)
    pub current_power_kw: f64,
    /// Energy delivered in the running session (kWh)
    pub session_energy_kwh: f64,
    /// Vehicle state of charge (%), when the station reports it
    pub soc_percent: Option<i32>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl Station {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            vendor: None,
            model: None,
            status: StationStatus::Available,
            current_power_kw: 0.0,
            session_energy_kwh: 0.0,
            soc_percent: None,
            last_heartbeat: None,
        }
    }

    /// Station record as written on BootNotification: identity refreshed,
    /// status forced back to `Available`, live telemetry zeroed. A fresh
    /// socket means the physical unit rebooted.
    pub fn booted(
        id: impl Into<String>,
        vendor: impl Into<String>,
        model: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            vendor: Some(vendor.into()),
            model: Some(model.into()),
            status: StationStatus::Available,
            current_power_kw: 0.0,
            session_energy_kwh: 0.0,
            soc_percent: None,
            last_heartbeat: Some(now),
        }
    }
}

/// Live meter readings extracted from a MeterValues frame. Fields the
/// station did not report stay `None` and are not written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveTelemetry {
    pub session_energy_kwh: Option<f64>,
    pub power_kw: Option<f64>,
    pub soc_percent: Option<i32>,
}

impl LiveTelemetry {
    pub fn is_empty(&self) -> bool {
        self.session_energy_kwh.is_none() && self.power_kw.is_none() && self.soc_percent.is_none()
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_roundtrip() {
        for status in [
            StationStatus::Available,
            StationStatus::Charging,
            StationStatus::SuspendedEvse,
            StationStatus::Finishing,
            StationStatus::Faulted,
            StationStatus::Offline,
        ] {
            assert_eq!(StationStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn status_parse_rejects_unknown() {
        assert_eq!(StationStatus::parse("Exploded"), None);
        assert_eq!(StationStatus::parse(""), None);
        assert_eq!(StationStatus::parse("available"), None);
    }

    #[test]
    fn booted_station_resets_live_state() {
        let station = Station::booted("CP-7", "VendorX", "ModelY", Utc::now());
        assert_eq!(station.status, StationStatus::Available);
        assert_eq!(station.current_power_kw, 0.0);
        assert_eq!(station.session_energy_kwh, 0.0);
        assert_eq!(station.vendor.as_deref(), Some("VendorX"));
        assert_eq!(station.model.as_deref(), Some("ModelY"));
    }

    #[test]
    fn telemetry_is_empty_only_without_readings() {
        assert!(LiveTelemetry::default().is_empty());
        let t = LiveTelemetry {
            power_kw: Some(11.0),
            ..Default::default()
        };
        assert!(!t.is_empty());
    }
}
