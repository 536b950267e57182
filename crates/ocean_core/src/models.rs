use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::SessionError;

/// Vendor-assigned connector identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(pub u64);

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalise a QR/EVSE code for comparison: trimmed and case-insensitive.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationIdentity {
    pub station_id: StationId,
    /// Printed QR/EVSE code, e.g. `IS*ONP00281-3806-1-1`.
    pub code: Option<String>,
    pub label: Option<String>,
    /// Vendor location the connector belongs to.
    pub location_id: Option<u64>,
    /// Parent charge point, required by the vendor's stop command.
    pub charge_point_id: Option<u64>,
}

impl StationIdentity {
    pub fn new(station_id: StationId) -> Self {
        StationIdentity {
            station_id,
            code: None,
            label: None,
            location_id: None,
            charge_point_id: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_location(mut self, location_id: u64) -> Self {
        self.location_id = Some(location_id);
        self
    }

    pub fn with_charge_point(mut self, charge_point_id: u64) -> Self {
        self.charge_point_id = Some(charge_point_id);
        self
    }

    pub fn matches_code(&self, code: &str) -> bool {
        self.code
            .as_deref()
            .is_some_and(|own| normalize_code(own) == normalize_code(code))
    }

    /// Fill fields this identity lacks from an older sighting of the same station.
    pub(crate) fn merged_with(mut self, older: &StationIdentity) -> Self {
        if self.code.is_none() {
            self.code = older.code.clone();
        }
        if self.label.is_none() {
            self.label = older.label.clone();
        }
        if self.location_id.is_none() {
            self.location_id = older.location_id;
        }
        if self.charge_point_id.is_none() {
            self.charge_point_id = older.charge_point_id;
        }
        self
    }
}

/// Canonical charger status exposed to the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChargerStatus {
    #[default]
    Unknown,
    Available,
    Preparing,
    Charging,
    Unavailable,
}

impl fmt::Display for ChargerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChargerStatus::Unknown => "unknown",
            ChargerStatus::Available => "available",
            ChargerStatus::Preparing => "preparing",
            ChargerStatus::Charging => "charging",
            ChargerStatus::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// Connector status as titled by the vendor platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VendorStatus {
    Available,
    Occupied,
    Preparing,
    SuspendedEv,
    SuspendedEvse,
    Reserved,
    Finishing,
    Charging,
    Faulted,
    Unavailable,
    Other,
}

impl VendorStatus {
    pub fn from_title(title: &str) -> Self {
        match title.trim().to_lowercase().as_str() {
            "available" => VendorStatus::Available,
            "occupied" => VendorStatus::Occupied,
            "preparing" => VendorStatus::Preparing,
            "suspended ev" | "suspendedev" => VendorStatus::SuspendedEv,
            "suspended evse" | "suspendedevse" => VendorStatus::SuspendedEvse,
            "reserved" => VendorStatus::Reserved,
            "finishing" => VendorStatus::Finishing,
            "charging" => VendorStatus::Charging,
            "faulted" => VendorStatus::Faulted,
            "unavailable" | "out of order" | "outoforder" => VendorStatus::Unavailable,
            _ => VendorStatus::Other,
        }
    }

    pub fn charger_status(self) -> ChargerStatus {
        match self {
            VendorStatus::Available => ChargerStatus::Available,
            VendorStatus::Occupied
            | VendorStatus::Preparing
            | VendorStatus::SuspendedEv
            | VendorStatus::SuspendedEvse
            | VendorStatus::Reserved
            | VendorStatus::Finishing => ChargerStatus::Preparing,
            VendorStatus::Charging => ChargerStatus::Charging,
            VendorStatus::Faulted | VendorStatus::Unavailable => ChargerStatus::Unavailable,
            VendorStatus::Other => ChargerStatus::Unknown,
        }
    }

    /// Definitive end-of-session statuses, confirmed without waiting for a second poll.
    pub fn is_terminal(self) -> bool {
        matches!(self, VendorStatus::Finishing | VendorStatus::Faulted)
    }

    /// A vehicle occupies the connector.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            VendorStatus::Occupied
                | VendorStatus::Preparing
                | VendorStatus::SuspendedEv
                | VendorStatus::SuspendedEvse
                | VendorStatus::Finishing
                | VendorStatus::Charging
        )
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Point-in-time read of one station, superseded every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationSnapshot {
    pub identity: StationIdentity,
    pub vendor_status: VendorStatus,
    /// Instantaneous power in kW.
    pub power_kw: f64,
    /// Cumulative energy of the running session in kWh.
    pub energy_kwh: f64,
    /// Live price per kWh.
    pub price_per_kwh: Option<f64>,
    /// Cumulative cost of the running session.
    pub session_cost: Option<f64>,
    pub read_at: DateTime<Utc>,
    /// Read from the location detail rather than the live session list.
    #[serde(default)]
    pub passive: bool,
}

impl StationSnapshot {
    pub fn new(identity: StationIdentity, vendor_status: VendorStatus, read_at: DateTime<Utc>) -> Self {
        StationSnapshot {
            identity,
            vendor_status,
            power_kw: 0.0,
            energy_kwh: 0.0,
            price_per_kwh: None,
            session_cost: None,
            read_at,
            passive: false,
        }
    }

    pub fn with_measurements(mut self, power_kw: f64, energy_kwh: f64) -> Self {
        self.power_kw = non_negative(power_kw);
        self.energy_kwh = non_negative(energy_kwh);
        self
    }

    pub fn with_price(mut self, price_per_kwh: f64) -> Self {
        self.price_per_kwh = Some(non_negative(price_per_kwh));
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.session_cost = Some(non_negative(cost));
        self
    }

    pub fn passive(mut self) -> Self {
        self.passive = true;
        self
    }

    pub fn station_id(&self) -> StationId {
        self.identity.station_id
    }

    pub fn status(&self) -> ChargerStatus {
        self.vendor_status.charger_status()
    }
}

/// One charging session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: uuid::Uuid,
    pub station_id: StationId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Last cumulative energy reported by the vendor for this session.
    pub energy_kwh: f64,
    /// Last cumulative cost reported by the vendor for this session.
    pub cost: Option<f64>,
    /// Energy reading when the session was opened.
    pub baseline_energy_kwh: f64,
}

impl SessionRecord {
    pub(crate) fn open(station_id: StationId, started_at: DateTime<Utc>, baseline_energy_kwh: f64) -> Self {
        SessionRecord {
            session_id: uuid::Uuid::new_v4(),
            station_id,
            started_at,
            ended_at: None,
            energy_kwh: baseline_energy_kwh,
            cost: None,
            baseline_energy_kwh,
        }
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// `end - start`, or `now - start` while the session is ongoing. Never negative.
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        let end = self.ended_at.unwrap_or(now);
        (end - self.started_at).max(Duration::zero())
    }

    pub(crate) fn record_reading(&mut self, energy_kwh: f64, cost: Option<f64>) {
        if !self.is_open() {
            return;
        }
        self.energy_kwh = energy_kwh;
        if cost.is_some() {
            self.cost = cost;
        }
    }

    pub(crate) fn finalize(&mut self, at: DateTime<Utc>) -> Result<(), SessionError> {
        if let Some(ended_at) = self.ended_at {
            return Err(SessionError::AlreadyFinalized {
                session_id: self.session_id,
                ended_at,
            });
        }
        self.ended_at = Some(at.max(self.started_at));
        Ok(())
    }
}
