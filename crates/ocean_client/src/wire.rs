//! Vendor JSON shapes and their mapping onto `ocean_core` types.

use chrono::{DateTime, Utc};
use ocean_core::{StationId, StationIdentity, StationSnapshot, VendorStatus};
use ocean_engine::{CommandAck, SessionReport};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OnlineData {
    pub current_sessions: Vec<LiveSession>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Location {
    pub id: Option<u64>,
    pub friendly_name: Option<String>,
    pub charge_points: Vec<ChargePoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ChargePoint {
    pub id: Option<u64>,
    pub friendly_code: Option<String>,
    pub evses: Vec<Evse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Evse {
    pub friendly_code: Option<String>,
    pub connectors: Vec<Connector>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Connector {
    pub id: Option<u64>,
    pub code: Option<String>,
    pub evse_code: Option<String>,
    pub status: Option<ConnectorStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ConnectorStatus {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Measurements {
    pub power: Option<f64>,
    pub active_energy_consumed: Option<f64>,
    /// Live price per kWh.
    pub price: Option<f64>,
    pub cost: Option<f64>,
}

/// One entry of `CurrentSessions`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LiveSession {
    pub location: Location,
    pub charge_point: ChargePoint,
    pub evse: Evse,
    pub connector: Connector,
    pub measurements: Measurements,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ChargingData {
    pub location_id: Option<u64>,
    pub active_energy_consumed: Option<f64>,
    pub total_cost: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartRequest {
    pub evse_code: String,
    pub connector_id: u64,
    pub enable_limits: bool,
    pub soc_limits: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StopRequest {
    pub evse_code: String,
    pub charge_point_id: Option<u64>,
    pub connector_id: u64,
    pub soc_limits: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CommandResponse {
    pub is_successful: bool,
    pub error_description: Option<String>,
}

impl From<CommandResponse> for CommandAck {
    fn from(response: CommandResponse) -> Self {
        if response.is_successful {
            CommandAck::accepted()
        } else {
            CommandAck::rejected(
                response
                    .error_description
                    .unwrap_or_else(|| "command refused".to_string()),
            )
        }
    }
}

impl From<ChargingData> for SessionReport {
    fn from(data: ChargingData) -> Self {
        SessionReport {
            location_id: data.location_id,
            cumulative_energy_kwh: data.active_energy_consumed,
            cumulative_cost: data.total_cost,
            start_time: data.start_time,
        }
    }
}

/// `Connector.EvseCode` when given, otherwise `{charge point}-{evse}-{connector}`.
pub fn evse_code(charge_point: &ChargePoint, evse: &Evse, connector: &Connector) -> Option<String> {
    if let Some(code) = connector.evse_code.as_ref().filter(|code| !code.trim().is_empty()) {
        return Some(code.clone());
    }
    match (&charge_point.friendly_code, &evse.friendly_code, &connector.code) {
        (Some(cp), Some(evse), Some(conn)) => Some(format!("{}-{}-{}", cp, evse, conn)),
        _ => None,
    }
}

fn identity(location: &Location, charge_point: &ChargePoint, evse: &Evse, connector: &Connector) -> Option<StationIdentity> {
    let mut identity = StationIdentity::new(StationId(connector.id?));
    if let Some(code) = evse_code(charge_point, evse, connector) {
        identity = identity.with_code(code);
    }
    let label = match (&location.friendly_name, &charge_point.friendly_code) {
        (Some(name), Some(cp)) => Some(format!("{} ({})", name, cp)),
        (Some(name), None) => Some(name.clone()),
        (None, Some(cp)) => Some(cp.clone()),
        (None, None) => None,
    };
    if let Some(label) = label {
        identity = identity.with_label(label);
    }
    if let Some(location_id) = location.id {
        identity = identity.with_location(location_id);
    }
    if let Some(charge_point_id) = charge_point.id {
        identity = identity.with_charge_point(charge_point_id);
    }
    Some(identity)
}

fn vendor_status(connector: &Connector) -> VendorStatus {
    connector
        .status
        .as_ref()
        .and_then(|status| status.title.as_deref())
        .map(VendorStatus::from_title)
        .unwrap_or(VendorStatus::Other)
}

impl LiveSession {
    /// `None` when the entry carries no connector id.
    pub fn into_snapshot(self, read_at: DateTime<Utc>) -> Option<StationSnapshot> {
        let identity = identity(&self.location, &self.charge_point, &self.evse, &self.connector)?;
        let measurements = self.measurements;
        let mut snapshot = StationSnapshot::new(identity, vendor_status(&self.connector), read_at).with_measurements(
            measurements.power.unwrap_or_default(),
            measurements.active_energy_consumed.unwrap_or_default(),
        );
        if let Some(price) = measurements.price {
            snapshot = snapshot.with_price(price);
        }
        if let Some(cost) = measurements.cost {
            snapshot = snapshot.with_cost(cost);
        }
        Some(snapshot)
    }
}

impl Location {
    /// Every connector of the location as a passive report with zeroed measurements.
    pub fn passive_snapshots(&self, read_at: DateTime<Utc>) -> Vec<StationSnapshot> {
        let mut snapshots = Vec::new();
        for charge_point in &self.charge_points {
            for evse in &charge_point.evses {
                for connector in &evse.connectors {
                    if let Some(identity) = identity(self, charge_point, evse, connector) {
                        snapshots.push(StationSnapshot::new(identity, vendor_status(connector), read_at).passive());
                    }
                }
            }
        }
        snapshots
    }
}
