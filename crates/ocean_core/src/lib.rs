//! Charger identity and state reconciliation for Etrel OCEAN chargers.
//!
//! Everything in this crate is synchronous and free of I/O: the polling
//! loop in `ocean_engine` feeds vendor listings into a [`Reconciler`] and
//! publishes the resulting [`BridgeSnapshot`].

mod history;
mod models;
mod reconcile;
mod resolver;
mod status;

pub use crate::history::{ENERGY_RESET_KWH, SessionTracker};
pub use crate::models::*;
pub use crate::reconcile::{BridgeEvent, BridgeSnapshot, PollOutcome, ReconcileConfig, Reconciler};
pub use crate::resolver::{IdentityResolver, Resolution, resolve};
pub use crate::status::{EntityState, StatusDebouncer, Transition};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session {session_id} already ended at {ended_at}")]
    AlreadyFinalized {
        session_id: uuid::Uuid,
        ended_at: DateTime<Utc>,
    },
}

/// Outward-facing state of the configured home charger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeChargerState {
    /// Home station identity, once its code has matched.
    pub identity: Option<StationIdentity>,
    /// Last reading of the home station. Kept while stale.
    pub snapshot: Option<StationSnapshot>,
    pub entity: EntityState,
    pub current_session: Option<SessionRecord>,
    /// Last completed session. Only ever replaced by a newer finalized one.
    pub last_session: Option<SessionRecord>,
    pub last_successful_poll: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl HomeChargerState {
    /// Instantaneous power, zero unless the charger is confirmed charging and fresh.
    pub fn power_kw(&self) -> f64 {
        match (&self.snapshot, self.entity.effective_status()) {
            (Some(snapshot), ChargerStatus::Charging) => snapshot.power_kw,
            _ => 0.0,
        }
    }

    pub fn is_charging(&self) -> bool {
        self.entity.effective_status() == ChargerStatus::Charging
    }
}

/// The part of the state that must survive restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Home code the state was learned under.
    #[serde(default)]
    pub evse_code: Option<String>,
    pub identity: Option<StationIdentity>,
    pub location_id: Option<u64>,
    pub last_session: Option<SessionRecord>,
    pub open_session: Option<SessionRecord>,
}

impl PersistedState {
    /// Whether this state was learned under `configured_code`.
    ///
    /// Files written before the code was recorded fall back to the code of the
    /// saved identity.
    pub fn belongs_to(&self, configured_code: Option<&str>) -> bool {
        match (&self.evse_code, &self.identity) {
            (Some(saved), _) => configured_code.is_some_and(|code| normalize_code(saved) == normalize_code(code)),
            (None, Some(identity)) => configured_code.is_some_and(|code| identity.matches_code(code)),
            (None, None) => self.location_id.is_none() && self.open_session.is_none(),
        }
    }
}
