use chrono::{DateTime, Utc};

use crate::models::{ChargerStatus, SessionRecord, StationSnapshot};
use crate::status::Transition;

/// Energy readings at or below this are treated as a zeroed session counter.
pub const ENERGY_RESET_KWH: f64 = 0.05;

/// Opens and finalizes sessions of the home station from confirmed transitions.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    open: Option<SessionRecord>,
    last_ended_at: Option<DateTime<Utc>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        SessionTracker::default()
    }

    /// Resume from persisted state.
    pub fn restore(open: Option<SessionRecord>, last_session: Option<&SessionRecord>) -> Self {
        SessionTracker {
            open: open.filter(SessionRecord::is_open),
            last_ended_at: last_session.and_then(|session| session.ended_at),
        }
    }

    pub fn open(&self) -> Option<&SessionRecord> {
        self.open.as_ref()
    }

    /// Fold a reading of the home station into the open session.
    ///
    /// Near-zero energy readings are not recorded: idle and passive reports
    /// carry zero measurements. While charging, a live counter that drops back
    /// to near zero ends the session and opens a new one; the finished record
    /// is returned. Passive reports never split a session.
    pub fn on_reading(&mut self, confirmed: ChargerStatus, snapshot: &StationSnapshot) -> Option<SessionRecord> {
        let open = self.open.as_mut()?;

        let counter_reset = !snapshot.passive
            && confirmed == ChargerStatus::Charging
            && snapshot.status() == ChargerStatus::Charging
            && open.energy_kwh > ENERGY_RESET_KWH
            && snapshot.energy_kwh <= ENERGY_RESET_KWH;

        if counter_reset {
            tracing::info!(
                "Session counter of station {} reset ({} kWh -> {} kWh), splitting session",
                snapshot.station_id(),
                open.energy_kwh,
                snapshot.energy_kwh
            );
            let finished = self.finalize(snapshot.read_at);
            self.start(snapshot, snapshot.read_at);
            return finished;
        }

        if snapshot.energy_kwh > ENERGY_RESET_KWH {
            open.record_reading(snapshot.energy_kwh, snapshot.session_cost);
        } else if snapshot.session_cost.is_some_and(|cost| cost > 0.0) {
            open.record_reading(open.energy_kwh, snapshot.session_cost);
        }
        None
    }

    /// Apply a confirmed transition; returns the record it finalized, if any.
    pub fn on_transition(&mut self, transition: &Transition, snapshot: &StationSnapshot) -> Option<SessionRecord> {
        match (transition.from, transition.to) {
            (_, ChargerStatus::Unknown) | (ChargerStatus::Charging, ChargerStatus::Charging) => None,
            (ChargerStatus::Charging, _) => self.finalize(transition.at),
            (ChargerStatus::Unknown, ChargerStatus::Charging) if self.open.is_some() => {
                // Resumed after a restart with the session still running.
                None
            }
            (_, ChargerStatus::Charging) => {
                let finished = self.finalize(transition.at);
                self.start(snapshot, transition.at);
                finished
            }
            _ => None,
        }
    }

    fn start(&mut self, snapshot: &StationSnapshot, at: DateTime<Utc>) {
        let started_at = match self.last_ended_at {
            Some(last_end) => at.max(last_end),
            None => at,
        };
        let mut session = SessionRecord::open(snapshot.station_id(), started_at, snapshot.energy_kwh);
        session.record_reading(snapshot.energy_kwh, snapshot.session_cost);
        tracing::info!(
            "Session {} opened on station {} at {}",
            session.session_id,
            session.station_id,
            session.started_at
        );
        self.open = Some(session);
    }

    fn finalize(&mut self, at: DateTime<Utc>) -> Option<SessionRecord> {
        let mut session = self.open.take()?;
        if let Err(err) = session.finalize(at) {
            tracing::warn!("Dropping session that was already finalized: {}", err);
            return None;
        }
        tracing::info!(
            "Session {} on station {} finished: {} kWh, cost {:?}",
            session.session_id,
            session.station_id,
            session.energy_kwh,
            session.cost
        );
        self.last_ended_at = session.ended_at;
        Some(session)
    }
}
