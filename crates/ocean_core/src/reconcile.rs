use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::history::SessionTracker;
use crate::models::{ChargerStatus, SessionRecord, StationId, StationIdentity, StationSnapshot};
use crate::resolver::{IdentityResolver, Resolution};
use crate::status::{StatusDebouncer, Transition};
use crate::{HomeChargerState, PersistedState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileConfig {
    /// QR/EVSE code of the home charger.
    pub configured_code: Option<String>,
    /// Consecutive failed or empty cycles before the state is marked stale.
    pub stale_threshold: u32,
    /// Successful polls a new status must persist over before it is confirmed.
    pub debounce_polls: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            configured_code: None,
            stale_threshold: 3,
            debounce_polls: 2,
        }
    }
}

/// What one poll cycle produced.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    Listed(Vec<StationSnapshot>),
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeEvent {
    /// A relevant station was seen for the first time.
    StationDiscovered { identity: StationIdentity },
    StatusChanged {
        station_id: StationId,
        transition: Transition,
    },
    SessionStarted { session: SessionRecord },
    SessionFinished { session: SessionRecord },
    BecameStale { consecutive_failures: u32 },
    Recovered,
}

/// Everything published after a cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeSnapshot {
    pub home: HomeChargerState,
    /// Stations surfaced by the last successful listing.
    pub stations: Vec<StationSnapshot>,
    pub active_count: usize,
    /// Whether a home code is configured.
    pub home_configured: bool,
    /// Whether the last cycle reached the gateway.
    pub poll_ok: bool,
    /// Incremented on every published cycle.
    pub generation: u64,
}

impl BridgeSnapshot {
    /// Identity of a station currently resolved as a command target.
    pub fn target(&self, station_id: Option<StationId>) -> Option<&StationIdentity> {
        match station_id {
            None => self.home.identity.as_ref().or_else(|| match self.stations.as_slice() {
                [only] if !self.home_configured => Some(&only.identity),
                _ => None,
            }),
            Some(id) => {
                if let Some(home) = self.home.identity.as_ref().filter(|home| home.station_id == id) {
                    return Some(home);
                }
                if self.home_configured {
                    return None;
                }
                self.stations
                    .iter()
                    .map(|station| &station.identity)
                    .find(|identity| identity.station_id == id)
            }
        }
    }

    /// Status of a station as seen by this snapshot.
    ///
    /// Without a home code only active stations are listed, so a station
    /// missing from a successful listing has gone idle.
    pub fn status_of(&self, station_id: StationId) -> ChargerStatus {
        if self.home.identity.as_ref().is_some_and(|home| home.station_id == station_id) {
            return self.home.entity.effective_status();
        }
        if !self.poll_ok {
            return ChargerStatus::Unknown;
        }
        match self.stations.iter().find(|station| station.station_id() == station_id) {
            Some(station) => station.status(),
            None if !self.home_configured => ChargerStatus::Available,
            None => ChargerStatus::Unknown,
        }
    }
}

/// Merges poll outcomes into `HomeChargerState`.
#[derive(Debug, Clone)]
pub struct Reconciler {
    config: ReconcileConfig,
    resolver: IdentityResolver,
    debouncer: StatusDebouncer,
    tracker: SessionTracker,
    state: HomeChargerState,
    stations: Vec<StationSnapshot>,
    known: BTreeSet<StationId>,
    location_id: Option<u64>,
    poll_ok: bool,
    generation: u64,
}

impl Reconciler {
    pub fn new(config: ReconcileConfig) -> Self {
        Reconciler::restore(config, PersistedState::default())
    }

    /// Resume from persisted state. State learned under another home code is discarded.
    pub fn restore(config: ReconcileConfig, persisted: PersistedState) -> Self {
        let persisted = if persisted.belongs_to(config.configured_code.as_deref()) {
            persisted
        } else {
            tracing::warn!(
                "Discarding persisted state of code {:?}, now configured for {:?}",
                persisted
                    .evse_code
                    .as_deref()
                    .or_else(|| persisted.identity.as_ref().and_then(|identity| identity.code.as_deref())),
                config.configured_code
            );
            PersistedState::default()
        };
        let resolver =
            IdentityResolver::new(config.configured_code.as_deref()).with_cached(persisted.identity);
        let tracker = SessionTracker::restore(persisted.open_session, persisted.last_session.as_ref());
        // A session left open by the previous run is still running until a poll says otherwise.
        let debouncer = match tracker.open() {
            Some(_) => StatusDebouncer::new(config.debounce_polls).with_confirmed(ChargerStatus::Charging),
            None => StatusDebouncer::new(config.debounce_polls),
        };
        let location_id = persisted
            .location_id
            .or_else(|| resolver.cached().and_then(|identity| identity.location_id));

        let state = HomeChargerState {
            identity: resolver.cached().cloned(),
            current_session: tracker.open().cloned(),
            last_session: persisted.last_session,
            ..HomeChargerState::default()
        };

        Reconciler {
            config,
            resolver,
            debouncer,
            tracker,
            state,
            stations: Vec::new(),
            known: BTreeSet::new(),
            location_id,
            poll_ok: false,
            generation: 0,
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn state(&self) -> &HomeChargerState {
        &self.state
    }

    pub fn home_identity(&self) -> Option<&StationIdentity> {
        self.state.identity.as_ref()
    }

    /// Vendor location of the home charger, once known.
    pub fn location_id(&self) -> Option<u64> {
        self.location_id
    }

    pub fn set_location_id(&mut self, location_id: u64) {
        self.location_id = Some(location_id);
        self.resolver.remember_location(location_id);
        if let Some(identity) = self.state.identity.as_mut() {
            identity.location_id.get_or_insert(location_id);
        }
    }

    pub fn persisted(&self) -> PersistedState {
        PersistedState {
            evse_code: self.resolver.configured_code().map(str::to_string),
            identity: self.state.identity.clone(),
            location_id: self.location_id,
            last_session: self.state.last_session.clone(),
            open_session: self.tracker.open().cloned(),
        }
    }

    pub fn snapshot(&self) -> BridgeSnapshot {
        BridgeSnapshot {
            home: self.state.clone(),
            stations: self.stations.clone(),
            active_count: self
                .stations
                .iter()
                .filter(|station| station.vendor_status.is_active())
                .count(),
            home_configured: self.resolver.configured_code().is_some(),
            poll_ok: self.poll_ok,
            generation: self.generation,
        }
    }

    /// Merge one poll outcome and return what changed.
    pub fn apply(&mut self, outcome: PollOutcome, now: DateTime<Utc>) -> Vec<BridgeEvent> {
        let mut events = Vec::new();
        self.generation += 1;

        match outcome {
            PollOutcome::Failed { reason } => {
                tracing::warn!("Poll failed: {}", reason);
                self.poll_ok = false;
                self.record_miss(&mut events);
            }
            PollOutcome::Listed(listing) => {
                self.poll_ok = true;
                match self.resolver.resolve(&listing) {
                    Resolution::Home(snapshot) => {
                        self.stations = vec![snapshot.clone()];
                        self.observe_home(snapshot, now, &mut events);
                    }
                    Resolution::HomeMissing => {
                        tracing::debug!("Home station not reported in this cycle");
                        self.stations.clear();
                        self.record_miss(&mut events);
                    }
                    Resolution::Active(active) => {
                        for station in &active {
                            self.discover(&station.identity, &mut events);
                        }
                        self.stations = active;
                        self.record_success(now, &mut events);
                    }
                }
            }
        }

        events
    }

    fn observe_home(&mut self, snapshot: StationSnapshot, now: DateTime<Utc>, events: &mut Vec<BridgeEvent>) {
        self.discover(&snapshot.identity, events);
        if self.location_id.is_none() {
            self.location_id = snapshot.identity.location_id;
        }
        self.state.identity = Some(snapshot.identity.clone());
        self.record_success(now, events);

        let opened_before = self.tracker.open().map(|session| session.session_id);

        if let Some(finished) = self.tracker.on_reading(self.debouncer.confirmed(), &snapshot) {
            self.finish_session(finished, events);
        }

        let terminal = snapshot.vendor_status.is_terminal();
        if let Some(transition) = self.debouncer.observe(snapshot.status(), terminal, snapshot.read_at) {
            tracing::info!(
                "Station {} status {} -> {}",
                snapshot.station_id(),
                transition.from,
                transition.to
            );
            events.push(BridgeEvent::StatusChanged {
                station_id: snapshot.station_id(),
                transition,
            });
            if let Some(finished) = self.tracker.on_transition(&transition, &snapshot) {
                self.finish_session(finished, events);
            }
        }

        let opened_now = self.tracker.open();
        if let Some(session) = opened_now.filter(|session| Some(session.session_id) != opened_before) {
            events.push(BridgeEvent::SessionStarted {
                session: session.clone(),
            });
        }

        self.state.entity.status = self.debouncer.confirmed();
        self.state.current_session = self.tracker.open().cloned();
        self.state.snapshot = Some(snapshot);
    }

    fn discover(&mut self, identity: &StationIdentity, events: &mut Vec<BridgeEvent>) {
        if self.known.insert(identity.station_id) {
            tracing::info!("Discovered station {} ({:?})", identity.station_id, identity.code);
            events.push(BridgeEvent::StationDiscovered {
                identity: identity.clone(),
            });
        }
    }

    fn finish_session(&mut self, finished: SessionRecord, events: &mut Vec<BridgeEvent>) {
        self.state.last_session = Some(finished.clone());
        events.push(BridgeEvent::SessionFinished { session: finished });
    }

    fn record_success(&mut self, now: DateTime<Utc>, events: &mut Vec<BridgeEvent>) {
        if self.state.entity.stale {
            tracing::info!(
                "Gateway data fresh again after {} missed cycles",
                self.state.consecutive_failures
            );
            events.push(BridgeEvent::Recovered);
        }
        self.state.entity.stale = false;
        self.state.consecutive_failures = 0;
        self.state.last_successful_poll = Some(now);
    }

    fn record_miss(&mut self, events: &mut Vec<BridgeEvent>) {
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
        if !self.state.entity.stale && self.state.consecutive_failures >= self.config.stale_threshold {
            tracing::warn!(
                "No fresh data for {} consecutive cycles, marking state stale",
                self.state.consecutive_failures
            );
            self.state.entity.stale = true;
            events.push(BridgeEvent::BecameStale {
                consecutive_failures: self.state.consecutive_failures,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VendorStatus;
    use chrono::{Duration, TimeZone};

    const HOME_CODE: &str = "IS*ONP12345";

    fn poll(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 3, 18, 0, 0).unwrap() + Duration::seconds(30 * n)
    }

    fn home(n: i64, status: VendorStatus, energy: f64, cost: Option<f64>) -> StationSnapshot {
        let snapshot = StationSnapshot::new(
            StationIdentity::new(StationId(1)).with_code(HOME_CODE).with_label("Garage"),
            status,
            poll(n),
        )
        .with_measurements(if status == VendorStatus::Charging { 7.4 } else { 0.0 }, energy);
        match cost {
            Some(cost) => snapshot.with_cost(cost),
            None => snapshot,
        }
    }

    fn neighbour(id: u64, status: VendorStatus) -> StationSnapshot {
        StationSnapshot::new(
            StationIdentity::new(StationId(id)).with_code(format!("IS*ONP{:05}", id)),
            status,
            poll(0),
        )
    }

    fn home_reconciler() -> Reconciler {
        Reconciler::new(ReconcileConfig {
            configured_code: Some(HOME_CODE.into()),
            ..ReconcileConfig::default()
        })
    }

    fn listed(n: i64, reconciler: &mut Reconciler, stations: Vec<StationSnapshot>) -> Vec<BridgeEvent> {
        reconciler.apply(PollOutcome::Listed(stations), poll(n))
    }

    fn failed(n: i64, reconciler: &mut Reconciler) -> Vec<BridgeEvent> {
        reconciler.apply(
            PollOutcome::Failed {
                reason: "connection refused".into(),
            },
            poll(n),
        )
    }

    #[test]
    fn test_full_session_scenario() {
        let mut reconciler = home_reconciler();

        let events = listed(1, &mut reconciler, vec![home(1, VendorStatus::Available, 0.0, None)]);
        assert!(matches!(events[0], BridgeEvent::StationDiscovered { .. }));
        assert_eq!(reconciler.state().entity.status, ChargerStatus::Available);
        assert!(reconciler.state().last_session.is_none());

        listed(2, &mut reconciler, vec![home(2, VendorStatus::Charging, 0.5, None)]);
        assert_eq!(reconciler.state().entity.status, ChargerStatus::Available);
        assert!(reconciler.state().current_session.is_none());

        let events = listed(3, &mut reconciler, vec![home(3, VendorStatus::Charging, 0.9, None)]);
        assert!(events.iter().any(|e| matches!(e, BridgeEvent::SessionStarted { .. })));
        let open = reconciler.state().current_session.clone().expect("Session should be open");
        assert_eq!(open.started_at, poll(2));
        assert_eq!(reconciler.state().entity.status, ChargerStatus::Charging);

        for n in 4..10 {
            listed(n, &mut reconciler, vec![home(n, VendorStatus::Charging, n as f64 * 0.8, Some(n as f64 * 25.0))]);
        }

        listed(10, &mut reconciler, vec![home(10, VendorStatus::Available, 7.3, Some(210.0))]);
        assert!(reconciler.state().last_session.is_none());

        let events = listed(11, &mut reconciler, vec![home(11, VendorStatus::Available, 0.0, None)]);
        let finished = events
            .iter()
            .find_map(|event| match event {
                BridgeEvent::SessionFinished { session } => Some(session.clone()),
                _ => None,
            })
            .expect("Session should be finalized");

        assert_eq!(finished.session_id, open.session_id);
        assert_eq!(finished.energy_kwh, 7.3);
        assert_eq!(finished.cost, Some(210.0));
        assert_eq!(finished.ended_at, Some(poll(10)));
        assert_eq!(finished.duration(poll(40)), poll(10) - poll(2));
        assert_eq!(reconciler.state().last_session.as_ref(), Some(&finished));
        assert!(reconciler.state().current_session.is_none());
    }

    #[test]
    fn test_single_poll_flicker_does_not_touch_sessions() {
        let mut reconciler = home_reconciler();
        listed(1, &mut reconciler, vec![home(1, VendorStatus::Charging, 1.0, None)]);
        let session_id = reconciler.state().current_session.as_ref().unwrap().session_id;

        listed(2, &mut reconciler, vec![home(2, VendorStatus::Available, 0.0, None)]);
        listed(3, &mut reconciler, vec![home(3, VendorStatus::Charging, 1.5, None)]);

        assert!(reconciler.state().last_session.is_none());
        assert_eq!(reconciler.state().current_session.as_ref().unwrap().session_id, session_id);
        assert_eq!(reconciler.state().entity.status, ChargerStatus::Charging);
    }

    #[test]
    fn test_omitted_home_keeps_identity_and_history() {
        let mut reconciler = home_reconciler();
        listed(1, &mut reconciler, vec![home(1, VendorStatus::Charging, 0.2, None)]);
        listed(2, &mut reconciler, vec![home(2, VendorStatus::Finishing, 5.0, Some(150.0))]);
        let last = reconciler.state().last_session.clone().expect("Finishing is terminal");

        for n in 3..20 {
            listed(n, &mut reconciler, vec![neighbour(9, VendorStatus::Charging)]);
            assert_eq!(reconciler.home_identity().map(|i| i.station_id), Some(StationId(1)));
            assert_eq!(reconciler.state().last_session.as_ref(), Some(&last));
        }
        assert!(reconciler.state().entity.stale);
        assert_eq!(reconciler.state().entity.status, ChargerStatus::Preparing);
        assert!(reconciler.snapshot().stations.is_empty());
    }

    #[test]
    fn test_no_code_with_idle_stations_surfaces_nothing() {
        let mut reconciler = Reconciler::new(ReconcileConfig::default());
        let events = listed(
            1,
            &mut reconciler,
            vec![neighbour(1, VendorStatus::Available), neighbour(2, VendorStatus::Available)],
        );

        assert!(events.is_empty());
        let snapshot = reconciler.snapshot();
        assert!(snapshot.stations.is_empty());
        assert_eq!(snapshot.home.entity.status, ChargerStatus::Unknown);
        assert!(snapshot.home.identity.is_none());
        assert!(snapshot.target(None).is_none());
        assert!(snapshot.target(Some(StationId(1))).is_none());
    }

    #[test]
    fn test_no_code_surfaces_active_stations() {
        let mut reconciler = Reconciler::new(ReconcileConfig::default());
        let events = listed(
            1,
            &mut reconciler,
            vec![neighbour(1, VendorStatus::Available), neighbour(2, VendorStatus::Charging)],
        );
        assert_eq!(events.len(), 1);

        let snapshot = reconciler.snapshot();
        assert_eq!(snapshot.active_count, 1);
        assert_eq!(snapshot.target(None).map(|i| i.station_id), Some(StationId(2)));
        assert_eq!(snapshot.status_of(StationId(2)), ChargerStatus::Charging);
        assert_eq!(snapshot.status_of(StationId(1)), ChargerStatus::Available);
        assert_eq!(snapshot.home.entity.status, ChargerStatus::Unknown);

        // Seen before: no second discovery.
        assert!(listed(2, &mut reconciler, vec![neighbour(2, VendorStatus::Charging)]).is_empty());
    }

    #[test]
    fn test_staleness_after_threshold_and_recovery() {
        let mut reconciler = home_reconciler();
        listed(0, &mut reconciler, vec![home(0, VendorStatus::Charging, 0.1, None)]);
        listed(1, &mut reconciler, vec![home(1, VendorStatus::Available, 6.0, Some(99.0))]);
        listed(2, &mut reconciler, vec![home(2, VendorStatus::Available, 0.0, None)]);
        let last = reconciler.state().last_session.clone().expect("Session should be finalized");

        let mut stale_events = 0;
        for n in 3..8 {
            let events = failed(n, &mut reconciler);
            stale_events += events
                .iter()
                .filter(|e| matches!(e, BridgeEvent::BecameStale { .. }))
                .count();
            let state = reconciler.state();
            assert_eq!(state.entity.stale, n >= 5);
            assert_eq!(state.last_session.as_ref(), Some(&last));
            assert_eq!(state.last_successful_poll, Some(poll(2)));
        }
        assert_eq!(stale_events, 1);
        assert_eq!(reconciler.state().consecutive_failures, 5);
        assert_eq!(reconciler.state().entity.display(), "available-stale");
        assert_eq!(reconciler.snapshot().status_of(StationId(1)), ChargerStatus::Unknown);
        assert!(reconciler.state().snapshot.is_some());

        let events = listed(8, &mut reconciler, vec![home(8, VendorStatus::Preparing, 0.0, None)]);
        assert!(events.contains(&BridgeEvent::Recovered));
        let state = reconciler.state();
        assert!(!state.entity.stale);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.snapshot.as_ref().map(|s| s.vendor_status), Some(VendorStatus::Preparing));
        assert_eq!(state.last_successful_poll, Some(poll(8)));
        assert_eq!(state.last_session.as_ref(), Some(&last));
    }

    #[test]
    fn test_failures_never_open_or_close_sessions() {
        let mut reconciler = home_reconciler();
        listed(0, &mut reconciler, vec![home(0, VendorStatus::Charging, 0.3, None)]);
        let open = reconciler.state().current_session.clone().unwrap();

        for n in 1..10 {
            let events = failed(n, &mut reconciler);
            assert!(!events.iter().any(|e| matches!(
                e,
                BridgeEvent::SessionFinished { .. } | BridgeEvent::SessionStarted { .. }
            )));
        }
        listed(10, &mut reconciler, vec![home(10, VendorStatus::Other, 0.0, None)]);
        assert_eq!(reconciler.state().current_session.as_ref(), Some(&open));
        assert_eq!(reconciler.state().entity.status, ChargerStatus::Charging);
    }

    #[test]
    fn test_sessions_are_monotonic() {
        let mut reconciler = home_reconciler();
        let mut previous_end = None;
        let mut n = 0;
        for _ in 0..3 {
            for status in [VendorStatus::Charging, VendorStatus::Charging, VendorStatus::Available, VendorStatus::Available] {
                n += 1;
                let energy = if status == VendorStatus::Charging { 2.0 } else { 0.0 };
                let events = listed(n, &mut reconciler, vec![home(n, status, energy, None)]);
                for event in events {
                    if let BridgeEvent::SessionFinished { session } = event {
                        if let Some(end) = previous_end {
                            assert!(session.started_at >= end);
                        }
                        assert!(session.ended_at.unwrap() >= session.started_at);
                        previous_end = session.ended_at;
                    }
                }
            }
        }
        assert!(previous_end.is_some());
    }

    #[test]
    fn test_restore_resumes_open_session() {
        let mut reconciler = home_reconciler();
        listed(1, &mut reconciler, vec![home(1, VendorStatus::Charging, 0.4, None)]);
        reconciler.set_location_id(281);
        let persisted = reconciler.persisted();
        assert_eq!(persisted.location_id, Some(281));
        assert_eq!(persisted.identity.as_ref().and_then(|i| i.location_id), Some(281));
        let open = persisted.open_session.clone().unwrap();

        let mut restored = Reconciler::restore(reconciler.config().clone(), persisted);
        assert_eq!(restored.location_id(), Some(281));
        assert_eq!(restored.home_identity().map(|i| i.station_id), Some(StationId(1)));

        listed(5, &mut restored, vec![home(5, VendorStatus::Charging, 3.0, None)]);
        assert_eq!(restored.state().current_session.as_ref().map(|s| s.session_id), Some(open.session_id));

        listed(6, &mut restored, vec![home(6, VendorStatus::Available, 0.0, None)]);
        listed(7, &mut restored, vec![home(7, VendorStatus::Available, 0.0, None)]);
        let finished = restored.state().last_session.clone().expect("Session should be finalized");
        assert_eq!(finished.session_id, open.session_id);
        assert_eq!(finished.energy_kwh, 3.0);
        assert_eq!(finished.ended_at, Some(poll(6)));
    }

    #[test]
    fn test_passive_home_report_does_not_end_running_session() {
        let mut reconciler = home_reconciler();
        listed(1, &mut reconciler, vec![home(1, VendorStatus::Charging, 0.5, None)]);
        listed(2, &mut reconciler, vec![home(2, VendorStatus::Charging, 5.0, None)]);
        let session_id = reconciler.state().current_session.as_ref().unwrap().session_id;

        // Live listing omitted the station; only the location detail reported it.
        let passive = StationSnapshot::new(
            StationIdentity::new(StationId(1)).with_code(HOME_CODE),
            VendorStatus::Charging,
            poll(3),
        )
        .passive();
        let events = listed(3, &mut reconciler, vec![passive]);
        assert!(!events.iter().any(|e| matches!(e, BridgeEvent::SessionFinished { .. })));
        assert!(!events.iter().any(|e| matches!(e, BridgeEvent::SessionStarted { .. })));

        listed(4, &mut reconciler, vec![home(4, VendorStatus::Charging, 5.6, None)]);
        let state = reconciler.state();
        assert!(state.last_session.is_none());
        let current = state.current_session.as_ref().unwrap();
        assert_eq!(current.session_id, session_id);
        assert_eq!(current.energy_kwh, 5.6);
    }

    #[test]
    fn test_restore_under_new_code_forgets_old_home() {
        let mut old_home = Reconciler::new(ReconcileConfig {
            configured_code: Some("IS*OLD".into()),
            debounce_polls: 1,
            ..ReconcileConfig::default()
        });
        let old_station = StationSnapshot::new(
            StationIdentity::new(StationId(5)).with_code("IS*OLD"),
            VendorStatus::Charging,
            poll(1),
        )
        .with_measurements(7.4, 1.2);
        listed(1, &mut old_home, vec![old_station.clone()]);
        old_home.set_location_id(99);
        let persisted = old_home.persisted();
        assert_eq!(persisted.evse_code.as_deref(), Some("IS*OLD"));
        assert!(persisted.open_session.is_some());

        let mut restored = Reconciler::restore(
            ReconcileConfig {
                configured_code: Some("IS*NEW".into()),
                ..ReconcileConfig::default()
            },
            persisted,
        );
        assert!(restored.home_identity().is_none());
        assert_eq!(restored.location_id(), None);
        assert!(restored.state().current_session.is_none());
        assert!(restored.state().last_session.is_none());

        listed(2, &mut restored, vec![old_station]);
        assert!(restored.home_identity().is_none());
        assert_eq!(restored.state().entity.status, ChargerStatus::Unknown);
        assert!(restored.snapshot().target(None).is_none());
        assert!(restored.snapshot().target(Some(StationId(5))).is_none());
    }
}
