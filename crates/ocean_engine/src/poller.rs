use chrono::Utc;
use ocean_core::{
    BridgeEvent, BridgeSnapshot, ChargerStatus, PersistedState, PollOutcome, Reconciler, StationSnapshot,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::gateway::{Gateway, with_timeout};
use crate::store::StateStore;

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub call_timeout: Duration,
    /// Upper bound of the delay between cycles while the gateway is failing.
    pub max_backoff: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            interval: Duration::from_secs(30),
            call_timeout: Duration::from_secs(10),
            max_backoff: Duration::from_secs(300),
        }
    }
}

/// Delay before the next cycle after `failures` consecutive gateway failures.
pub fn backoff_delay(settings: &PollSettings, failures: u32) -> Duration {
    if failures == 0 {
        return settings.interval;
    }
    let factor = 1u32 << (failures - 1).min(16);
    settings
        .interval
        .saturating_mul(factor)
        .min(settings.max_backoff.max(settings.interval))
}

/// Single writer of the bridge state.
pub struct Poller {
    gateway: Arc<dyn Gateway>,
    store: Arc<dyn StateStore>,
    reconciler: Reconciler,
    settings: PollSettings,
    state_tx: watch::Sender<BridgeSnapshot>,
    events_tx: broadcast::Sender<BridgeEvent>,
    last_saved: PersistedState,
    gateway_failures: u32,
    lookup_pending: bool,
}

impl Poller {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        store: Arc<dyn StateStore>,
        reconciler: Reconciler,
        settings: PollSettings,
        state_tx: watch::Sender<BridgeSnapshot>,
        events_tx: broadcast::Sender<BridgeEvent>,
    ) -> Self {
        let last_saved = reconciler.persisted();
        Poller {
            gateway,
            store,
            reconciler,
            settings,
            state_tx,
            events_tx,
            last_saved,
            gateway_failures: 0,
            lookup_pending: false,
        }
    }

    /// Retry the code lookup on the next cycles until the gateway answers it.
    pub fn with_lookup_pending(mut self, pending: bool) -> Self {
        self.lookup_pending = pending;
        self
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn next_delay(&self) -> Duration {
        backoff_delay(&self.settings, self.gateway_failures)
    }

    /// Run one fetch-reconcile-publish cycle. A cycle never outlasts the poll interval.
    pub async fn cycle(&mut self) -> Vec<BridgeEvent> {
        let deadline = Instant::now() + self.settings.interval;
        let outcome = self.fetch(deadline).await;

        match &outcome {
            PollOutcome::Failed { .. } => self.gateway_failures = self.gateway_failures.saturating_add(1),
            PollOutcome::Listed(_) => self.gateway_failures = 0,
        }

        let events = self.reconciler.apply(outcome, Utc::now());
        debug!("Poll cycle done, {} events", events.len());
        self.publish(&events);
        self.persist().await;
        events
    }

    /// Poll until `shutdown` flips to true or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Polling every {:?}", self.settings.interval);
        loop {
            if *shutdown.borrow() {
                break;
            }
            let delay = self.next_delay();
            if delay > self.settings.interval {
                debug!("Backing off for {:?} after {} failures", delay, self.gateway_failures);
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
            self.cycle().await;
        }
        self.persist().await;
        info!("Polling stopped");
    }

    /// Timeout of the next gateway call, cut short by the cycle deadline.
    /// `None` once the cycle has no time left.
    fn call_budget(&self, deadline: Instant) -> Option<Duration> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        (!remaining.is_zero()).then(|| remaining.min(self.settings.call_timeout))
    }

    /// The listing decides the cycle. The calls after it only add detail and
    /// are cut short or skipped once the deadline nears.
    async fn fetch(&mut self, deadline: Instant) -> PollOutcome {
        let gateway = self.gateway.clone();

        let limit = self.settings.call_timeout.min(self.settings.interval);
        let mut listing = match with_timeout(limit, gateway.list_stations()).await {
            Ok(listing) => listing,
            Err(err) => {
                return PollOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        };

        let Some(code) = self.reconciler.config().configured_code.clone() else {
            return PollOutcome::Listed(listing);
        };

        if self.lookup_pending && self.reconciler.location_id().is_none() {
            match self.call_budget(deadline) {
                Some(limit) => self.retry_lookup(limit, &code).await,
                None => debug!("Cycle budget spent, code lookup deferred"),
            }
        }

        if let Some(location_id) = self.reconciler.location_id() {
            match self.call_budget(deadline) {
                Some(limit) => match with_timeout(limit, gateway.location_stations(location_id)).await {
                    Ok(detail) => merge_location(&mut listing, detail),
                    Err(err) => warn!("Error reading location {}: {}", location_id, err),
                },
                None => debug!("Cycle budget spent, skipping location {}", location_id),
            }
        }

        self.enrich_home(&mut listing, &code, deadline).await;
        PollOutcome::Listed(listing)
    }

    async fn retry_lookup(&mut self, limit: Duration, code: &str) {
        match with_timeout(limit, self.gateway.lookup_code(code)).await {
            Ok(report) => {
                self.lookup_pending = false;
                match report.and_then(|report| report.location_id) {
                    Some(location_id) => {
                        info!("Code {} belongs to location {}", code, location_id);
                        self.reconciler.set_location_id(location_id);
                    }
                    None => warn!("Vendor has no location for code {}", code),
                }
            }
            Err(err) => debug!("Code lookup still failing: {}", err),
        }
    }

    /// Fill in session totals of the home station while it is charging.
    async fn enrich_home(&self, listing: &mut [StationSnapshot], code: &str, deadline: Instant) {
        let home_id = self.reconciler.home_identity().map(|identity| identity.station_id);
        let Some(home) = listing.iter_mut().find(|station| {
            station.identity.matches_code(code) || Some(station.station_id()) == home_id
        }) else {
            return;
        };
        if home.status() != ChargerStatus::Charging {
            return;
        }
        let Some(limit) = self.call_budget(deadline) else {
            debug!("Cycle budget spent, no session totals for {}", code);
            return;
        };

        match with_timeout(limit, self.gateway.lookup_code(code)).await {
            Ok(Some(report)) => {
                if let Some(cost) = report.cumulative_cost.filter(|cost| *cost >= 0.0) {
                    home.session_cost = Some(cost);
                }
                if home.energy_kwh <= 0.0 {
                    if let Some(energy) = report.cumulative_energy_kwh.filter(|energy| *energy > 0.0) {
                        home.energy_kwh = energy;
                    }
                }
            }
            Ok(None) => debug!("No session data for {}", code),
            Err(err) => warn!("Error reading session data for {}: {}", code, err),
        }
    }

    fn publish(&self, events: &[BridgeEvent]) {
        self.state_tx.send_replace(self.reconciler.snapshot());
        for event in events {
            // No subscribers is fine.
            let _ = self.events_tx.send(event.clone());
        }
    }

    async fn persist(&mut self) {
        let persisted = self.reconciler.persisted();
        if persisted == self.last_saved {
            return;
        }
        match self.store.save(&persisted).await {
            Ok(()) => self.last_saved = persisted,
            Err(err) => warn!("Error saving bridge state: {}", err),
        }
    }
}

/// Add idle connectors of the home location. Live entries win on duplicate ids.
fn merge_location(listing: &mut Vec<StationSnapshot>, detail: Vec<StationSnapshot>) {
    for station in detail {
        if !listing.iter().any(|live| live.station_id() == station.station_id()) {
            listing.push(station);
        }
    }
}
