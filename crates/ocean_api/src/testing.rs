use async_trait::async_trait;
use axum::response::Response;
use chrono::Utc;
use etrel_ocean::{AppState, BridgeConfig};
use ocean_core::{
    BridgeSnapshot, PollOutcome, ReconcileConfig, Reconciler, StationId, StationIdentity, StationSnapshot,
    VendorStatus,
};
use ocean_engine::{CommandAck, CommandDispatcher, CommandSettings, Gateway, GatewayResult, SessionReport};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;

pub const HOME_CODE: &str = "IS*ONP00281-3806-1-1";

/// Gateway that acks every command and can publish a prepared snapshot when commanded.
#[derive(Default)]
pub struct StubGateway {
    pub refusal: Mutex<Option<String>>,
    pub commands: AtomicUsize,
    publish: Mutex<Option<(watch::Sender<BridgeSnapshot>, BridgeSnapshot)>>,
}

impl StubGateway {
    pub fn refusing(reason: &str) -> Self {
        StubGateway {
            refusal: Mutex::new(Some(reason.to_string())),
            ..StubGateway::default()
        }
    }

    pub fn publish_on_command(&self, sender: watch::Sender<BridgeSnapshot>, next: BridgeSnapshot) {
        *self.publish.lock().unwrap() = Some((sender, next));
    }

    fn command(&self) -> GatewayResult<CommandAck> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        if let Some((sender, next)) = self.publish.lock().unwrap().as_ref() {
            sender.send_replace(next.clone());
        }
        Ok(match self.refusal.lock().unwrap().clone() {
            Some(reason) => CommandAck::rejected(reason),
            None => CommandAck::accepted(),
        })
    }
}

#[async_trait]
impl Gateway for StubGateway {
    async fn authenticate(&self) -> GatewayResult<()> {
        Ok(())
    }

    async fn list_stations(&self) -> GatewayResult<Vec<StationSnapshot>> {
        Ok(Vec::new())
    }

    async fn location_stations(&self, _location_id: u64) -> GatewayResult<Vec<StationSnapshot>> {
        Ok(Vec::new())
    }

    async fn lookup_code(&self, _code: &str) -> GatewayResult<Option<SessionReport>> {
        Ok(None)
    }

    async fn start(&self, _station: &StationIdentity) -> GatewayResult<CommandAck> {
        self.command()
    }

    async fn stop(&self, _station: &StationIdentity) -> GatewayResult<CommandAck> {
        self.command()
    }
}

pub fn home(status: VendorStatus, energy: f64) -> StationSnapshot {
    let power = if status == VendorStatus::Charging { 7.4 } else { 0.0 };
    StationSnapshot::new(
        StationIdentity::new(StationId(9021)).with_code(HOME_CODE).with_label("Home (IS*ONP00281)"),
        status,
        Utc::now(),
    )
    .with_measurements(power, energy)
}

pub fn home_reconciler(status: VendorStatus) -> Reconciler {
    let mut reconciler = Reconciler::new(ReconcileConfig {
        configured_code: Some(HOME_CODE.into()),
        debounce_polls: 1,
        ..ReconcileConfig::default()
    });
    reconciler.apply(PollOutcome::Listed(vec![home(status, 0.0)]), Utc::now());
    reconciler
}

/// Apply one more poll reporting `status` and return the resulting snapshot.
pub fn advance(reconciler: &mut Reconciler, status: VendorStatus) -> BridgeSnapshot {
    reconciler.apply(PollOutcome::Listed(vec![home(status, 2.0)]), Utc::now());
    reconciler.snapshot()
}

pub fn app_state(gateway: Arc<StubGateway>, reconciler: &Reconciler) -> (AppState, watch::Sender<BridgeSnapshot>) {
    app_state_with(gateway, reconciler, CommandSettings::default())
}

pub fn app_state_with(
    gateway: Arc<StubGateway>,
    reconciler: &Reconciler,
    settings: CommandSettings,
) -> (AppState, watch::Sender<BridgeSnapshot>) {
    let (state_tx, state_rx) = watch::channel(reconciler.snapshot());
    let dispatcher = CommandDispatcher::new(gateway, state_rx.clone(), settings);
    (AppState::new(BridgeConfig::default(), state_rx, dispatcher), state_tx)
}

pub async fn body_json<T: DeserializeOwned>(response: Response) -> T {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}
