//! Runtime around `ocean_core`: the polling loop, command dispatch and
//! persistence, all talking to the vendor through the [`Gateway`] trait.

mod dispatcher;
mod gateway;
mod poller;
mod store;

pub use crate::dispatcher::{CommandDispatcher, CommandKind, CommandOutcome, CommandSettings, RejectReason};
pub use crate::gateway::{CommandAck, Gateway, GatewayError, GatewayResult, SessionReport, with_timeout};
pub use crate::poller::{PollSettings, Poller, backoff_delay};
pub use crate::store::{JsonFileStore, MemoryStore, StateStore, StoreError};

use ocean_core::{BridgeEvent, BridgeSnapshot, ReconcileConfig, Reconciler};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const EVENT_CAPACITY: usize = 64;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Unknown EVSE code '{0}'")]
    UnknownEvseCode(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub reconcile: ReconcileConfig,
    pub poll: PollSettings,
    pub command: CommandSettings,
}

impl EngineSettings {
    pub fn call_timeout(&self) -> Duration {
        self.poll.call_timeout
    }
}

/// A running bridge: one background poller plus the handles to read and command it.
pub struct Bridge {
    state: watch::Receiver<BridgeSnapshot>,
    events: broadcast::Sender<BridgeEvent>,
    dispatcher: CommandDispatcher,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Bridge {
    /// Validate credentials and the configured code, restore persisted state,
    /// run the first refresh and start polling.
    ///
    /// An unreachable gateway is not fatal: the bridge starts without data and
    /// keeps retrying. Rejected credentials and unknown codes are.
    pub async fn start(
        settings: EngineSettings,
        gateway: Arc<dyn Gateway>,
        store: Arc<dyn StateStore>,
    ) -> Result<Bridge, SetupError> {
        let call_timeout = settings.call_timeout();

        match with_timeout(call_timeout, gateway.authenticate()).await {
            Ok(()) => info!("Authenticated with the vendor platform"),
            Err(GatewayError::AuthRejected) => return Err(SetupError::InvalidCredentials),
            Err(err) => warn!("Vendor platform unreachable during setup: {}", err),
        }

        let persisted = match store.load().await {
            Ok(persisted) => persisted.unwrap_or_default(),
            Err(err) => {
                warn!("Ignoring unreadable persisted state: {}", err);
                Default::default()
            }
        };
        let mut reconciler = Reconciler::restore(settings.reconcile.clone(), persisted);

        let mut lookup_pending = false;
        if let Some(code) = reconciler.config().configured_code.clone() {
            if reconciler.location_id().is_none() {
                match with_timeout(call_timeout, gateway.lookup_code(&code)).await {
                    Ok(Some(report)) => {
                        if let Some(location_id) = report.location_id {
                            info!("Code {} belongs to location {}", code, location_id);
                            reconciler.set_location_id(location_id);
                        }
                    }
                    Ok(None) => return Err(SetupError::UnknownEvseCode(code)),
                    Err(GatewayError::AuthRejected) => return Err(SetupError::InvalidCredentials),
                    Err(err) => {
                        warn!("Could not look up code {} yet: {}", code, err);
                        lookup_pending = true;
                    }
                }
            }
        }

        let (state_tx, state_rx) = watch::channel(reconciler.snapshot());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let mut poller = Poller::new(
            gateway.clone(),
            store,
            reconciler,
            settings.poll.clone(),
            state_tx,
            events_tx.clone(),
        )
        .with_lookup_pending(lookup_pending);

        poller.cycle().await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(poller.run(shutdown_rx));
        let dispatcher = CommandDispatcher::new(gateway, state_rx.clone(), settings.command);

        Ok(Bridge {
            state: state_rx,
            events: events_tx,
            dispatcher,
            shutdown: shutdown_tx,
            task,
        })
    }

    pub fn state(&self) -> watch::Receiver<BridgeSnapshot> {
        self.state.clone()
    }

    pub fn current(&self) -> BridgeSnapshot {
        self.state.borrow().clone()
    }

    /// Events published after this call. Earlier ones are reflected in [`Bridge::current`].
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    pub fn dispatcher(&self) -> CommandDispatcher {
        self.dispatcher.clone()
    }

    /// Stop polling and persist the final state.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!("Poller task ended abnormally: {}", err);
        }
    }
}
