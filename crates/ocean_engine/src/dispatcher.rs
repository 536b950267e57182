use ocean_core::{BridgeSnapshot, ChargerStatus, StationId, StationIdentity};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::gateway::{CommandAck, Gateway, GatewayResult, with_timeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Start,
    Stop,
}

impl CommandKind {
    /// Whether `now` is the state this command asked for, given the status it was sent from.
    pub fn is_satisfied(self, before: ChargerStatus, now: ChargerStatus) -> bool {
        match self {
            CommandKind::Start => {
                now == ChargerStatus::Charging
                    || (now == ChargerStatus::Preparing && before != ChargerStatus::Preparing)
            }
            CommandKind::Stop => {
                now == ChargerStatus::Available
                    || (now == ChargerStatus::Preparing && before == ChargerStatus::Charging)
            }
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Start => write!(f, "start"),
            CommandKind::Stop => write!(f, "stop"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    UnknownTarget,
    CommandInProgress,
    /// The vendor refused the command synchronously.
    Gateway(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::UnknownTarget => write!(f, "unknown target"),
            RejectReason::CommandInProgress => write!(f, "command in progress"),
            RejectReason::Gateway(reason) => write!(f, "{}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// A later poll showed the requested state.
    Confirmed,
    /// Sent, but never observed within the confirmation window.
    TimedOut,
    Rejected(RejectReason),
}

#[derive(Debug, Clone)]
pub struct CommandSettings {
    pub call_timeout: Duration,
    pub confirm_timeout: Duration,
    /// Extra sends after an unconfirmed attempt.
    pub retries: u32,
}

impl Default for CommandSettings {
    fn default() -> Self {
        CommandSettings {
            call_timeout: Duration::from_secs(10),
            confirm_timeout: Duration::from_secs(120),
            retries: 1,
        }
    }
}

/// Sends start/stop commands and waits for the poller to observe their effect.
///
/// At most one command is in flight across all clones.
#[derive(Clone)]
pub struct CommandDispatcher {
    gateway: Arc<dyn Gateway>,
    state: watch::Receiver<BridgeSnapshot>,
    in_flight: Arc<Mutex<()>>,
    settings: CommandSettings,
}

impl CommandDispatcher {
    pub fn new(gateway: Arc<dyn Gateway>, state: watch::Receiver<BridgeSnapshot>, settings: CommandSettings) -> Self {
        CommandDispatcher {
            gateway,
            state,
            in_flight: Arc::new(Mutex::new(())),
            settings,
        }
    }

    /// `station` defaults to the home charger.
    pub async fn start(&self, station: Option<StationId>) -> CommandOutcome {
        self.dispatch(CommandKind::Start, station).await
    }

    pub async fn stop(&self, station: Option<StationId>) -> CommandOutcome {
        self.dispatch(CommandKind::Stop, station).await
    }

    pub async fn dispatch(&self, kind: CommandKind, station: Option<StationId>) -> CommandOutcome {
        let (target, before) = {
            let snapshot = self.state.borrow();
            match snapshot.target(station) {
                Some(identity) => (identity.clone(), snapshot.status_of(identity.station_id)),
                None => {
                    info!("Refusing {} for {:?}: not a resolved station", kind, station);
                    return CommandOutcome::Rejected(RejectReason::UnknownTarget);
                }
            }
        };

        let Ok(_guard) = self.in_flight.try_lock() else {
            info!("Refusing {} on station {}: another command is pending", kind, target.station_id);
            return CommandOutcome::Rejected(RejectReason::CommandInProgress);
        };

        let mut state = self.state.clone();
        for attempt in 0..=self.settings.retries {
            let sent_generation = state.borrow_and_update().generation;
            info!("Sending {} to station {} (attempt {})", kind, target.station_id, attempt + 1);

            match self.send(kind, &target).await {
                Ok(ack) if !ack.accepted => {
                    let reason = ack.reason.unwrap_or_else(|| "rejected by vendor".to_string());
                    warn!("Vendor rejected {} on station {}: {}", kind, target.station_id, reason);
                    return CommandOutcome::Rejected(RejectReason::Gateway(reason));
                }
                Ok(_) => debug!("Vendor accepted {}", kind),
                // The command may still have reached the charger.
                Err(err) => warn!("Sending {} failed, waiting for its effect anyway: {}", kind, err),
            }

            if self
                .await_confirmation(kind, target.station_id, before, sent_generation, &mut state)
                .await
            {
                info!("{} confirmed on station {}", kind, target.station_id);
                return CommandOutcome::Confirmed;
            }
        }

        warn!("{} on station {} was not confirmed", kind, target.station_id);
        CommandOutcome::TimedOut
    }

    async fn send(&self, kind: CommandKind, target: &StationIdentity) -> GatewayResult<CommandAck> {
        let call = match kind {
            CommandKind::Start => self.gateway.start(target),
            CommandKind::Stop => self.gateway.stop(target),
        };
        with_timeout(self.settings.call_timeout, call).await
    }

    /// Only snapshots published after the send count.
    async fn await_confirmation(
        &self,
        kind: CommandKind,
        station_id: StationId,
        before: ChargerStatus,
        sent_generation: u64,
        state: &mut watch::Receiver<BridgeSnapshot>,
    ) -> bool {
        let observed = tokio::time::timeout(
            self.settings.confirm_timeout,
            state.wait_for(|snapshot| {
                snapshot.generation > sent_generation && kind.is_satisfied(before, snapshot.status_of(station_id))
            }),
        )
        .await;
        matches!(observed, Ok(Ok(_)))
    }
}
