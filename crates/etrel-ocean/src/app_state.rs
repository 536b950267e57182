use ocean_core::BridgeSnapshot;
use ocean_engine::{Bridge, CommandDispatcher};
use tokio::sync::watch;

use crate::config::BridgeConfig;

/// Shared state handed to the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The configuration loaded at startup (immutable)
    pub config: BridgeConfig,
    state: watch::Receiver<BridgeSnapshot>,
    dispatcher: CommandDispatcher,
}

impl AppState {
    pub fn new(config: BridgeConfig, state: watch::Receiver<BridgeSnapshot>, dispatcher: CommandDispatcher) -> Self {
        Self {
            config,
            state,
            dispatcher,
        }
    }

    pub fn from_bridge(config: BridgeConfig, bridge: &Bridge) -> Self {
        Self::new(config, bridge.state(), bridge.dispatcher())
    }

    /// Latest published snapshot. Never waits on the poller.
    pub fn snapshot(&self) -> BridgeSnapshot {
        self.state.borrow().clone()
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }
}
