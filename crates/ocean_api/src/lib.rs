//! OCEAN bridge API Library
//!
//! HTTP surface of the bridge: charger state, last session and start/stop commands.

mod charger;
mod command;
#[cfg(test)]
mod testing;

use axum::{
    Router,
    routing::{get, post},
};
use etrel_ocean::AppState;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

pub use crate::charger::{ChargerView, LastSessionView};
pub use crate::command::{CommandRequest, CommandResponse};

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Create the application router with all endpoints
pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/charger", get(charger::get_charger))
        .route("/charger/last-session", get(charger::get_last_session))
        .route("/charger/start", post(command::start_charging))
        .route("/charger/stop", post(command::stop_charging))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
