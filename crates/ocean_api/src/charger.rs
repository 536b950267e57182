use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use etrel_ocean::AppState;
use ocean_core::{BridgeSnapshot, SessionRecord};
use serde::{Deserialize, Serialize};

use crate::ErrorResponse;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargerView {
    /// Confirmed status with the `-stale` overlay, e.g. `charging-stale`
    pub display: String,
    pub power_kw: f64,
    #[serde(flatten)]
    pub snapshot: BridgeSnapshot,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSessionView {
    #[serde(flatten)]
    pub session: SessionRecord,
    pub duration_secs: i64,
}

/// Get the published state of the home charger and surfaced stations
pub async fn get_charger(State(app_state): State<AppState>) -> Json<ChargerView> {
    tracing::debug!("Getting charger state");
    let snapshot = app_state.snapshot();
    Json(ChargerView {
        display: snapshot.home.entity.display(),
        power_kw: snapshot.home.power_kw(),
        snapshot,
    })
}

/// Get the last completed session
pub async fn get_last_session(State(app_state): State<AppState>) -> impl IntoResponse {
    match app_state.snapshot().home.last_session {
        Some(session) => {
            let duration_secs = session.duration(Utc::now()).num_seconds();
            (StatusCode::OK, Json(LastSessionView { session, duration_secs })).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "No completed session yet".to_string(),
            }),
        )
            .into_response(),
    }
}
