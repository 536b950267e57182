use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use etrel_ocean::AppState;
use ocean_core::StationId;
use ocean_engine::{CommandOutcome, RejectReason};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    /// Defaults to the home charger
    #[serde(default)]
    pub station_id: Option<StationId>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn outcome_to_response(outcome: CommandOutcome) -> impl IntoResponse {
    let (status, name, reason) = match outcome {
        CommandOutcome::Confirmed => (StatusCode::OK, "confirmed", None),
        CommandOutcome::TimedOut => (StatusCode::ACCEPTED, "timedOut", None),
        CommandOutcome::Rejected(reason) => {
            let status = match reason {
                RejectReason::UnknownTarget => StatusCode::NOT_FOUND,
                RejectReason::CommandInProgress => StatusCode::CONFLICT,
                RejectReason::Gateway(_) => StatusCode::UNPROCESSABLE_ENTITY,
            };
            (status, "rejected", Some(reason.to_string()))
        }
    };

    (
        status,
        Json(CommandResponse {
            outcome: name.to_string(),
            reason,
        }),
    )
}

/// Start charging on the home charger or the given station
pub async fn start_charging(
    State(app_state): State<AppState>,
    payload: Option<Json<CommandRequest>>,
) -> impl IntoResponse {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    tracing::info!("Start requested for {:?}", request.station_id);
    outcome_to_response(app_state.dispatcher().start(request.station_id).await)
}

/// Stop charging on the home charger or the given station
pub async fn stop_charging(
    State(app_state): State<AppState>,
    payload: Option<Json<CommandRequest>>,
) -> impl IntoResponse {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    tracing::info!("Stop requested for {:?}", request.station_id);
    outcome_to_response(app_state.dispatcher().stop(request.station_id).await)
}
