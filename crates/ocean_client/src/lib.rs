//! HTTP client for the Etrel OCEAN web API behind the ON app.

pub mod wire;

use async_trait::async_trait;
use chrono::Utc;
use ocean_core::{StationIdentity, StationSnapshot};
use ocean_engine::{CommandAck, Gateway, GatewayError, GatewayResult, SessionReport};
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::wire::{ChargingData, CommandResponse, Location, LoginResponse, OnlineData, StartRequest, StopRequest};

// The API sits behind a firewall that only lets the mobile app through.
const USER_AGENT: &str = "is.on.charge.android v.2025.7.5 == Android-16;Pixel 7 Pro;SDK:36";

fn transport(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(err.to_string())
    }
}

async fn api_error(response: Response) -> GatewayError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    GatewayError::Api { status, message }
}

async fn parse<T: DeserializeOwned>(response: Response) -> GatewayResult<T> {
    let body = response.bytes().await.map_err(transport)?;
    serde_json::from_slice(&body).map_err(|e| GatewayError::Malformed(e.to_string()))
}

/// Vendor client holding a lazily obtained bearer token.
#[derive(Clone)]
pub struct OceanClient {
    base_url: String,
    email: String,
    password: String,
    client: Client,
    token: Arc<RwLock<Option<String>>>,
}

impl OceanClient {
    pub fn new(base_url: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> GatewayResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(OceanClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            email: email.into(),
            password: password.into(),
            client,
            token: Arc::new(RwLock::new(None)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Exchange the credentials for a fresh bearer token.
    pub async fn login(&self) -> GatewayResult<String> {
        let form = [
            ("email", self.email.as_str()),
            ("password", self.password.as_str()),
            ("grant_type", "password"),
        ];
        let response = self
            .client
            .post(self.url("login"))
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::OK => {
                let login: LoginResponse = parse(response).await?;
                *self.token.write().await = Some(login.access_token.clone());
                debug!("Obtained access token");
                Ok(login.access_token)
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!("Login rejected with {}", response.status());
                Err(GatewayError::AuthRejected)
            }
            _ => Err(api_error(response).await),
        }
    }

    async fn token(&self) -> GatewayResult<String> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.login().await
    }

    /// Send an authenticated request, logging in again once on a 401.
    async fn send<F>(&self, build: F) -> GatewayResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.token().await?;
        let response = build(&self.client)
            .bearer_auth(&token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport)?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        info!("Access token expired, logging in again");
        let token = self.login().await?;
        let response = build(&self.client)
            .bearer_auth(&token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(GatewayError::AuthRejected);
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> GatewayResult<T> {
        let url = self.url(path);
        let response = self.send(|client| client.get(&url)).await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        parse(response).await
    }

    async fn command<B: serde::Serialize + Sync>(&self, path: &str, body: &B) -> GatewayResult<CommandAck> {
        let url = self.url(path);
        let response = self.send(|client| client.post(&url).json(body)).await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let response: CommandResponse = parse(response).await?;
        Ok(response.into())
    }

    fn evse_code(station: &StationIdentity) -> GatewayResult<String> {
        station
            .code
            .clone()
            .ok_or_else(|| GatewayError::Malformed(format!("Station {} has no EVSE code", station.station_id)))
    }
}

#[async_trait]
impl Gateway for OceanClient {
    async fn authenticate(&self) -> GatewayResult<()> {
        self.login().await.map(|_| ())
    }

    async fn list_stations(&self) -> GatewayResult<Vec<StationSnapshot>> {
        let data: OnlineData = self.get_json("api/onlineData").await?;
        let read_at = Utc::now();
        let stations: Vec<StationSnapshot> = data
            .current_sessions
            .into_iter()
            .filter_map(|session| session.into_snapshot(read_at))
            .collect();
        debug!("Vendor lists {} live sessions", stations.len());
        Ok(stations)
    }

    async fn location_stations(&self, location_id: u64) -> GatewayResult<Vec<StationSnapshot>> {
        let location: Location = self
            .get_json(&format!("api/locations/{}?uiCulture=en-GB", location_id))
            .await?;
        Ok(location.passive_snapshots(Utc::now()))
    }

    async fn lookup_code(&self, code: &str) -> GatewayResult<Option<SessionReport>> {
        let url = self.url(&format!("api/connectors/{}/chargingData", code.trim()));
        let response = self.send(|client| client.get(&url)).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let data: ChargingData = parse(response).await?;
                Ok(Some(data.into()))
            }
            _ => Err(api_error(response).await),
        }
    }

    async fn start(&self, station: &StationIdentity) -> GatewayResult<CommandAck> {
        let request = StartRequest {
            evse_code: Self::evse_code(station)?,
            connector_id: station.station_id.0,
            enable_limits: false,
            soc_limits: false,
        };
        self.command("api/commands/remoteStartTransaction", &request).await
    }

    async fn stop(&self, station: &StationIdentity) -> GatewayResult<CommandAck> {
        let request = StopRequest {
            evse_code: Self::evse_code(station)?,
            charge_point_id: station.charge_point_id,
            connector_id: station.station_id.0,
            soc_limits: false,
        };
        self.command("api/commands/remoteStopTransaction", &request).await
    }
}
