use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ocean_core::{StationIdentity, StationSnapshot};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Gateway unreachable: {0}")]
    Transport(String),
    #[error("Credentials rejected by the vendor platform")]
    AuthRejected,
    #[error("Unexpected response shape: {0}")]
    Malformed(String),
    #[error("Gateway call timed out")]
    Timeout,
    #[error("Gateway returned {status}: {message}")]
    Api { status: u16, message: String },
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Synchronous answer to a start/stop command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAck {
    pub accepted: bool,
    pub reason: Option<String>,
}

impl CommandAck {
    pub fn accepted() -> Self {
        CommandAck {
            accepted: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        CommandAck {
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

/// Live totals of the session running on a station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub location_id: Option<u64>,
    pub cumulative_energy_kwh: Option<f64>,
    pub cumulative_cost: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
}

/// Authenticated access to the vendor platform.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Obtain or refresh credentials. `AuthRejected` means the credentials are wrong.
    async fn authenticate(&self) -> GatewayResult<()>;

    /// Stations with a live session anywhere on the network. Idle stations are omitted.
    async fn list_stations(&self) -> GatewayResult<Vec<StationSnapshot>>;

    /// Every connector of one location, including idle ones.
    async fn location_stations(&self, location_id: u64) -> GatewayResult<Vec<StationSnapshot>>;

    /// Look up a QR/EVSE code. `None` when the vendor does not know the code.
    async fn lookup_code(&self, code: &str) -> GatewayResult<Option<SessionReport>>;

    async fn start(&self, station: &StationIdentity) -> GatewayResult<CommandAck>;

    async fn stop(&self, station: &StationIdentity) -> GatewayResult<CommandAck>;
}

/// Bound a gateway call; an elapsed limit is reported as [`GatewayError::Timeout`].
pub async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = GatewayResult<T>>,
) -> GatewayResult<T> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| GatewayError::Timeout)?
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted gateway: each call pops the next queued answer, falling back to a default.
    #[derive(Default)]
    pub struct FakeGateway {
        pub auth: Mutex<Option<GatewayError>>,
        pub listings: Mutex<VecDeque<GatewayResult<Vec<StationSnapshot>>>>,
        pub default_listing: Mutex<Vec<StationSnapshot>>,
        pub location: Mutex<Vec<StationSnapshot>>,
        pub code_lookup: Mutex<Option<SessionReport>>,
        pub acks: Mutex<VecDeque<GatewayResult<CommandAck>>>,
        pub list_calls: AtomicUsize,
        pub location_calls: AtomicUsize,
        pub lookup_calls: AtomicUsize,
        pub start_calls: AtomicUsize,
        pub stop_calls: AtomicUsize,
    }

    impl FakeGateway {
        pub fn push_listing(&self, listing: GatewayResult<Vec<StationSnapshot>>) {
            self.listings.lock().unwrap().push_back(listing);
        }

        pub fn set_default_listing(&self, listing: Vec<StationSnapshot>) {
            *self.default_listing.lock().unwrap() = listing;
        }

        pub fn push_ack(&self, ack: GatewayResult<CommandAck>) {
            self.acks.lock().unwrap().push_back(ack);
        }

        pub fn calls(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }

        fn next_ack(&self) -> GatewayResult<CommandAck> {
            self.acks
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(CommandAck::accepted()))
        }
    }

    #[async_trait]
    impl Gateway for FakeGateway {
        async fn authenticate(&self) -> GatewayResult<()> {
            match self.auth.lock().unwrap().clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn list_stations(&self) -> GatewayResult<Vec<StationSnapshot>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let queued = self.listings.lock().unwrap().pop_front();
            queued.unwrap_or_else(|| Ok(self.default_listing.lock().unwrap().clone()))
        }

        async fn location_stations(&self, _location_id: u64) -> GatewayResult<Vec<StationSnapshot>> {
            self.location_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.location.lock().unwrap().clone())
        }

        async fn lookup_code(&self, _code: &str) -> GatewayResult<Option<SessionReport>> {
            self.lookup_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.code_lookup.lock().unwrap().clone())
        }

        async fn start(&self, _station: &StationIdentity) -> GatewayResult<CommandAck> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            self.next_ack()
        }

        async fn stop(&self, _station: &StationIdentity) -> GatewayResult<CommandAck> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            self.next_ack()
        }
    }
}
