use crate::models::{StationIdentity, StationSnapshot, normalize_code};

/// Return the stations relevant to this configuration.
///
/// With a configured code, every station whose code matches it. Without
/// one, only stations a vehicle currently occupies: idle home and idle
/// neighbour chargers look the same, so neither is surfaced.
pub fn resolve<'a>(stations: &'a [StationSnapshot], configured_code: Option<&str>) -> Vec<&'a StationSnapshot> {
    match configured_code {
        Some(code) => stations
            .iter()
            .filter(|station| station.identity.matches_code(code))
            .collect(),
        None => stations
            .iter()
            .filter(|station| station.vendor_status.is_active())
            .collect(),
    }
}

/// Result of resolving one vendor listing.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The home station reported in this listing.
    Home(StationSnapshot),
    /// A code is configured but the home station is not in the listing.
    HomeMissing,
    /// No code is configured; the active stations of the listing.
    Active(Vec<StationSnapshot>),
}

/// Stateful resolver that remembers the home station once its code matched.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    configured_code: Option<String>,
    cached: Option<StationIdentity>,
}

impl IdentityResolver {
    pub fn new(configured_code: Option<&str>) -> Self {
        let configured_code = configured_code
            .map(normalize_code)
            .filter(|code| !code.is_empty());
        IdentityResolver {
            configured_code,
            cached: None,
        }
    }

    /// Seed the resolver with an identity learned before a restart.
    ///
    /// An identity learned under a different code is dropped.
    pub fn with_cached(mut self, identity: Option<StationIdentity>) -> Self {
        if let Some(code) = self.configured_code.as_deref() {
            self.cached = identity.filter(|identity| identity.matches_code(code));
        }
        self
    }

    pub fn configured_code(&self) -> Option<&str> {
        self.configured_code.as_deref()
    }

    pub fn cached(&self) -> Option<&StationIdentity> {
        self.cached.as_ref()
    }

    pub(crate) fn remember_location(&mut self, location_id: u64) {
        if let Some(identity) = self.cached.as_mut() {
            identity.location_id.get_or_insert(location_id);
        }
    }

    pub fn resolve(&mut self, stations: &[StationSnapshot]) -> Resolution {
        let Some(code) = self.configured_code.as_deref() else {
            return Resolution::Active(resolve(stations, None).into_iter().cloned().collect());
        };

        let matches = resolve(stations, Some(code));
        let cached_id = self.cached.as_ref().map(|identity| identity.station_id);
        let by_code = matches
            .iter()
            .find(|station| Some(station.station_id()) == cached_id)
            .or_else(|| matches.first())
            .copied();

        if let Some(station) = by_code {
            let mut identity = station.identity.clone();
            if let Some(cached) = &self.cached {
                if cached.station_id == identity.station_id {
                    identity = identity.merged_with(cached);
                } else {
                    tracing::warn!(
                        "Code {} moved from station {} to station {}",
                        code,
                        cached.station_id,
                        identity.station_id
                    );
                }
            }
            self.cached = Some(identity.clone());
            let mut snapshot = station.clone();
            snapshot.identity = identity;
            return Resolution::Home(snapshot);
        }

        // The code lookup failed, but the station id learned earlier may still be listed.
        if let Some(cached) = &self.cached {
            let listed = stations
                .iter()
                .find(|s| s.station_id() == cached.station_id && s.identity.code.is_none());
            if let Some(station) = listed {
                tracing::debug!(
                    "Home station {} listed without its code, using cached identity",
                    cached.station_id
                );
                let mut snapshot = station.clone();
                snapshot.identity = station.identity.clone().merged_with(cached);
                snapshot.identity.code = cached.code.clone();
                return Resolution::Home(snapshot);
            }
        }

        Resolution::HomeMissing
    }
}
