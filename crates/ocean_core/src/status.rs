use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ChargerStatus;

/// A confirmed status change. `at` is when the new status was first read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub from: ChargerStatus,
    pub to: ChargerStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    status: ChargerStatus,
    first_seen: DateTime<Utc>,
    polls: u32,
}

/// Confirms a status only once it persisted over `required` successful polls.
///
/// Terminal vendor statuses and the very first reading after start-up are
/// confirmed immediately. `Unknown` readings never move the confirmed status.
#[derive(Debug, Clone)]
pub struct StatusDebouncer {
    confirmed: ChargerStatus,
    pending: Option<Pending>,
    required: u32,
}

impl StatusDebouncer {
    pub fn new(required: u32) -> Self {
        StatusDebouncer {
            confirmed: ChargerStatus::Unknown,
            pending: None,
            required: required.max(1),
        }
    }

    pub fn with_confirmed(mut self, status: ChargerStatus) -> Self {
        self.confirmed = status;
        self
    }

    pub fn confirmed(&self) -> ChargerStatus {
        self.confirmed
    }

    pub fn pending(&self) -> Option<ChargerStatus> {
        self.pending.map(|pending| pending.status)
    }

    pub fn observe(&mut self, status: ChargerStatus, terminal: bool, at: DateTime<Utc>) -> Option<Transition> {
        if status == ChargerStatus::Unknown {
            return None;
        }
        if status == self.confirmed {
            self.pending = None;
            return None;
        }

        let pending = match self.pending.take() {
            Some(pending) if pending.status == status => Pending {
                polls: pending.polls + 1,
                ..pending
            },
            _ => Pending {
                status,
                first_seen: at,
                polls: 1,
            },
        };

        if terminal || self.confirmed == ChargerStatus::Unknown || pending.polls >= self.required {
            let transition = Transition {
                from: self.confirmed,
                to: status,
                at: pending.first_seen,
            };
            self.confirmed = status;
            Some(transition)
        } else {
            self.pending = Some(pending);
            None
        }
    }
}

/// Outward entity state: the last confirmed status plus a staleness overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
    pub status: ChargerStatus,
    pub stale: bool,
}

impl EntityState {
    /// Status for consumers that cannot represent staleness.
    pub fn effective_status(&self) -> ChargerStatus {
        if self.stale {
            ChargerStatus::Unknown
        } else {
            self.status
        }
    }

    pub fn display(&self) -> String {
        if self.stale {
            format!("{}-stale", self.status)
        } else {
            self.status.to_string()
        }
    }
}
