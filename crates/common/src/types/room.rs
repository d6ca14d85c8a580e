use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{RoomId, WorkerId};

/// Room lifecycle states.
///
/// `Active` is reachable externally (participants joined before a worker
/// claimed) and must remain claimable — an earlier revision restricted
/// claims to `Pending` only and starved every room a webhook raced ahead
/// of discovery on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Pending,
    Active,
    Processing,
    Completed,
    Closed,
}

impl RoomStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Closed => "closed",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "active" => Self::Active,
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "closed" => Self::Closed,
            other => {
                tracing::warn!(status = other, "unknown room status, defaulting to pending");
                Self::Pending
            }
        }
    }

    /// Statuses a claim may originate from (§3, §4.1, §9 open question 2).
    pub fn is_claimable_from(&self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }
}

/// A conferencing room, mirrored from the coordination store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub server_ref: String,
    pub status: RoomStatus,
    pub ai_enabled: bool,
    pub transcription_enabled: bool,
    pub empty_timeout_seconds: u32,
    pub owner_worker_id: Option<WorkerId>,
    pub owner_claimed_at: Option<DateTime<Utc>>,
    pub owner_heartbeat_at: Option<DateTime<Utc>>,
    pub timebase_origin: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Payload carried by the `room_available` database notification channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoomAvailableNotification {
    pub room_id: RoomId,
    pub room_name: String,
    pub status: String,
    pub event: String,
}

/// Which channel first triggered a successful claim — carried into
/// metrics so discovery methods can be compared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    Realtime,
    Notify,
    Polling,
    Startup,
}

impl DiscoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Realtime => "realtime",
            Self::Notify => "notify",
            Self::Polling => "polling",
            Self::Startup => "startup",
        }
    }
}
