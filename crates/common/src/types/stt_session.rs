use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ParticipantId, RoomId, SttSessionId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SttSessionStatus {
    Active,
    Completed,
    Failed,
}

impl SttSessionStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// A per-participant streaming speech-to-text session (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SttSession {
    pub id: SttSessionId,
    pub room_id: RoomId,
    pub participant_id: ParticipantId,
    pub external_session_tag: String,
    pub status: SttSessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub audio_minutes: f64,
    pub transcript_count: i32,
    pub average_confidence: f64,
    pub error_message: Option<String>,
}
