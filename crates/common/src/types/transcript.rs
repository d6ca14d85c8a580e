use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ParticipantId, RoomId, SttSessionId, TranscriptId};

/// A finalized transcript fragment, relativized to the room's timebase
/// origin at flush time (spec §3, §4.3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscriptRow {
    pub id: TranscriptId,
    pub room_id: RoomId,
    pub stt_session_id: SttSessionId,
    pub participant_id: ParticipantId,
    pub text: String,
    pub is_final: bool,
    pub confidence: f64,
    pub relative_timestamp_seconds: f64,
    pub start_time: f64,
    pub end_time: f64,
    pub language: String,
    pub wall_clock_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

/// An in-flight fragment buffered in the transcript sink, not yet
/// relativized (relativization happens at flush time, per §4.3).
#[derive(Clone, Debug)]
pub struct PendingTranscript {
    pub room_id: RoomId,
    pub stt_session_id: SttSessionId,
    pub participant_id: ParticipantId,
    pub text: String,
    pub confidence: f64,
    pub start_time: f64,
    pub end_time: f64,
    pub language: String,
    pub wall_clock_timestamp: DateTime<Utc>,
}
