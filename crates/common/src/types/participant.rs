use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ParticipantId, RoomId};

/// A room participant, keyed uniquely within a room by `identity`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub room_id: RoomId,
    pub identity: String,
    pub connection_type: String,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    #[serde(default)]
    pub metadata: Value,
}
