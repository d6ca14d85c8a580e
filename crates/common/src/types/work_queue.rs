use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{RoomId, WorkQueueJobId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkQueueJobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl WorkQueueJobStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Which post-call analysis a job performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Summary,
    ActionItems,
    Sentiment,
    SpeakerAnalytics,
}

impl JobKind {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::ActionItems => "action_items",
            Self::Sentiment => "sentiment",
            Self::SpeakerAnalytics => "speaker_analytics",
        }
    }

    /// Default priority for the worker's fallback insert (spec §4.9 step 4).
    /// Higher runs first.
    pub fn default_priority(&self) -> i32 {
        match self {
            Self::Summary => 100,
            Self::ActionItems => 90,
            Self::Sentiment => 70,
            Self::SpeakerAnalytics => 50,
        }
    }

    /// The canonical set inserted by the worker's fallback scheduler
    /// when no job row exists for a completed room yet.
    pub const CANONICAL_SET: [JobKind; 4] = [
        JobKind::Summary,
        JobKind::ActionItems,
        JobKind::Sentiment,
        JobKind::SpeakerAnalytics,
    ];
}

/// A post-call analysis job row (C10's unit of work). The prompt
/// templates, model selection, and token accounting that act on this row
/// are external to this crate — only scheduling and status tracking are
/// in scope here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkQueueJob {
    pub id: WorkQueueJobId,
    pub room_id: RoomId,
    pub kind: JobKind,
    pub priority: i32,
    pub status: WorkQueueJobStatus,
    pub input_payload: Value,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}
