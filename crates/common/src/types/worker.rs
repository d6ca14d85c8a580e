use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{RoomId, WorkerId};

/// The operating modes a worker process can run in (spec §6 `MODE`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerMode {
    Transcription,
    AiJobs,
    Both,
}

impl WorkerMode {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Transcription => "transcription",
            Self::AiJobs => "ai-jobs",
            Self::Both => "both",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transcription" => Some(Self::Transcription),
            "ai-jobs" => Some(Self::AiJobs),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    pub fn runs_transcription(&self) -> bool {
        matches!(self, Self::Transcription | Self::Both)
    }

    pub fn runs_ai_jobs(&self) -> bool {
        matches!(self, Self::AiJobs | Self::Both)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Active,
    Stopped,
}

impl WorkerStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Stopped => "stopped",
        }
    }
}

/// A worker process, mirrored from the coordination store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub mode: WorkerMode,
    pub status: WorkerStatus,
    pub current_room_id: Option<RoomId>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
}
