use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use meetscribe_common::ids::{RoomId, WorkQueueJobId};
use meetscribe_common::types::{JobKind, WorkQueueJob, WorkQueueJobStatus};

use super::{StoreClient, StoreError};

impl StoreClient {
    /// Count existing work-queue rows for a room, used by the worker's
    /// best-effort fallback scheduler (spec §4.9 step 4) and by the
    /// external webhook to decide whether to insert — both sides run the
    /// same existence check, so a race between them is harmless.
    pub async fn count_work_queue_rows(&self, room_id: RoomId) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM work_queue WHERE room_id = $1")
            .bind(Uuid::from(room_id))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(row.0)
    }

    /// Insert the canonical set of post-call jobs for a room (spec §4.9
    /// step 4): `{summary p100}, {action_items p90}, {sentiment p70},
    /// {speaker_analytics p50}`, all sharing the same input payload.
    pub async fn insert_canonical_jobs(
        &self,
        room_id: RoomId,
        input_payload: &Value,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        for kind in JobKind::CANONICAL_SET {
            sqlx::query(
                r#"
                INSERT INTO work_queue (id, room_id, kind, priority, status, input_payload, created_at)
                VALUES ($1, $2, $3, $4, 'queued', $5, now())
                "#,
            )
            .bind(Uuid::from(WorkQueueJobId::new()))
            .bind(Uuid::from(room_id))
            .bind(kind.as_db_str())
            .bind(kind.default_priority())
            .bind(input_payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    /// Claim the highest-priority queued job for the AI-jobs driver (C10).
    pub async fn claim_next_work_queue_job(&self) -> Result<Option<WorkQueueJob>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let row: Option<WorkQueueRow> = sqlx::query_as(
            r#"
            SELECT id, room_id, kind, priority, status, input_payload, created_at, completed_at, error_message
            FROM work_queue
            WHERE status = 'queued'
            ORDER BY priority DESC, created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        let Some(row) = row else {
            tx.commit()
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;
            return Ok(None);
        };

        sqlx::query("UPDATE work_queue SET status = 'processing' WHERE id = $1")
            .bind(row.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(Some(row.into()))
    }

    /// Finalize a job's terminal status.
    pub async fn complete_work_queue_job(
        &self,
        id: WorkQueueJobId,
        status: WorkQueueJobStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE work_queue
            SET status = $2, completed_at = now(), error_message = $3
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .bind(status.as_db_str())
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct WorkQueueRow {
    id: Uuid,
    room_id: Uuid,
    kind: String,
    priority: i32,
    status: String,
    input_payload: Value,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

impl From<WorkQueueRow> for WorkQueueJob {
    fn from(row: WorkQueueRow) -> Self {
        Self {
            id: WorkQueueJobId::from_uuid(row.id),
            room_id: RoomId::from_uuid(row.room_id),
            kind: parse_job_kind(&row.kind),
            priority: row.priority,
            status: parse_job_status(&row.status),
            input_payload: row.input_payload,
            created_at: row.created_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
        }
    }
}

fn parse_job_kind(s: &str) -> JobKind {
    match s {
        "summary" => JobKind::Summary,
        "action_items" => JobKind::ActionItems,
        "sentiment" => JobKind::Sentiment,
        "speaker_analytics" => JobKind::SpeakerAnalytics,
        other => {
            tracing::warn!(kind = other, "unknown job kind, defaulting to summary");
            JobKind::Summary
        }
    }
}

fn parse_job_status(s: &str) -> WorkQueueJobStatus {
    match s {
        "queued" => WorkQueueJobStatus::Queued,
        "processing" => WorkQueueJobStatus::Processing,
        "completed" => WorkQueueJobStatus::Completed,
        "failed" => WorkQueueJobStatus::Failed,
        other => {
            tracing::warn!(status = other, "unknown job status, defaulting to queued");
            WorkQueueJobStatus::Queued
        }
    }
}
