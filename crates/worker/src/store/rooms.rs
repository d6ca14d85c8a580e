use chrono::{DateTime, Utc};
use uuid::Uuid;

use meetscribe_common::ids::{RoomId, WorkerId};
use meetscribe_common::types::{Room, RoomStatus};

use super::{StoreClient, StoreError};

/// Outcome of a `claim_room` attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadyOwned,
}

impl StoreClient {
    /// Atomically claim a room for `worker_id` (C1 `claim_room`, spec §4.1).
    ///
    /// The row transitions only if it is currently `pending` or `active`
    /// and either unowned or owned by a worker whose heartbeat has gone
    /// stale (`stale_after_seconds`). The owner + worker rows are updated
    /// in the same transaction so a heartbeat never observably precedes
    /// its claim.
    pub async fn claim_room(
        &self,
        worker_id: WorkerId,
        room_id: RoomId,
        stale_after_seconds: i64,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let stale_threshold_sql = format!("now() - interval '{} seconds'", stale_after_seconds);

        let result = sqlx::query(&format!(
            r#"
            UPDATE rooms
            SET owner_worker_id = $1,
                owner_claimed_at = now(),
                owner_heartbeat_at = now(),
                status = 'processing'
            WHERE id = $2
              AND status IN ('pending', 'active')
              AND (owner_worker_id IS NULL OR owner_heartbeat_at < {})
            "#,
            stale_threshold_sql
        ))
        .bind(Uuid::from(worker_id))
        .bind(Uuid::from(room_id))
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        if result.rows_affected() != 1 {
            tx.rollback()
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;
            return Ok(ClaimOutcome::AlreadyOwned);
        }

        sqlx::query(
            r#"
            UPDATE workers
            SET current_room_id = $1, last_heartbeat_at = now()
            WHERE id = $2
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(Uuid::from(worker_id))
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(ClaimOutcome::Claimed)
    }

    /// Clear owner columns on the room iff owned by `worker_id`, and clear
    /// the worker's `current_room_id` iff it equals `room_id` (C1
    /// `release_room`). A no-op if the room is no longer owned by this
    /// worker — idempotent by construction.
    pub async fn release_room(&self, worker_id: WorkerId, room_id: RoomId) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE rooms
            SET owner_worker_id = NULL, owner_claimed_at = NULL, owner_heartbeat_at = NULL
            WHERE id = $1 AND owner_worker_id = $2
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(Uuid::from(worker_id))
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE workers
            SET current_room_id = NULL
            WHERE id = $1 AND current_room_id = $2
            "#,
        )
        .bind(Uuid::from(worker_id))
        .bind(Uuid::from(room_id))
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    /// Fetch a room by id.
    pub async fn get_room(&self, id: RoomId) -> Result<Room, StoreError> {
        let row = sqlx::query_as::<_, RoomRow>(
            r#"
            SELECT id, name, server_ref, status, ai_enabled, transcription_enabled,
                   empty_timeout_seconds, owner_worker_id, owner_claimed_at,
                   owner_heartbeat_at, timebase_origin, created_at, closed_at
            FROM rooms
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?
        .ok_or_else(|| StoreError::NotFound(format!("Room {}", id)))?;

        Ok(row.into())
    }

    /// Oldest claimable room matching the mode filter, ordered by
    /// `created_at` ascending (C8 polling notifier, spec §4.8).
    pub async fn find_oldest_claimable_room(
        &self,
        transcription_enabled: Option<bool>,
        stale_after_seconds: i64,
    ) -> Result<Option<Room>, StoreError> {
        let stale_threshold_sql = format!("now() - interval '{} seconds'", stale_after_seconds);

        let query = format!(
            r#"
            SELECT id, name, server_ref, status, ai_enabled, transcription_enabled,
                   empty_timeout_seconds, owner_worker_id, owner_claimed_at,
                   owner_heartbeat_at, timebase_origin, created_at, closed_at
            FROM rooms
            WHERE status IN ('pending', 'active')
              AND (owner_worker_id IS NULL OR owner_heartbeat_at < {})
              AND ($1::bool IS NULL OR transcription_enabled = $1)
            ORDER BY created_at ASC
            LIMIT 1
            "#,
            stale_threshold_sql
        );

        let row = sqlx::query_as::<_, RoomRow>(&query)
            .bind(transcription_enabled)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// Set-if-null the room's timebase origin (C2 `initialize`, spec §4.2).
    /// Returns the origin that ended up stored — the caller's value if it
    /// won the race, or the winning contender's value otherwise.
    pub async fn set_timebase_origin_if_null(
        &self,
        room_id: RoomId,
        candidate: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, StoreError> {
        sqlx::query(
            r#"
            UPDATE rooms
            SET timebase_origin = $2
            WHERE id = $1 AND timebase_origin IS NULL
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(candidate)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        let row: (Option<DateTime<Utc>>,) =
            sqlx::query_as("SELECT timebase_origin FROM rooms WHERE id = $1")
                .bind(Uuid::from(room_id))
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?
                .ok_or_else(|| StoreError::NotFound(format!("Room {}", room_id)))?;

        row.0
            .ok_or_else(|| StoreError::Query("timebase_origin unexpectedly null".into()))
    }

    /// Mark a room `completed` and stamp `closed_at` (finalize step 2,
    /// spec §4.9). Conditioned on the room not already being terminal so
    /// a second finalize call leaves `closed_at` untouched.
    pub async fn complete_room(&self, room_id: RoomId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE rooms
            SET status = 'completed', closed_at = now()
            WHERE id = $1 AND status NOT IN ('completed', 'closed')
            "#,
        )
        .bind(Uuid::from(room_id))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct RoomRow {
    id: Uuid,
    name: String,
    server_ref: String,
    status: String,
    ai_enabled: bool,
    transcription_enabled: bool,
    empty_timeout_seconds: i32,
    owner_worker_id: Option<Uuid>,
    owner_claimed_at: Option<DateTime<Utc>>,
    owner_heartbeat_at: Option<DateTime<Utc>>,
    timebase_origin: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl From<RoomRow> for Room {
    fn from(row: RoomRow) -> Self {
        Self {
            id: RoomId::from_uuid(row.id),
            name: row.name,
            server_ref: row.server_ref,
            status: RoomStatus::from_db_str(&row.status),
            ai_enabled: row.ai_enabled,
            transcription_enabled: row.transcription_enabled,
            empty_timeout_seconds: row.empty_timeout_seconds as u32,
            owner_worker_id: row.owner_worker_id.map(WorkerId::from_uuid),
            owner_claimed_at: row.owner_claimed_at,
            owner_heartbeat_at: row.owner_heartbeat_at,
            timebase_origin: row.timebase_origin,
            created_at: row.created_at,
            closed_at: row.closed_at,
        }
    }
}
