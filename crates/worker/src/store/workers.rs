use chrono::{DateTime, Utc};
use uuid::Uuid;

use meetscribe_common::ids::{RoomId, WorkerId};
use meetscribe_common::types::WorkerMode;

use super::{StoreClient, StoreError};

impl StoreClient {
    /// Insert a new worker row with `status = active` (C9 startup step 2).
    pub async fn insert_worker(&self, id: WorkerId, mode: WorkerMode) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO workers (id, mode, status, current_room_id, last_heartbeat_at, started_at)
            VALUES ($1, $2, 'active', NULL, now(), now())
            ON CONFLICT (id) DO UPDATE SET
                mode = EXCLUDED.mode,
                status = 'active',
                last_heartbeat_at = now()
            "#,
        )
        .bind(Uuid::from(id))
        .bind(mode.as_db_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    /// Update a worker's heartbeat (C1 `update_heartbeat`, spec §4.1).
    /// `room_id` is written verbatim, including `None` — never coalesced
    /// with the prior value, so a worker that just released a room is
    /// reflected immediately.
    pub async fn update_heartbeat(
        &self,
        worker_id: WorkerId,
        room_id: Option<RoomId>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE workers
            SET last_heartbeat_at = now(), current_room_id = $2, status = 'active'
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(worker_id))
        .bind(room_id.map(Uuid::from))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    /// Mark this worker `stopped` and clear its room on graceful shutdown.
    pub async fn mark_worker_stopped(&self, worker_id: WorkerId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE workers
            SET status = 'stopped', current_room_id = NULL
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(worker_id))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    /// Reap workers whose heartbeat has gone stale (C1 `reap_stale_workers`,
    /// spec §4.1): clear owner columns on any rooms they hold, mark them
    /// `stopped`, and clear `current_room_id`. Runs as one transaction.
    /// Returns the number of workers reaped.
    pub async fn reap_stale_workers(&self, threshold_seconds: i64) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let stale_threshold_sql = format!("now() - interval '{} seconds'", threshold_seconds);

        let stale_ids: Vec<(Uuid,)> = sqlx::query_as(&format!(
            r#"
            SELECT id FROM workers
            WHERE status = 'active' AND last_heartbeat_at < {}
            "#,
            stale_threshold_sql
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        if stale_ids.is_empty() {
            tx.commit()
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;
            return Ok(0);
        }

        let ids: Vec<Uuid> = stale_ids.into_iter().map(|(id,)| id).collect();

        sqlx::query(
            r#"
            UPDATE rooms
            SET owner_worker_id = NULL, owner_claimed_at = NULL, owner_heartbeat_at = NULL
            WHERE owner_worker_id = ANY($1)
            "#,
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE workers
            SET status = 'stopped', current_room_id = NULL
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        tracing::info!(count = ids.len(), "Reaped stale workers");
        Ok(ids.len() as u64)
    }

    #[cfg(test)]
    pub async fn worker_heartbeat_at(&self, id: WorkerId) -> Result<DateTime<Utc>, StoreError> {
        let row: (DateTime<Utc>,) =
            sqlx::query_as("SELECT last_heartbeat_at FROM workers WHERE id = $1")
                .bind(Uuid::from(id))
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(row.0)
    }
}
