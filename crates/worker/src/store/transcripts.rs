use uuid::Uuid;

use meetscribe_common::ids::RoomId;
use meetscribe_common::types::TranscriptRow;

use super::{StoreClient, StoreError};

impl StoreClient {
    /// Insert a batch of finalized transcript rows in one statement (C3
    /// flush, spec §4.3). All-or-nothing — the sink re-queues the whole
    /// batch on failure.
    pub async fn insert_transcripts(&self, rows: &[TranscriptRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO transcripts
                    (id, room_id, stt_session_id, participant_id, text, is_final, confidence,
                     relative_timestamp_seconds, start_time, end_time, language,
                     wall_clock_timestamp, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(Uuid::from(row.id))
            .bind(Uuid::from(row.room_id))
            .bind(Uuid::from(row.stt_session_id))
            .bind(Uuid::from(row.participant_id))
            .bind(&row.text)
            .bind(row.is_final)
            .bind(row.confidence)
            .bind(row.relative_timestamp_seconds)
            .bind(row.start_time)
            .bind(row.end_time)
            .bind(&row.language)
            .bind(row.wall_clock_timestamp)
            .bind(&row.metadata)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    /// Lazily-loaded organization attribution for a room, cached by the
    /// sink (spec §4.3). Reads the room's `server_ref` as the attribution
    /// key — the coordination store is the only place this lives.
    pub async fn room_org_attribution(&self, room_id: RoomId) -> Result<String, StoreError> {
        let row: (String,) = sqlx::query_as("SELECT server_ref FROM rooms WHERE id = $1")
            .bind(Uuid::from(room_id))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
            .ok_or_else(|| StoreError::NotFound(format!("Room {}", room_id)))?;

        Ok(row.0)
    }
}
