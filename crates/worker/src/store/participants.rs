use serde_json::Value;
use uuid::Uuid;

use meetscribe_common::ids::{ParticipantId, RoomId};
use meetscribe_common::types::Participant;

use super::{StoreClient, StoreError};

impl StoreClient {
    /// Upsert a participant keyed by `(room_id, identity)` (C6 join handler,
    /// spec §4.6). Returns the participant's internal id either way.
    pub async fn upsert_participant(
        &self,
        room_id: RoomId,
        identity: &str,
        connection_type: &str,
        metadata: &Value,
    ) -> Result<ParticipantId, StoreError> {
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO participants (id, room_id, identity, connection_type, joined_at, is_active, metadata)
            VALUES (gen_random_uuid(), $1, $2, $3, now(), true, $4)
            ON CONFLICT (room_id, identity) DO UPDATE SET
                is_active = true,
                left_at = NULL,
                connection_type = EXCLUDED.connection_type
            RETURNING id
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(identity)
        .bind(connection_type)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(ParticipantId::from_uuid(row.0))
    }

    /// Mark a participant as having left (spec §4.6 leave handler).
    pub async fn mark_participant_left(&self, participant_id: ParticipantId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE participants
            SET is_active = false, left_at = now()
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(participant_id))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    /// Mark every still-active participant in a room as left (finalize
    /// step 3, spec §4.9).
    pub async fn mark_all_participants_left(&self, room_id: RoomId) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE participants
            SET is_active = false, left_at = now()
            WHERE room_id = $1 AND is_active = true
            "#,
        )
        .bind(Uuid::from(room_id))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(result.rows_affected())
    }

    #[cfg(test)]
    pub async fn get_participant(&self, id: ParticipantId) -> Result<Participant, StoreError> {
        use chrono::{DateTime, Utc};

        #[derive(sqlx::FromRow)]
        struct Row {
            id: Uuid,
            room_id: Uuid,
            identity: String,
            connection_type: String,
            joined_at: DateTime<Utc>,
            left_at: Option<DateTime<Utc>>,
            is_active: bool,
            metadata: Value,
        }

        let row: Row = sqlx::query_as(
            "SELECT id, room_id, identity, connection_type, joined_at, left_at, is_active, metadata FROM participants WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(Participant {
            id: ParticipantId::from_uuid(row.id),
            room_id: RoomId::from_uuid(row.room_id),
            identity: row.identity,
            connection_type: row.connection_type,
            joined_at: row.joined_at,
            left_at: row.left_at,
            is_active: row.is_active,
            metadata: row.metadata,
        })
    }
}
