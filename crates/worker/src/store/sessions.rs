use uuid::Uuid;

use meetscribe_common::ids::{ParticipantId, RoomId, SttSessionId};

use super::{StoreClient, StoreError};

impl StoreClient {
    /// Create an STT session row in `active` status (C4 `start`, spec §4.4).
    pub async fn create_stt_session(
        &self,
        room_id: RoomId,
        participant_id: ParticipantId,
        external_session_tag: &str,
    ) -> Result<SttSessionId, StoreError> {
        let id = SttSessionId::new();

        sqlx::query(
            r#"
            INSERT INTO stt_sessions
                (id, room_id, participant_id, external_session_tag, status, started_at,
                 audio_minutes, transcript_count, average_confidence)
            VALUES ($1, $2, $3, $4, 'active', now(), 0, 0, 0)
            "#,
        )
        .bind(Uuid::from(id))
        .bind(Uuid::from(room_id))
        .bind(Uuid::from(participant_id))
        .bind(external_session_tag)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(id)
    }

    /// Complete an STT session (C4 `stop`, spec §4.4).
    pub async fn complete_stt_session(
        &self,
        id: SttSessionId,
        audio_minutes: f64,
        transcript_count: i32,
        average_confidence: f64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE stt_sessions
            SET status = 'completed',
                ended_at = now(),
                audio_minutes = $2,
                transcript_count = $3,
                average_confidence = $4
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .bind(audio_minutes)
        .bind(transcript_count)
        .bind(average_confidence)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    /// Mark an STT session failed with the provider's reason (spec §4.4,
    /// §7 class 3 "Provider protocol error").
    pub async fn fail_stt_session(&self, id: SttSessionId, error_message: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE stt_sessions
            SET status = 'failed', ended_at = now(), error_message = $2
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }
}
