use super::{StoreClient, StoreError};

/// Per-cluster conferencing credentials, keyed by `rooms.server_ref`
/// (spec §4.6, §7 class 2 "no conferencing server entry").
pub struct ConferencingCredentials {
    pub livekit_url: String,
    pub api_key: String,
    pub api_secret: String,
}

/// The transcription provider key used to open every STT transport for
/// this worker process (spec §7 class 2 "no transcription provider key").
pub struct TranscriptionProviderConfig {
    pub ws_url: String,
    pub bearer_token: String,
    pub language: String,
}

impl StoreClient {
    /// Look up the conferencing cluster entry for a room's `server_ref`.
    /// Absence is a logical store error: the caller aborts the claim.
    pub async fn get_conferencing_credentials(
        &self,
        server_ref: &str,
    ) -> Result<ConferencingCredentials, StoreError> {
        let row: (String, String, String) = sqlx::query_as(
            r#"
            SELECT livekit_url, api_key, api_secret
            FROM conferencing_servers
            WHERE server_ref = $1
            "#,
        )
        .bind(server_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?
        .ok_or_else(|| StoreError::NotFound(format!("conferencing server {server_ref}")))?;

        Ok(ConferencingCredentials {
            livekit_url: row.0,
            api_key: row.1,
            api_secret: row.2,
        })
    }

    /// Look up the single active transcription provider key. Absence is a
    /// logical store error.
    pub async fn get_transcription_provider_config(
        &self,
    ) -> Result<TranscriptionProviderConfig, StoreError> {
        let row: (String, String, String) = sqlx::query_as(
            r#"
            SELECT ws_url, bearer_token, language
            FROM transcription_provider_config
            WHERE active = true
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?
        .ok_or_else(|| StoreError::NotFound("active transcription provider config".into()))?;

        Ok(TranscriptionProviderConfig {
            ws_url: row.0,
            bearer_token: row.1,
            language: row.2,
        })
    }

    /// Whether at least one active AI-jobs configuration exists (spec §7
    /// class 2 "no active AI configs"), consulted by C10 before claiming
    /// jobs in modes that include `ai-jobs`.
    pub async fn has_active_ai_config(&self) -> Result<bool, StoreError> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM ai_job_configs WHERE active = true")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(row.0 > 0)
    }

    #[cfg(test)]
    pub async fn conferencing_server_exists(&self, server_ref: &str) -> Result<bool, StoreError> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM conferencing_servers WHERE server_ref = $1")
                .bind(server_ref)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(row.0 > 0)
    }
}
