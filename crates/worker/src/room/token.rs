use livekit_api::access_token::{AccessToken, VideoGrants};

use meetscribe_common::ids::WorkerId;
use meetscribe_common::WorkerError;

const TOKEN_TTL_SECONDS: u64 = 300;

/// Mint a short-lived bearer credential that joins a room as a hidden,
/// non-publishing subscriber (spec §4.6). The identity is
/// `worker-<worker_id>` and the metadata tag lets C6's join handler
/// filter the worker's own presence out of participant counts.
pub fn mint_room_token(
    api_key: &str,
    api_secret: &str,
    room_name: &str,
    worker_id: WorkerId,
) -> Result<String, WorkerError> {
    let identity = format!("worker-{worker_id}");

    let grants = VideoGrants {
        room: room_name.to_string(),
        room_join: true,
        can_publish: false,
        can_subscribe: true,
        hidden: true,
        ..Default::default()
    };

    AccessToken::with_api_key(api_key, api_secret)
        .with_identity(&identity)
        .with_ttl(std::time::Duration::from_secs(TOKEN_TTL_SECONDS))
        .with_grants(grants)
        .with_metadata(r#"{"worker":true,"hidden":true}"#)
        .to_jwt()
        .map_err(|e| WorkerError::Conference(format!("failed to mint room token: {e}")))
}

/// True if the given identity is this worker's own hidden presence.
pub fn is_worker_identity(identity: &str) -> bool {
    identity.starts_with("worker-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_identity_detection() {
        assert!(is_worker_identity("worker-abc-123"));
        assert!(!is_worker_identity("alice"));
    }
}
