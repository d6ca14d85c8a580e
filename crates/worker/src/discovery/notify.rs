use std::sync::Arc;

use sqlx::postgres::PgListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use meetscribe_common::ids::WorkerId;
use meetscribe_common::types::{DiscoveryMethod, RoomAvailableNotification, WorkerMode};

use crate::store::{ClaimOutcome, StoreClient};

use super::{ClaimedRoom, DedupCache};

const STALE_AFTER_SECONDS: i64 = 45;
const NOTIFY_CHANNEL: &str = "room_available";

/// Long-lived `LISTEN room_available` connection (spec §4.8). Reconnects
/// on error with a fixed backoff — the store is the single source of
/// truth, so a missed notification is recovered by the next polling tick
/// or by the realtime stream.
pub struct NotifyListener;

impl NotifyListener {
    pub fn start(
        database_url: String,
        store: Arc<StoreClient>,
        dedup: Arc<DedupCache>,
        worker_id: WorkerId,
        mode: WorkerMode,
        claimed_tx: mpsc::Sender<ClaimedRoom>,
        cancel: CancellationToken,
    ) -> Self {
        tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }

                match PgListener::connect(&database_url).await {
                    Ok(mut listener) => {
                        if let Err(e) = listener.listen(NOTIFY_CHANNEL).await {
                            tracing::error!(error = %e, "Failed to LISTEN on room_available, retrying");
                            Self::backoff(&cancel).await;
                            continue;
                        }

                        tracing::info!("Listening for room_available notifications");

                        loop {
                            tokio::select! {
                                _ = cancel.cancelled() => return,
                                notification = listener.recv() => {
                                    match notification {
                                        Ok(notification) => {
                                            Self::handle_payload(
                                                notification.payload(),
                                                &store,
                                                &dedup,
                                                worker_id,
                                                mode,
                                                &claimed_tx,
                                            )
                                            .await;
                                        }
                                        Err(e) => {
                                            tracing::warn!(error = %e, "room_available listener connection lost, reconnecting");
                                            break;
                                        }
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to connect room_available listener, retrying");
                    }
                }

                Self::backoff(&cancel).await;
            }
        });

        Self
    }

    async fn backoff(cancel: &CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {}
        }
    }

    async fn handle_payload(
        payload: &str,
        store: &StoreClient,
        dedup: &DedupCache,
        worker_id: WorkerId,
        mode: WorkerMode,
        claimed_tx: &mpsc::Sender<ClaimedRoom>,
    ) {
        let notification: RoomAvailableNotification = match serde_json::from_str(payload) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, payload, "Unparseable room_available payload, ignoring");
                return;
            }
        };

        if !dedup.try_claim_attempt(notification.room_id) {
            return;
        }

        let claim = store
            .claim_room(worker_id, notification.room_id, STALE_AFTER_SECONDS)
            .await;

        match claim {
            Ok(ClaimOutcome::Claimed) => match store.get_room(notification.room_id).await {
                Ok(room) => {
                    if !mode_matches(mode, room.transcription_enabled) {
                        if let Err(e) = store.release_room(worker_id, room.id).await {
                            tracing::error!(room_id = %room.id, error = %e, "Failed to release room claimed outside mode filter");
                        }
                        return;
                    }
                    let _ = claimed_tx
                        .send(ClaimedRoom {
                            room,
                            method: DiscoveryMethod::Notify,
                        })
                        .await;
                }
                Err(e) => {
                    tracing::error!(room_id = %notification.room_id, error = %e, "Failed to load claimed room");
                }
            },
            Ok(ClaimOutcome::AlreadyOwned) => {}
            Err(e) => {
                tracing::error!(room_id = %notification.room_id, error = %e, "Claim attempt from room_available failed");
            }
        }
    }
}

fn mode_matches(mode: WorkerMode, transcription_enabled: bool) -> bool {
    match mode {
        WorkerMode::Transcription => transcription_enabled,
        WorkerMode::AiJobs => !transcription_enabled,
        WorkerMode::Both => true,
    }
}
