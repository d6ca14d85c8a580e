use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use meetscribe_common::ids::WorkerId;
use meetscribe_common::types::{DiscoveryMethod, WorkerMode};

use crate::store::{ClaimOutcome, StoreClient};

use super::{ClaimedRoom, DedupCache};

/// Per-row change event on the room table, as delivered by the realtime
/// change stream (spec §4.8).
#[derive(Deserialize)]
struct RoomChangeEvent {
    #[serde(default)]
    old: Option<RoomSnapshot>,
    new: RoomSnapshot,
}

#[derive(Deserialize)]
struct RoomSnapshot {
    id: uuid::Uuid,
    status: String,
}

/// Realtime change-stream subscriber over the room table (spec §4.8). On
/// insert, or a transition into `active`, attempts a claim. Tracks
/// last-event time for a health predicate and reconnects with a fixed
/// retry interval on close/error/timeout.
pub struct RealtimeNotifier {
    healthy: Arc<AtomicBool>,
}

impl RealtimeNotifier {
    pub fn start(
        realtime_url: String,
        bearer_token: String,
        store: Arc<StoreClient>,
        dedup: Arc<DedupCache>,
        worker_id: WorkerId,
        mode: WorkerMode,
        connect_timeout: Duration,
        retry_interval: Duration,
        claimed_tx: mpsc::Sender<ClaimedRoom>,
        cancel: CancellationToken,
    ) -> Self {
        let healthy = Arc::new(AtomicBool::new(false));
        let task_healthy = Arc::clone(&healthy);

        tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }

                let connect_result = tokio::time::timeout(
                    connect_timeout,
                    tokio_tungstenite::connect_async(Self::authenticated_request(&realtime_url, &bearer_token)),
                )
                .await;

                match connect_result {
                    Ok(Ok((ws, _))) => {
                        task_healthy.store(true, Ordering::SeqCst);
                        let (_write, mut read) = ws.split();

                        loop {
                            tokio::select! {
                                _ = cancel.cancelled() => {
                                    task_healthy.store(false, Ordering::SeqCst);
                                    return;
                                }
                                msg = read.next() => {
                                    match msg {
                                        Some(Ok(Message::Text(text))) => {
                                            Self::handle_event(&text, &store, &dedup, worker_id, mode, &claimed_tx).await;
                                        }
                                        Some(Ok(_)) => {}
                                        Some(Err(e)) => {
                                            tracing::warn!(error = %e, "Realtime change stream error, reconnecting");
                                            break;
                                        }
                                        None => {
                                            tracing::warn!("Realtime change stream closed, reconnecting");
                                            break;
                                        }
                                    }
                                }
                            }
                        }
                    }
                    Ok(Err(e)) => {
                        tracing::error!(error = %e, "Realtime change stream connect failed");
                    }
                    Err(_) => {
                        tracing::error!("Realtime change stream connect timed out");
                    }
                }

                task_healthy.store(false, Ordering::SeqCst);

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(retry_interval) => {}
                }
            }
        });

        Self { healthy }
    }

    /// Whether events have arrived recently enough to consider the
    /// subscription live.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn authenticated_request(
        url: &str,
        bearer_token: &str,
    ) -> tokio_tungstenite::tungstenite::http::Request<()> {
        tokio_tungstenite::tungstenite::http::Request::builder()
            .uri(url)
            .header("Authorization", format!("Bearer {bearer_token}"))
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                tokio_tungstenite::tungstenite::handshake::client::generate_key(),
            )
            .body(())
            .expect("static realtime request is always valid")
    }

    async fn handle_event(
        text: &str,
        store: &StoreClient,
        dedup: &DedupCache,
        worker_id: WorkerId,
        mode: WorkerMode,
        claimed_tx: &mpsc::Sender<ClaimedRoom>,
    ) {
        let event: RoomChangeEvent = match serde_json::from_str(text) {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "Unparseable realtime change event, ignoring");
                return;
            }
        };

        let is_insert = event.old.is_none();
        let became_active = event
            .old
            .as_ref()
            .map(|old| old.status != "active" && event.new.status == "active")
            .unwrap_or(false);

        if !is_insert && !became_active {
            return;
        }

        let room_id = meetscribe_common::ids::RoomId::from_uuid(event.new.id);

        if !dedup.try_claim_attempt(room_id) {
            return;
        }

        match store.claim_room(worker_id, room_id, 45).await {
            Ok(ClaimOutcome::Claimed) => match store.get_room(room_id).await {
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
                            method: DiscoveryMethod::Realtime,
                        })
                        .await;
                }
                Err(e) => {
                    tracing::error!(room_id = %room_id, error = %e, "Failed to load claimed room");
                }
            },
            Ok(ClaimOutcome::AlreadyOwned) => {}
            Err(e) => {
                tracing::error!(room_id = %room_id, error = %e, "Claim attempt from realtime event failed");
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

