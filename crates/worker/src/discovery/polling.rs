use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use meetscribe_common::ids::WorkerId;
use meetscribe_common::types::{DiscoveryMethod, WorkerMode};

use crate::store::{ClaimOutcome, StoreClient};

use super::{ClaimedRoom, DedupCache};

const STALE_AFTER_SECONDS: i64 = 45;

/// Interval-driven fallback discovery (spec §4.8). Also exposes
/// `check_now()` so the manager can accelerate pickup of the next room
/// immediately after releasing one.
pub struct PollingNotifier {
    trigger: Arc<Notify>,
}

impl PollingNotifier {
    pub fn start(
        store: Arc<StoreClient>,
        dedup: Arc<DedupCache>,
        worker_id: WorkerId,
        mode: WorkerMode,
        interval: Duration,
        claimed_tx: mpsc::Sender<ClaimedRoom>,
        cancel: CancellationToken,
    ) -> Self {
        let trigger = Arc::new(Notify::new());
        let task_trigger = Arc::clone(&trigger);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                    _ = task_trigger.notified() => {}
                }

                if let Err(e) = Self::poll_once(&store, &dedup, worker_id, mode, &claimed_tx).await {
                    tracing::error!(error = %e, "Polling discovery cycle failed");
                }
            }
        });

        Self { trigger }
    }

    /// Trigger an immediate poll cycle outside the regular interval.
    pub fn check_now(&self) {
        self.trigger.notify_one();
    }

    async fn poll_once(
        store: &StoreClient,
        dedup: &DedupCache,
        worker_id: WorkerId,
        mode: WorkerMode,
        claimed_tx: &mpsc::Sender<ClaimedRoom>,
    ) -> Result<(), meetscribe_common::WorkerError> {
        let transcription_filter = mode_transcription_filter(mode);

        let room = store
            .find_oldest_claimable_room(transcription_filter, STALE_AFTER_SECONDS)
            .await?;

        let Some(room) = room else {
            return Ok(());
        };

        if !dedup.try_claim_attempt(room.id) {
            return Ok(());
        }

        match store.claim_room(worker_id, room.id, STALE_AFTER_SECONDS).await? {
            ClaimOutcome::Claimed => {
                let room = store.get_room(room.id).await?;
                let _ = claimed_tx
                    .send(ClaimedRoom {
                        room,
                        method: DiscoveryMethod::Polling,
                    })
                    .await;
            }
            ClaimOutcome::AlreadyOwned => {}
        }

        Ok(())
    }
}

/// `None` claims any mode; `Some(true)`/`Some(false)` restrict to
/// transcription-enabled/disabled rooms (spec §4.8 mode filter).
fn mode_transcription_filter(mode: WorkerMode) -> Option<bool> {
    match mode {
        WorkerMode::Transcription => Some(true),
        WorkerMode::AiJobs => Some(false),
        WorkerMode::Both => None,
    }
}
