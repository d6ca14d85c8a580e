use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use meetscribe_common::ids::{RoomId, WorkerId};
use meetscribe_common::types::Room;
use meetscribe_common::WorkerError;

use crate::aijobs::JobDriver;
use crate::config::WorkerConfig;
use crate::discovery::{ClaimedRoom, DedupCache, NotifyListener, PollingNotifier, RealtimeNotifier};
use crate::room::{CallEndDetector, RoomSession};
use crate::sink::TranscriptSink;
use crate::store::StoreClient;
use crate::timebase::Timebase;

const HEARTBEAT_STALE_SECONDS: i64 = 45;
const REAP_INTERVAL: Duration = Duration::from_secs(60);
const FINALIZE_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const CLAIM_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Drives the whole worker process lifecycle (C9, spec §4.9): startup,
/// the single-room loop, and graceful shutdown. Owns at most one
/// `RoomSession` at a time and constructs its dependents ({C2, C3, C5…,
/// C6, C7}) in a fixed order the finalize path tears down in reverse.
pub struct WorkerManager {
    config: WorkerConfig,
    store: Arc<StoreClient>,
    cancel: CancellationToken,
    is_shutting_down: Arc<AtomicBool>,
}

impl WorkerManager {
    pub fn new(config: WorkerConfig, store: Arc<StoreClient>) -> Self {
        Self {
            config,
            store,
            cancel: CancellationToken::new(),
            is_shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run startup, then the single-room loop, until cancelled. Returns
    /// once shutdown has completed (spec §4.9 Shutdown).
    pub async fn run(&self) -> Result<(), WorkerError> {
        let worker_id = self.config.worker_id;

        if let Err(e) = self.store.reap_stale_workers(HEARTBEAT_STALE_SECONDS).await {
            tracing::warn!(error = %e, "Best-effort stale-worker reap failed at startup");
        }

        self.store.insert_worker(worker_id, self.config.mode).await?;
        tracing::info!(worker_id = %worker_id, mode = ?self.config.mode, "Worker registered");

        let current_room: Arc<tokio::sync::Mutex<Option<RoomId>>> = Arc::new(tokio::sync::Mutex::new(None));

        let heartbeat_task = self.spawn_heartbeat_ticker(Arc::clone(&current_room));
        let reaper_task = self.spawn_reaper_ticker();

        let job_driver = if self.config.mode.runs_ai_jobs() {
            Some(JobDriver::start(Arc::clone(&self.store), self.cancel.clone()))
        } else {
            None
        };

        let room_loop_result = if self.config.mode.runs_transcription() {
            self.single_room_loop(Arc::clone(&current_room)).await
        } else {
            self.cancel.cancelled().await;
            Ok(())
        };

        self.is_shutting_down.store(true, Ordering::SeqCst);
        self.cancel.cancel();

        let _ = heartbeat_task.await;
        let _ = reaper_task.await;
        if let Some(driver) = job_driver {
            driver.join().await;
        }

        self.store.mark_worker_stopped(worker_id).await?;
        tracing::info!(worker_id = %worker_id, "Worker stopped");

        room_loop_result
    }

    /// Signal graceful shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.is_shutting_down.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    fn spawn_heartbeat_ticker(&self, current_room: Arc<tokio::sync::Mutex<Option<RoomId>>>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let worker_id = self.config.worker_id;
        let interval = self.config.heartbeat_interval;
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let room_id = *current_room.lock().await;
                        if let Err(e) = store.update_heartbeat(worker_id, room_id).await {
                            tracing::warn!(error = %e, "Heartbeat write failed, retrying next tick");
                        }
                    }
                }
            }
        })
    }

    fn spawn_reaper_ticker(&self) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REAP_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = store.reap_stale_workers(HEARTBEAT_STALE_SECONDS).await {
                            tracing::warn!(error = %e, "Periodic stale-worker reap failed");
                        }
                    }
                }
            }
        })
    }

    async fn single_room_loop(&self, current_room: Arc<tokio::sync::Mutex<Option<RoomId>>>) -> Result<(), WorkerError> {
        let worker_id = self.config.worker_id;
        let dedup = Arc::new(DedupCache::new(self.config.room_claim_cache_duration));
        let (claimed_tx, mut claimed_rx) = mpsc::channel::<ClaimedRoom>(16);

        let polling = if self.config.enable_polling_fallback {
            Some(PollingNotifier::start(
                Arc::clone(&self.store),
                Arc::clone(&dedup),
                worker_id,
                self.config.mode,
                self.config.polling_interval,
                claimed_tx.clone(),
                self.cancel.clone(),
            ))
        } else {
            None
        };

        let _notify = if self.config.enable_database_notify {
            match &self.config.store_direct_url {
                Some(direct_url) => Some(NotifyListener::start(
                    direct_url.clone(),
                    Arc::clone(&self.store),
                    Arc::clone(&dedup),
                    worker_id,
                    self.config.mode,
                    claimed_tx.clone(),
                    self.cancel.clone(),
                )),
                None => {
                    tracing::warn!("ENABLE_DATABASE_NOTIFY set but STORE_DIRECT_URL absent, notify path disabled");
                    None
                }
            }
        } else {
            None
        };

        let _realtime = match self.realtime_bearer_token() {
            Some((realtime_url, bearer_token)) => Some(RealtimeNotifier::start(
                realtime_url,
                bearer_token,
                Arc::clone(&self.store),
                Arc::clone(&dedup),
                worker_id,
                self.config.mode,
                self.config.realtime_timeout,
                self.config.realtime_retry_interval,
                claimed_tx.clone(),
                self.cancel.clone(),
            )),
            None => None,
        };
        drop(claimed_tx);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                claim = claimed_rx.recv() => {
                    let Some(claim) = claim else { break };

                    metrics::counter!("rooms_claimed_total", "method" => claim.method.as_str().to_string()).increment(1);

                    let room_id = claim.room.id;

                    {
                        let mut guard = current_room.lock().await;
                        *guard = Some(room_id);
                    }

                    let outcome = self.drive_room(claim.room).await;

                    {
                        let mut guard = current_room.lock().await;
                        *guard = None;
                    }

                    dedup.clear(room_id);
                    if let Some(polling) = &polling {
                        polling.check_now();
                    }

                    if let Err(e) = outcome {
                        if e.is_logical() {
                            tracing::warn!(error = %e, "Logical error driving room, backing off before next claim");
                            tokio::select! {
                                _ = self.cancel.cancelled() => break,
                                _ = tokio::time::sleep(CLAIM_RETRY_BACKOFF) => {}
                            }
                        } else {
                            tracing::error!(error = %e, "Error driving room");
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Construct {C2, C3, C5…, C6, C7} for one claimed room, drive C6
    /// until shutdown or disconnect, then finalize (spec §4.9).
    async fn drive_room(&self, room: Room) -> Result<(), WorkerError> {
        let room_id = room.id;
        tracing::info!(room_id = %room_id, "Driving room");

        let credentials = self.store.get_conferencing_credentials(&room.server_ref).await?;
        let provider = self.store.get_transcription_provider_config().await?;

        let timebase = Timebase::initialize(&self.store, room_id).await?;
        let sink = Arc::new(TranscriptSink::new(Arc::clone(&self.store), room_id, timebase));

        let detector_fired = Arc::new(AtomicBool::new(false));
        let detector_cancel = self.cancel.clone();
        let detector_fired_for_handler = Arc::clone(&detector_fired);
        let detector = CallEndDetector::new(
            Duration::from_secs(room.empty_timeout_seconds as u64),
            move || {
                detector_fired_for_handler.store(true, Ordering::SeqCst);
                detector_cancel.cancel();
            },
        );
        let detector = Arc::new(detector);

        let count_observer: Arc<dyn Fn(usize) + Send + Sync> = {
            let detector = Arc::clone(&detector);
            Arc::new(move |count: usize| {
                let detector = Arc::clone(&detector);
                tokio::spawn(async move {
                    detector.update(count).await;
                });
            })
        };

        let session_cancel = CancellationToken::new();
        let session = RoomSession::join(
            &credentials.livekit_url,
            &credentials.api_key,
            &credentials.api_secret,
            &room.name,
            room_id,
            self.config.worker_id,
            Arc::clone(&self.store),
            Arc::clone(&sink),
            timebase,
            provider.ws_url,
            provider.bearer_token,
            provider.language,
            count_observer,
        )
        .await?;

        let room_cancel = self.cancel.clone();
        loop {
            tokio::select! {
                _ = room_cancel.cancelled() => break,
                _ = session_cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(250)) => {
                    if !session.is_connected() {
                        break;
                    }
                }
            }
        }

        let shutting_down = self.is_shutting_down.load(Ordering::SeqCst);
        if shutting_down && !detector_fired.load(Ordering::SeqCst) {
            detector.force().await;
        }

        if shutting_down {
            // spec §4.9 Shutdown: wait up to FINALIZE_SHUTDOWN_GRACE for the
            // in-flight finalize; beyond that the process exits anyway and
            // the room is picked up by whichever worker reaps this one.
            match tokio::time::timeout(
                FINALIZE_SHUTDOWN_GRACE,
                self.finalize(session, sink, room_id, room.ai_enabled),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(room_id = %room_id, "Finalize did not complete within shutdown grace period");
                    Ok(())
                }
            }
        } else {
            self.finalize(session, sink, room_id, room.ai_enabled).await
        }
    }

    /// Idempotent finalize (spec §4.9): tear down the session (which
    /// stops every C5/C4 pair), flush the sink, mark the room and its
    /// participants terminal, best-effort-schedule post-call jobs, and
    /// release the claim.
    async fn finalize(
        &self,
        session: RoomSession,
        sink: Arc<TranscriptSink>,
        room_id: RoomId,
        ai_enabled: bool,
    ) -> Result<(), WorkerError> {
        session.disconnect().await;

        match Arc::try_unwrap(sink) {
            Ok(sink) => {
                if let Err(e) = sink.stop().await {
                    tracing::error!(room_id = %room_id, error = %e, "Final sink flush failed");
                }
            }
            Err(sink) => {
                if let Err(e) = sink.flush_now().await {
                    tracing::error!(room_id = %room_id, error = %e, "Final sink flush failed");
                }
            }
        }

        self.store.complete_room(room_id).await?;
        let left = self.store.mark_all_participants_left(room_id).await?;
        tracing::info!(room_id = %room_id, participants_closed = left, "Room finalized");

        if ai_enabled {
            if let Err(e) = self.schedule_fallback_jobs(room_id).await {
                tracing::warn!(room_id = %room_id, error = %e, "Fallback job scheduling failed");
            }
        }

        self.store.release_room(self.config.worker_id, room_id).await?;
        Ok(())
    }

    /// Best-effort fallback job scheduler (spec §4.9 step 4): insert the
    /// canonical job set only if no job row exists yet for this room.
    async fn schedule_fallback_jobs(&self, room_id: RoomId) -> Result<(), WorkerError> {
        let existing = self.store.count_work_queue_rows(room_id).await?;
        if existing > 0 {
            return Ok(());
        }

        self.store
            .insert_canonical_jobs(room_id, &serde_json::json!({ "room_id": room_id.to_string() }))
            .await?;
        Ok(())
    }

    fn realtime_bearer_token(&self) -> Option<(String, String)> {
        self.config.store_direct_url.as_ref()?;
        let realtime_url = format!("{}/realtime/rooms", self.config.store_url);
        Some((realtime_url, self.config.store_service_key.clone()))
    }
}
