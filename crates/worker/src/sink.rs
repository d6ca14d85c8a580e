use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use meetscribe_common::ids::{RoomId, TranscriptId};
use meetscribe_common::types::{PendingTranscript, TranscriptRow};
use meetscribe_common::WorkerError;

use crate::store::StoreClient;
use crate::timebase::Timebase;

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_QUEUE_CAP: usize = 500;

/// Bounded, batching sink for finalized transcript fragments (C3, spec
/// §4.3). Accepts only `is_final = true` rows; batches by size or age,
/// whichever triggers first; drops the oldest row on overflow rather than
/// blocking the STT pipeline.
pub struct TranscriptSink {
    inner: Arc<Mutex<SinkState>>,
    store: Arc<StoreClient>,
    room_id: RoomId,
    timebase: Timebase,
    batch_size: usize,
    queue_cap: usize,
    cancel: CancellationToken,
    flush_task: Option<JoinHandle<()>>,
}

struct SinkState {
    pending: Vec<PendingTranscript>,
    org_attribution: Option<String>,
    dropped_count: u64,
}

impl TranscriptSink {
    pub fn new(store: Arc<StoreClient>, room_id: RoomId, timebase: Timebase) -> Self {
        Self::with_limits(
            store,
            room_id,
            timebase,
            DEFAULT_BATCH_SIZE,
            DEFAULT_BATCH_INTERVAL,
            DEFAULT_QUEUE_CAP,
        )
    }

    pub fn with_limits(
        store: Arc<StoreClient>,
        room_id: RoomId,
        timebase: Timebase,
        batch_size: usize,
        batch_interval: Duration,
        queue_cap: usize,
    ) -> Self {
        let inner = Arc::new(Mutex::new(SinkState {
            pending: Vec::with_capacity(batch_size),
            org_attribution: None,
            dropped_count: 0,
        }));
        let cancel = CancellationToken::new();

        let flush_task = {
            let inner = Arc::clone(&inner);
            let store = Arc::clone(&store);
            let cancel = cancel.clone();
            let timebase = timebase;
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(batch_interval) => {
                            let batch = {
                                let mut state = inner.lock().await;
                                if state.pending.is_empty() {
                                    continue;
                                }
                                std::mem::take(&mut state.pending)
                            };
                            if let Err(e) = Self::flush_batch(&store, room_id, &timebase, &inner, batch, queue_cap).await {
                                tracing::error!(room_id = %room_id, error = %e, "Transcript batch flush failed");
                            }
                        }
                    }
                }
            })
        };

        Self {
            inner,
            store,
            room_id,
            timebase,
            batch_size,
            queue_cap,
            cancel,
            flush_task: Some(flush_task),
        }
    }

    /// Enqueue a finalized fragment. Triggers an immediate flush if the
    /// queue has reached `batch_size`.
    pub async fn push(&self, fragment: PendingTranscript) -> Result<(), WorkerError> {
        let should_flush = {
            let mut state = self.inner.lock().await;

            if state.pending.len() >= self.queue_cap {
                state.pending.remove(0);
                state.dropped_count += 1;
                tracing::warn!(
                    room_id = %self.room_id,
                    dropped_count = state.dropped_count,
                    "Transcript sink overflow, dropped oldest row"
                );
            }

            state.pending.push(fragment);
            state.pending.len() >= self.batch_size
        };

        if should_flush {
            self.flush_now().await?;
        }

        Ok(())
    }

    #[cfg(test)]
    pub async fn dropped_count(&self) -> u64 {
        self.inner.lock().await.dropped_count
    }

    #[cfg(test)]
    pub async fn queue_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    /// Force a flush of whatever is currently queued, regardless of size
    /// or age triggers.
    pub async fn flush_now(&self) -> Result<(), WorkerError> {
        let batch = {
            let mut state = self.inner.lock().await;
            if state.pending.is_empty() {
                return Ok(());
            }
            std::mem::take(&mut state.pending)
        };

        Self::flush_batch(
            &self.store,
            self.room_id,
            &self.timebase,
            &self.inner,
            batch,
            self.queue_cap,
        )
        .await
    }

    async fn flush_batch(
        store: &StoreClient,
        room_id: RoomId,
        timebase: &Timebase,
        inner: &Arc<Mutex<SinkState>>,
        batch: Vec<PendingTranscript>,
        queue_cap: usize,
    ) -> Result<(), WorkerError> {
        if batch.is_empty() {
            return Ok(());
        }

        let org_attribution = {
            let mut state = inner.lock().await;
            if state.org_attribution.is_none() {
                let attribution = store.room_org_attribution(room_id).await?;
                state.org_attribution = Some(attribution);
            }
            state.org_attribution.clone().unwrap_or_default()
        };

        let rows: Vec<TranscriptRow> = batch
            .iter()
            .map(|fragment| TranscriptRow {
                id: TranscriptId::new(),
                room_id: fragment.room_id,
                stt_session_id: fragment.stt_session_id,
                participant_id: fragment.participant_id,
                text: fragment.text.clone(),
                is_final: true,
                confidence: fragment.confidence,
                relative_timestamp_seconds: timebase.relative(fragment.wall_clock_timestamp),
                start_time: fragment.start_time,
                end_time: fragment.end_time,
                language: fragment.language.clone(),
                wall_clock_timestamp: fragment.wall_clock_timestamp,
                metadata: serde_json::json!({ "org_ref": org_attribution }),
            })
            .collect();

        match store.insert_transcripts(&rows).await {
            Ok(()) => {
                metrics::counter!("transcript_rows_written_total").increment(rows.len() as u64);
                Ok(())
            }
            Err(e) => {
                let err: WorkerError = e.into();
                let mut state = inner.lock().await;
                if state.pending.len() + batch.len() <= queue_cap {
                    let mut requeued = batch;
                    requeued.extend(std::mem::take(&mut state.pending));
                    state.pending = requeued;
                    tracing::warn!(room_id = %room_id, error = %err, "Transcript batch insert failed, re-queued");
                } else {
                    state.dropped_count += batch.len() as u64;
                    tracing::error!(room_id = %room_id, error = %err, dropped = batch.len(), "Transcript batch insert failed, batch dropped over cap");
                }
                Err(err)
            }
        }
    }

    /// Stop the background flush loop and synchronously flush anything
    /// still pending (spec §4.3 `stop()`).
    pub async fn stop(mut self) -> Result<(), WorkerError> {
        self.cancel.cancel();
        if let Some(task) = self.flush_task.take() {
            let _ = task.await;
        }
        self.flush_now().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meetscribe_common::ids::{ParticipantId, SttSessionId};

    fn fragment(room_id: RoomId) -> PendingTranscript {
        PendingTranscript {
            room_id,
            stt_session_id: SttSessionId::new(),
            participant_id: ParticipantId::new(),
            text: "hi".into(),
            confidence: 0.9,
            start_time: 0.0,
            end_time: 1.0,
            language: "en".into(),
            wall_clock_timestamp: chrono::Utc::now(),
        }
    }

    /// Spec §8 scenario 5: a store that always fails, producing faster
    /// than the batch interval, never grows the queue past its cap and
    /// accounts every dropped row. Requires a live Postgres with no
    /// matching `rooms` row for `room_id` so every insert fails on the
    /// `transcripts.room_id` foreign key.
    #[tokio::test]
    #[ignore]
    async fn overflow_caps_queue_and_accounts_drops() {
        let store_url = std::env::var("STORE_URL").expect("STORE_URL must be set");
        let store = Arc::new(
            StoreClient::connect(&store_url, 5)
                .await
                .expect("failed to connect to store"),
        );

        let room_id = RoomId::new();
        let timebase = Timebase::for_test(chrono::Utc::now());
        let sink = TranscriptSink::with_limits(
            store,
            room_id,
            timebase,
            10,
            Duration::from_millis(20),
            500,
        );

        for _ in 0..1000 {
            sink.push(fragment(room_id)).await.ok();
        }

        assert!(sink.queue_len().await <= 500);
        assert!(sink.dropped_count().await >= 500);

        let _ = sink.stop().await;
    }
}
