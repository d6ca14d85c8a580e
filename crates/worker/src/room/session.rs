use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use livekit::prelude::*;
use livekit::webrtc::audio_stream::native::NativeAudioStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use meetscribe_common::ids::{ParticipantId, RoomId, WorkerId};
use meetscribe_common::WorkerError;

use crate::audio::{AudioFrame as WorkerAudioFrame, AudioSource};
use crate::sink::TranscriptSink;
use crate::stt::SttClient;
use crate::store::StoreClient;
use crate::timebase::Timebase;

use super::token::{is_worker_identity, mint_room_token};

const SAMPLE_RATE: u32 = 16_000;

/// A live {C4, C5} pair for one published audio track, keyed by
/// `identity + track_id` so multiple tracks per participant tear down
/// independently (spec §4.6).
struct TrackPipeline {
    cancel: CancellationToken,
    stt: SttClient,
}

/// Joins the conferencing server as a hidden, non-publishing subscriber
/// and drives {C4, C5} pairs for every remote participant's audio tracks
/// (C6, spec §4.6).
pub struct RoomSession {
    room: Room,
    event_task: tokio::task::JoinHandle<()>,
    connected: Arc<AtomicBool>,
    participants_by_identity: Arc<Mutex<HashMap<String, ParticipantId>>>,
    pipelines: Arc<Mutex<HashMap<String, TrackPipeline>>>,
}

impl RoomSession {
    pub async fn join(
        livekit_url: &str,
        api_key: &str,
        api_secret: &str,
        room_name: &str,
        room_id: RoomId,
        worker_id: WorkerId,
        store: Arc<StoreClient>,
        sink: Arc<TranscriptSink>,
        timebase: Timebase,
        provider_ws_url: String,
        provider_bearer_token: String,
        language: String,
        count_observer: Arc<dyn Fn(usize) + Send + Sync>,
    ) -> Result<Self, WorkerError> {
        let token = mint_room_token(api_key, api_secret, room_name, worker_id)?;

        let (room, mut event_rx) = Room::connect(livekit_url, &token, RoomOptions::default())
            .await
            .map_err(|e| WorkerError::Conference(format!("room connect failed: {e}")))?;

        let connected = Arc::new(AtomicBool::new(true));
        let participants_by_identity: Arc<Mutex<HashMap<String, ParticipantId>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let pipelines: Arc<Mutex<HashMap<String, TrackPipeline>>> = Arc::new(Mutex::new(HashMap::new()));

        let event_task = {
            let connected = Arc::clone(&connected);
            let participants_by_identity = Arc::clone(&participants_by_identity);
            let pipelines = Arc::clone(&pipelines);
            let store = Arc::clone(&store);
            let sink = Arc::clone(&sink);

            tokio::spawn(async move {
                while let Some(event) = event_rx.recv().await {
                    match event {
                        RoomEvent::ParticipantConnected(participant) => {
                            let identity = participant.identity().to_string();
                            if is_worker_identity(&identity) {
                                continue;
                            }

                            match store
                                .upsert_participant(room_id, &identity, "webrtc", &serde_json::json!({}))
                                .await
                            {
                                Ok(participant_id) => {
                                    participants_by_identity
                                        .lock()
                                        .await
                                        .insert(identity.clone(), participant_id);
                                }
                                Err(e) => {
                                    tracing::error!(room_id = %room_id, identity, error = %e, "Failed to upsert participant");
                                }
                            }

                            Self::notify_count(&participants_by_identity, &count_observer).await;
                        }
                        RoomEvent::ParticipantDisconnected(participant) => {
                            let identity = participant.identity().to_string();
                            if is_worker_identity(&identity) {
                                continue;
                            }

                            let participant_id = participants_by_identity.lock().await.remove(&identity);
                            if let Some(participant_id) = participant_id {
                                if let Err(e) = store.mark_participant_left(participant_id).await {
                                    tracing::error!(room_id = %room_id, identity, error = %e, "Failed to mark participant left");
                                }
                            }

                            Self::teardown_pipelines_for(&pipelines, &identity).await;
                            Self::notify_count(&participants_by_identity, &count_observer).await;
                        }
                        RoomEvent::TrackSubscribed {
                            track,
                            publication,
                            participant,
                        } => {
                            let identity = participant.identity().to_string();
                            if is_worker_identity(&identity) {
                                continue;
                            }

                            if let RemoteTrack::Audio(audio_track) = track {
                                let participant_id = participants_by_identity.lock().await.get(&identity).copied();
                                let Some(participant_id) = participant_id else {
                                    tracing::warn!(room_id = %room_id, identity, "Track subscribed before participant upsert completed, skipping");
                                    continue;
                                };

                                let track_key = format!("{identity}+{}", publication.sid());
                                let cancel = CancellationToken::new();

                                let stt_result = SttClient::start(
                                    Arc::clone(&store),
                                    Arc::clone(&sink),
                                    &provider_ws_url,
                                    &provider_bearer_token,
                                    room_id,
                                    participant_id,
                                    language.clone(),
                                    cancel.clone(),
                                )
                                .await;

                                let stt = match stt_result {
                                    Ok(client) => client,
                                    Err(e) => {
                                        tracing::error!(room_id = %room_id, identity, error = %e, "Failed to start STT client");
                                        continue;
                                    }
                                };

                                let stream = NativeAudioStream::new(audio_track.rtc_track(), SAMPLE_RATE as i32, 1);
                                let source = AudioSource::new();
                                let adapted = stream.map(|frame| {
                                    Ok::<_, String>(WorkerAudioFrame {
                                        samples: frame.data.to_vec(),
                                        channels: frame.num_channels as u16,
                                    })
                                });

                                let run_cancel = cancel.clone();
                                let audio_handle = stt.audio_handle();
                                tokio::spawn(async move {
                                    source.run(adapted, audio_handle, run_cancel).await;
                                });

                                pipelines
                                    .lock()
                                    .await
                                    .insert(track_key, TrackPipeline { cancel, stt });
                            }
                        }
                        RoomEvent::TrackUnsubscribed {
                            publication,
                            participant,
                            ..
                        } => {
                            let identity = participant.identity().to_string();
                            let track_key = format!("{identity}+{}", publication.sid());
                            if let Some(pipeline) = pipelines.lock().await.remove(&track_key) {
                                pipeline.cancel.cancel();
                                pipeline.stt.stop().await;
                            }
                        }
                        RoomEvent::Disconnected { reason } => {
                            tracing::info!(room_id = %room_id, ?reason, "Room session disconnected");
                            connected.store(false, Ordering::SeqCst);
                        }
                        _ => {}
                    }
                }
            })
        };

        Ok(Self {
            room,
            event_task,
            connected,
            participants_by_identity,
            pipelines,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn notify_count(
        participants: &Arc<Mutex<HashMap<String, ParticipantId>>>,
        observer: &Arc<dyn Fn(usize) + Send + Sync>,
    ) {
        let count = participants.lock().await.len();
        observer(count);
    }

    async fn teardown_pipelines_for(pipelines: &Arc<Mutex<HashMap<String, TrackPipeline>>>, identity: &str) {
        let prefix = format!("{identity}+");
        let mut guard = pipelines.lock().await;
        let keys: Vec<String> = guard
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();

        for key in keys {
            if let Some(pipeline) = guard.remove(&key) {
                pipeline.cancel.cancel();
                pipeline.stt.stop().await;
            }
        }
    }

    /// Tear down every pipeline and disconnect from the room (finalize
    /// step 1, spec §4.9). Awaits the aborted event task so its `Arc`
    /// clones (sink, store) are guaranteed dropped before returning —
    /// callers rely on that to `Arc::try_unwrap` the sink right after.
    pub async fn disconnect(self) {
        self.event_task.abort();
        let _ = self.event_task.await;

        let mut pipelines = self.pipelines.lock().await;
        for (_, pipeline) in pipelines.drain() {
            pipeline.cancel.cancel();
            pipeline.stt.stop().await;
        }
        drop(pipelines);

        let _ = self.room.close().await;
    }
}
