use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use meetscribe_common::ids::{ParticipantId, RoomId, SttSessionId};
use meetscribe_common::types::PendingTranscript;
use meetscribe_common::WorkerError;

use crate::sink::TranscriptSink;
use crate::store::StoreClient;

use super::aggregator::{Fragment, UtteranceAggregator};
use super::wire::{InboundMessage, StartRecognition};

const SILENCE_TICK: Duration = Duration::from_millis(250);
const CLOSE_GRACE: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SttClientState {
    Idle,
    Opening,
    Active,
    Draining,
    Closed,
    Failed,
}

/// Per-participant streaming STT session (C4, spec §4.4). Owns the
/// bidirectional provider transport, the utterance aggregator, and the
/// session-accounting fields persisted on `stop()`.
pub struct SttClient {
    session_id: SttSessionId,
    state_rx: watch::Receiver<SttClientState>,
    audio_tx: Option<mpsc::Sender<Vec<u8>>>,
    cancel: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

impl SttClient {
    /// Open the provider transport, persist the session row, send
    /// `StartRecognition`, and spawn the event loop that drives the
    /// aggregator and feeds the sink. Returns once the provider has
    /// acknowledged with `RecognitionStarted`.
    pub async fn start(
        store: std::sync::Arc<StoreClient>,
        sink: std::sync::Arc<TranscriptSink>,
        provider_ws_url: &str,
        bearer_token: &str,
        room_id: RoomId,
        participant_id: ParticipantId,
        language: String,
        cancel: CancellationToken,
    ) -> Result<Self, WorkerError> {
        let external_session_tag = uuid::Uuid::new_v4().to_string();
        let session_id = store
            .create_stt_session(room_id, participant_id, &external_session_tag)
            .await?;

        let request = tokio_tungstenite::tungstenite::http::Request::builder()
            .uri(provider_ws_url)
            .header("Authorization", format!("Bearer {bearer_token}"))
            .header("Host", extract_host(provider_ws_url))
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", tokio_tungstenite::tungstenite::handshake::client::generate_key())
            .body(())
            .map_err(|e| WorkerError::Provider(format!("invalid provider URL: {e}")))?;

        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| WorkerError::Provider(format!("WebSocket connect failed: {e}")))?;

        let (mut write, mut read) = ws.split();

        let start_msg = StartRecognition::new(language.clone());
        let payload = serde_json::to_string(&start_msg)?;
        write
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| WorkerError::Provider(format!("failed to send StartRecognition: {e}")))?;

        // Wait for acknowledgement before declaring Active.
        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<InboundMessage>(&text) {
                        Ok(InboundMessage::RecognitionStarted) => break,
                        Ok(other) => {
                            tracing::debug!(?other, "Unexpected message before RecognitionStarted, ignoring");
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "Unparseable message before RecognitionStarted, ignoring");
                        }
                    }
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    let _ = store
                        .fail_stt_session(session_id, &e.to_string())
                        .await;
                    return Err(WorkerError::Provider(format!(
                        "transport error before acknowledgement: {e}"
                    )));
                }
                None => {
                    let _ = store
                        .fail_stt_session(session_id, "transport closed before acknowledgement")
                        .await;
                    return Err(WorkerError::Provider(
                        "transport closed before acknowledgement".into(),
                    ));
                }
            }
        }

        let (audio_tx, audio_rx) = mpsc::channel::<Vec<u8>>(64);
        let (state_tx, state_rx) = watch::channel(SttClientState::Active);

        let join_handle = tokio::spawn(Self::event_loop(
            store,
            sink,
            session_id,
            room_id,
            participant_id,
            language,
            write,
            read,
            audio_rx,
            cancel.clone(),
            state_tx,
        ));

        Ok(Self {
            session_id,
            state_rx,
            audio_tx: Some(audio_tx),
            cancel,
            join_handle: Some(join_handle),
        })
    }

    pub fn state(&self) -> SttClientState {
        *self.state_rx.borrow()
    }

    pub fn session_id(&self) -> SttSessionId {
        self.session_id
    }

    /// Forward audio bytes to the transport task. Silently dropped if the
    /// session is not `Active`.
    pub async fn send_audio(&self, bytes: Vec<u8>) {
        if self.state() != SttClientState::Active {
            return;
        }
        if let Some(tx) = &self.audio_tx {
            let _ = tx.send(bytes).await;
        }
    }

    /// A cloneable handle carrying just enough to forward audio, so a
    /// producer task (C5) doesn't need shared ownership of the whole
    /// client to feed it.
    pub fn audio_handle(&self) -> SttAudioHandle {
        SttAudioHandle {
            audio_tx: self.audio_tx.clone(),
            state_rx: self.state_rx.clone(),
        }
    }

    /// Cancel the event loop and wait for it to drain: flush the
    /// aggregator, send the sentinel, close the transport, and persist
    /// the completed/failed session row (spec §4.4 `stop()`).
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn event_loop(
        store: std::sync::Arc<StoreClient>,
        sink: std::sync::Arc<TranscriptSink>,
        session_id: SttSessionId,
        room_id: RoomId,
        participant_id: ParticipantId,
        language: String,
        mut write: futures_util::stream::SplitSink<
            tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
            Message,
        >,
        mut read: futures_util::stream::SplitStream<
            tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        >,
        mut audio_rx: mpsc::Receiver<Vec<u8>>,
        cancel: CancellationToken,
        state_tx: watch::Sender<SttClientState>,
    ) {
        let mut aggregator = UtteranceAggregator::new();
        let mut transcript_count: u32 = 0;
        let mut confidence_sum: f64 = 0.0;
        let started_at = Utc::now();
        let mut silence_tick = tokio::time::interval(SILENCE_TICK);
        let mut failure_reason: Option<String> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = silence_tick.tick() => {
                    if let Some(utterance) = aggregator.check_silence_timeout() {
                        transcript_count += 1;
                        confidence_sum += utterance.confidence;
                        Self::publish(&sink, room_id, session_id, participant_id, &language, utterance).await;
                    }
                }
                Some(bytes) = audio_rx.recv() => {
                    if write.send(Message::Binary(bytes.into())).await.is_err() {
                        break;
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<InboundMessage>(&text) {
                                Ok(InboundMessage::RecognitionStarted) => {}
                                Ok(InboundMessage::AddTranscript { metadata, results }) => {
                                    let fragment = Fragment::from_transcript_result(&metadata, &results);
                                    if let Some(utterance) = aggregator.push(fragment) {
                                        transcript_count += 1;
                                        confidence_sum += utterance.confidence;
                                        Self::publish(&sink, room_id, session_id, participant_id, &language, utterance).await;
                                    }
                                }
                                Ok(InboundMessage::AddPartialTranscript { .. }) => {}
                                Ok(InboundMessage::EndOfTranscript) => break,
                                Ok(InboundMessage::Error { reason, .. }) => {
                                    failure_reason = Some(reason);
                                    break;
                                }
                                Ok(InboundMessage::Warning { reason, .. }) => {
                                    tracing::warn!(room_id = %room_id, reason, "Provider warning");
                                }
                                Err(e) => {
                                    tracing::debug!(error = %e, "Unrecognized provider message, ignoring");
                                }
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.map(|f| f.code);
                            if code != Some(tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::Normal) {
                                failure_reason = Some(match code {
                                    Some(code) => format!("transport closed uncleanly: {code}"),
                                    None => "transport closed uncleanly: no close code".to_string(),
                                });
                            }
                            break;
                        }
                        None => {
                            failure_reason = Some("transport closed without a close frame".to_string());
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            failure_reason = Some(e.to_string());
                            break;
                        }
                    }
                }
            }
        }

        let _ = state_tx.send(SttClientState::Draining);

        if let Some(utterance) = aggregator.flush() {
            transcript_count += 1;
            confidence_sum += utterance.confidence;
            Self::publish(&sink, room_id, session_id, participant_id, &language, utterance).await;
        }

        let _ = tokio::time::timeout(CLOSE_GRACE, write.send(Message::Binary(Vec::new().into()))).await;
        let _ = tokio::time::timeout(CLOSE_GRACE, write.close()).await;

        if let Some(reason) = failure_reason {
            let _ = state_tx.send(SttClientState::Failed);
            if let Err(e) = store.fail_stt_session(session_id, &reason).await {
                tracing::error!(room_id = %room_id, error = %e, "Failed to persist STT session failure");
            }
            return;
        }

        let audio_minutes = Utc::now().signed_duration_since(started_at).num_seconds() as f64 / 60.0;
        let average_confidence = if transcript_count > 0 {
            confidence_sum / transcript_count as f64
        } else {
            0.0
        };

        if let Err(e) = store
            .complete_stt_session(session_id, audio_minutes, transcript_count as i32, average_confidence)
            .await
        {
            tracing::error!(room_id = %room_id, error = %e, "Failed to persist STT session completion");
        }

        let _ = state_tx.send(SttClientState::Closed);
    }

    async fn publish(
        sink: &TranscriptSink,
        room_id: RoomId,
        session_id: SttSessionId,
        participant_id: ParticipantId,
        language: &str,
        utterance: super::aggregator::FlushedUtterance,
    ) {
        let fragment = PendingTranscript {
            room_id,
            stt_session_id: session_id,
            participant_id,
            text: utterance.text,
            confidence: utterance.confidence,
            start_time: utterance.start_time,
            end_time: utterance.end_time,
            language: language.to_string(),
            wall_clock_timestamp: utterance.wall_clock_timestamp,
        };

        if let Err(e) = sink.push(fragment).await {
            tracing::error!(room_id = %room_id, error = %e, "Failed to enqueue transcript fragment");
        }
    }
}

/// Lightweight, cloneable audio sink handed to the C5 producer task so it
/// doesn't need ownership of (or a shared `Arc` over) the `SttClient`.
#[derive(Clone)]
pub struct SttAudioHandle {
    audio_tx: Option<mpsc::Sender<Vec<u8>>>,
    state_rx: watch::Receiver<SttClientState>,
}

impl SttAudioHandle {
    pub async fn send_audio(&self, bytes: Vec<u8>) {
        if *self.state_rx.borrow() != SttClientState::Active {
            return;
        }
        if let Some(tx) = &self.audio_tx {
            let _ = tx.send(bytes).await;
        }
    }
}

fn extract_host(url: &str) -> String {
    url.split("://")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .unwrap_or("")
        .to_string()
}
