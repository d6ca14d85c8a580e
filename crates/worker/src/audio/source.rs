use tokio_util::sync::CancellationToken;

use crate::stt::client::SttAudioHandle;

/// Initial reused-buffer size heuristic: 4800 samples ≈ 300 ms at 16 kHz
/// (spec §4.5).
const INITIAL_BUFFER_SAMPLES: usize = 4_800;

/// A decoded audio frame handed off by the conferencing SDK.
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub channels: u16,
}

/// Per-participant-track producer (C5, spec §4.5). Downmixes stereo to
/// mono into a buffer reused across frames, forwards mono frames
/// unchanged, and falls back to the first channel for anything else.
pub struct AudioSource {
    buffer: Vec<i16>,
}

impl AudioSource {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(INITIAL_BUFFER_SAMPLES),
        }
    }

    /// Run the producer loop until the frame stream ends or `cancel` fires.
    /// Errors encountered while the loop is still running are logged;
    /// once `stop()`/cancellation has fired, further errors are swallowed.
    pub async fn run(
        mut self,
        mut frames: impl futures_util::Stream<Item = Result<AudioFrame, String>> + Unpin,
        stt: SttAudioHandle,
        cancel: CancellationToken,
    ) {
        use futures_util::StreamExt;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = frames.next() => {
                    match frame {
                        Some(Ok(frame)) => {
                            let bytes = self.process_frame(&frame);
                            stt.send_audio(bytes).await;
                        }
                        Some(Err(e)) => {
                            if cancel.is_cancelled() {
                                // swallowed: stop() already in progress
                            } else {
                                tracing::error!(error = %e, "Audio frame stream error");
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        self.stop();
    }

    /// Downmix or pass through a frame, returning little-endian PCM16 bytes.
    fn process_frame(&mut self, frame: &AudioFrame) -> Vec<u8> {
        match frame.channels {
            1 => samples_to_bytes(&frame.samples),
            2 => {
                let pairs = frame.samples.len() / 2;
                if self.buffer.len() < pairs {
                    self.buffer.resize(pairs.max(INITIAL_BUFFER_SAMPLES), 0);
                }
                for i in 0..pairs {
                    let l = frame.samples[i * 2] as i32;
                    let r = frame.samples[i * 2 + 1] as i32;
                    self.buffer[i] = ((l + r) / 2) as i16;
                }
                samples_to_bytes(&self.buffer[..pairs])
            }
            _ => {
                let channels = frame.channels.max(1) as usize;
                let frames = frame.samples.len() / channels;
                if self.buffer.len() < frames {
                    self.buffer.resize(frames.max(INITIAL_BUFFER_SAMPLES), 0);
                }
                for i in 0..frames {
                    self.buffer[i] = frame.samples[i * channels];
                }
                samples_to_bytes(&self.buffer[..frames])
            }
        }
    }

    /// Release the reused buffer so it isn't retained past teardown.
    fn stop(&mut self) {
        self.buffer = Vec::new();
    }
}

impl Default for AudioSource {
    fn default() -> Self {
        Self::new()
    }
}

fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_frame_passes_through_unchanged() {
        let mut source = AudioSource::new();
        let frame = AudioFrame {
            samples: vec![1, 2, 3],
            channels: 1,
        };
        let bytes = source.process_frame(&frame);
        assert_eq!(bytes, samples_to_bytes(&[1, 2, 3]));
    }

    #[test]
    fn stereo_frame_downmixes_to_arithmetic_mean() {
        let mut source = AudioSource::new();
        let frame = AudioFrame {
            samples: vec![10, 20, -10, -20],
            channels: 2,
        };
        let bytes = source.process_frame(&frame);
        assert_eq!(bytes, samples_to_bytes(&[15, -15]));
    }

    #[test]
    fn other_channel_counts_fall_back_to_first_channel() {
        let mut source = AudioSource::new();
        let frame = AudioFrame {
            samples: vec![5, 6, 7, 8, 9, 10],
            channels: 3,
        };
        let bytes = source.process_frame(&frame);
        assert_eq!(bytes, samples_to_bytes(&[5, 8]));
    }

    #[test]
    fn stop_releases_buffer() {
        let mut source = AudioSource::new();
        let frame = AudioFrame {
            samples: vec![1, 2, 3, 4],
            channels: 2,
        };
        source.process_frame(&frame);
        assert!(source.buffer.capacity() > 0);
        source.stop();
        assert_eq!(source.buffer.capacity(), 0);
    }
}
