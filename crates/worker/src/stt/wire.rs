use serde::{Deserialize, Serialize};

/// Control message sent immediately after the transport opens, declaring
/// audio format and transcription configuration (spec §4.4 `start()`).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct StartRecognition {
    pub message: &'static str,
    pub audio_format: AudioFormat,
    pub transcription_config: TranscriptionConfig,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct AudioFormat {
    pub r#type: &'static str,
    pub encoding: &'static str,
    pub sample_rate: u32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TranscriptionConfig {
    pub language: String,
    pub operating_point: &'static str,
    pub enable_partials: bool,
    pub max_delay: f64,
}

impl StartRecognition {
    pub fn new(language: String) -> Self {
        Self {
            message: "StartRecognition",
            audio_format: AudioFormat {
                r#type: "raw",
                encoding: "pcm_s16le",
                sample_rate: 16_000,
            },
            transcription_config: TranscriptionConfig {
                language,
                operating_point: "enhanced",
                enable_partials: true,
                max_delay: 2.0,
            },
        }
    }
}

/// Inbound messages from the transcription provider (spec §4.4).
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "message")]
pub enum InboundMessage {
    RecognitionStarted,
    AddTranscript {
        metadata: FragmentMetadata,
        results: Vec<TranscriptResult>,
    },
    AddPartialTranscript {
        metadata: FragmentMetadata,
        results: Vec<TranscriptResult>,
    },
    EndOfTranscript,
    Error {
        #[serde(rename = "type")]
        error_type: String,
        reason: String,
    },
    Warning {
        #[serde(rename = "type")]
        warning_type: String,
        reason: String,
    },
}

/// The provider carries the fragment text on `metadata.transcript`, not
/// on the per-result entries (spec §6 wire contract).
#[derive(Clone, Debug, Deserialize)]
pub struct FragmentMetadata {
    pub transcript: String,
    pub start_time: f64,
    pub end_time: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TranscriptResult {
    pub alternatives: Vec<TranscriptAlternative>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TranscriptAlternative {
    #[serde(default)]
    pub confidence: f64,
}

impl FragmentMetadata {
    pub fn mean_confidence(results: &[TranscriptResult]) -> f64 {
        let confidences: Vec<f64> = results
            .iter()
            .filter_map(|r| r.alternatives.first())
            .map(|alt| alt.confidence)
            .collect();

        if confidences.is_empty() {
            return 0.0;
        }
        confidences.iter().sum::<f64>() / confidences.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_confidence_averages_first_alternative_per_result() {
        let results = vec![
            TranscriptResult {
                alternatives: vec![TranscriptAlternative { confidence: 0.8 }],
            },
            TranscriptResult {
                alternatives: vec![TranscriptAlternative { confidence: 0.6 }],
            },
        ];

        assert!((FragmentMetadata::mean_confidence(&results) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn mean_confidence_ignores_empty_alternatives() {
        let results = vec![TranscriptResult { alternatives: vec![] }];
        assert_eq!(FragmentMetadata::mean_confidence(&results), 0.0);
    }

    #[test]
    fn mean_confidence_of_no_results_is_zero() {
        assert_eq!(FragmentMetadata::mean_confidence(&[]), 0.0);
    }

    #[test]
    fn add_transcript_deserializes_from_provider_wire_shape() {
        let payload = serde_json::json!({
            "message": "AddTranscript",
            "metadata": { "transcript": "hello world.", "start_time": 0.0, "end_time": 1.2 },
            "results": [{ "alternatives": [{ "confidence": 0.95 }] }],
        });

        let msg: InboundMessage = serde_json::from_value(payload).unwrap();
        match msg {
            InboundMessage::AddTranscript { metadata, results } => {
                assert_eq!(metadata.transcript, "hello world.");
                assert!((FragmentMetadata::mean_confidence(&results) - 0.95).abs() < 1e-9);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
