use chrono::{DateTime, Utc};

use super::wire::{FragmentMetadata, TranscriptResult};

/// A fragment fed into the aggregator by the STT client once a final
/// result arrives from the provider.
#[derive(Clone, Debug)]
pub struct Fragment {
    pub text: String,
    pub confidence: f64,
    pub start_time: f64,
    pub end_time: f64,
}

impl Fragment {
    pub fn from_transcript_result(metadata: &FragmentMetadata, results: &[TranscriptResult]) -> Self {
        Self {
            text: metadata.transcript.clone(),
            confidence: FragmentMetadata::mean_confidence(results),
            start_time: metadata.start_time,
            end_time: metadata.end_time,
        }
    }
}

/// A completed utterance ready to hand to the transcript sink.
#[derive(Clone, Debug)]
pub struct FlushedUtterance {
    pub text: String,
    pub confidence: f64,
    pub start_time: f64,
    pub end_time: f64,
    pub wall_clock_timestamp: DateTime<Utc>,
}

const MAX_BUFFER_CHARS: usize = 500;
const SILENCE_TIMEOUT_SECS: i64 = 2;

/// Buffers final fragments from one STT session until a sentence boundary,
/// a length cap, or a silence timeout fires a flush (spec §4.4).
pub struct UtteranceAggregator {
    buffer_text: String,
    confidence_sum: f64,
    fragment_count: u32,
    buffer_start_time: Option<f64>,
    buffer_end_time: f64,
    last_fragment_at: Option<DateTime<Utc>>,
    /// Guards against a timer-driven flush racing a fragment-driven flush
    /// for the same buffer — set while a flush is being drained by the
    /// caller, cleared once the buffer is reset.
    flushing: bool,
}

impl UtteranceAggregator {
    pub fn new() -> Self {
        Self {
            buffer_text: String::new(),
            confidence_sum: 0.0,
            fragment_count: 0,
            buffer_start_time: None,
            buffer_end_time: 0.0,
            last_fragment_at: None,
            flushing: false,
        }
    }

    /// Append a fragment, returning a flush if a sentence-terminator or
    /// length trigger fires as a result.
    pub fn push(&mut self, fragment: Fragment) -> Option<FlushedUtterance> {
        if self.flushing {
            return None;
        }

        if self.buffer_start_time.is_none() {
            self.buffer_start_time = Some(fragment.start_time);
        }
        self.buffer_end_time = fragment.end_time;

        if !self.buffer_text.is_empty() {
            self.buffer_text.push(' ');
        }
        self.buffer_text.push_str(fragment.text.trim());
        self.confidence_sum += fragment.confidence;
        self.fragment_count += 1;
        self.last_fragment_at = Some(Utc::now());

        let ends_sentence = fragment
            .text
            .trim()
            .ends_with(['.', '!', '?']);
        let over_length = self.buffer_text.len() > MAX_BUFFER_CHARS;

        if ends_sentence || over_length {
            self.flush()
        } else {
            None
        }
    }

    /// Called on each aggregator tick; flushes if the silence timeout has
    /// elapsed since the last fragment.
    pub fn check_silence_timeout(&mut self) -> Option<FlushedUtterance> {
        if self.flushing || self.buffer_text.is_empty() {
            return None;
        }

        let idle_for = self
            .last_fragment_at
            .map(|t| Utc::now().signed_duration_since(t).num_seconds())
            .unwrap_or(0);

        if idle_for >= SILENCE_TIMEOUT_SECS {
            self.flush()
        } else {
            None
        }
    }

    /// Force a flush regardless of triggers — used by `stop()`.
    pub fn flush(&mut self) -> Option<FlushedUtterance> {
        if self.buffer_text.is_empty() {
            return None;
        }

        self.flushing = true;

        let utterance = FlushedUtterance {
            text: std::mem::take(&mut self.buffer_text),
            confidence: if self.fragment_count > 0 {
                self.confidence_sum / self.fragment_count as f64
            } else {
                0.0
            },
            start_time: self.buffer_start_time.unwrap_or(0.0),
            end_time: self.buffer_end_time,
            wall_clock_timestamp: Utc::now(),
        };

        self.confidence_sum = 0.0;
        self.fragment_count = 0;
        self.buffer_start_time = None;
        self.buffer_end_time = 0.0;
        self.last_fragment_at = None;
        self.flushing = false;

        Some(utterance)
    }
}

impl Default for UtteranceAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(text: &str, start: f64, end: f64) -> Fragment {
        Fragment {
            text: text.to_string(),
            confidence: 0.9,
            start_time: start,
            end_time: end,
        }
    }

    #[test]
    fn flushes_on_sentence_terminator() {
        let mut agg = UtteranceAggregator::new();
        assert!(agg.push(fragment("hello there", 0.0, 1.0)).is_none());
        let flushed = agg.push(fragment("world.", 1.0, 2.0)).unwrap();
        assert_eq!(flushed.text, "hello there world.");
        assert_eq!(flushed.start_time, 0.0);
        assert_eq!(flushed.end_time, 2.0);
    }

    #[test]
    fn flushes_on_length_cap() {
        let mut agg = UtteranceAggregator::new();
        let long = "a".repeat(501);
        let flushed = agg.push(fragment(&long, 0.0, 1.0)).unwrap();
        assert_eq!(flushed.text, long);
    }

    #[test]
    fn does_not_flush_mid_sentence_below_cap() {
        let mut agg = UtteranceAggregator::new();
        assert!(agg.push(fragment("hello", 0.0, 1.0)).is_none());
    }

    #[test]
    fn silence_timeout_flushes_buffered_text() {
        let mut agg = UtteranceAggregator::new();
        agg.push(fragment("hello", 0.0, 1.0));
        agg.last_fragment_at = Some(Utc::now() - chrono::Duration::seconds(3));
        let flushed = agg.check_silence_timeout().unwrap();
        assert_eq!(flushed.text, "hello");
    }

    #[test]
    fn empty_buffer_never_flushes() {
        let mut agg = UtteranceAggregator::new();
        assert!(agg.flush().is_none());
        assert!(agg.check_silence_timeout().is_none());
    }
}
