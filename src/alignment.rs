use serde::{Deserialize, Serialize};

/// Minimum span length in milliseconds; shorter words are stretched to this.
pub const MIN_TIME_MS: u64 = 1000;

/// A timed text fragment of a section's audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    pub start: u64,
    pub length: u64,
}

impl Span {
    pub fn new(text: impl Into<String>, start: u64, length: u64) -> Self {
        Self {
            text: text.into(),
            start,
            length: length.max(MIN_TIME_MS),
        }
    }
}

/// One provider batch of per-character timings, offsets relative to the batch.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CharTimings {
    pub chars: Vec<String>,
    #[serde(rename = "charStartTimesMs")]
    pub char_start_times_ms: Vec<u64>,
    #[serde(rename = "charDurationsMs")]
    pub char_durations_ms: Vec<u64>,
}

/// Folds streamed character timings into word spans.
#[derive(Debug, Default)]
pub struct AlignmentBuilder {
    spans: Vec<Span>,
    offset: u64,
    word: String,
    word_start: u64,
    word_length: u64,
}

impl AlignmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_batch(&mut self, batch: &CharTimings) {
        let timings = batch
            .chars
            .iter()
            .zip(&batch.char_start_times_ms)
            .zip(&batch.char_durations_ms);

        let mut last = None;
        for ((chars, &start), &duration) in timings {
            last = Some((start, duration));
            for c in chars.chars() {
                if c.is_whitespace() {
                    self.close_word();
                } else {
                    if self.word.is_empty() {
                        self.word_start = self.offset + start;
                    }
                    self.word.push(c);
                    self.word_length += duration;
                }
            }
        }

        self.close_word();
        if let Some((start, duration)) = last {
            self.offset += start + duration;
        }
    }

    pub fn finish(mut self) -> Vec<Span> {
        self.close_word();
        self.spans
    }

    fn close_word(&mut self) {
        if self.word.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.word);
        self.spans
            .push(Span::new(text, self.word_start, self.word_length));
        self.word_length = 0;
    }
}
