//! Transcript chunking
//!
//! Splits a transcript into overlapping windows that are small enough for a
//! single marker-extraction request. Three modes are supported, picked by how
//! much timing information the transcript carries:
//!
//! - **Timed**: word-level timestamps drive a fixed-duration sliding window.
//! - **Estimated**: only the total duration is known; the window is converted
//!   to a word count using the average speaking rate.
//! - **Untimed**: no timing at all; a fixed word-count window is used and
//!   chunk times are reported as `0.0`.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Default window duration in seconds
pub const DEFAULT_WINDOW_SECONDS: f64 = 75.0;

/// Default overlap between consecutive windows in seconds
pub const DEFAULT_OVERLAP_SECONDS: f64 = 10.0;

/// Default window size in words when no timing is available
pub const DEFAULT_WINDOW_WORDS: usize = 150;

/// Default overlap in words when no timing is available
pub const DEFAULT_OVERLAP_WORDS: usize = 20;

/// A single word with its position on the call timeline (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTimestamp {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// A time-bounded slice of a transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position of the chunk in the transcript (0-based)
    pub index: usize,
    /// Chunk text (words joined by single spaces)
    pub text: String,
    /// Window start in seconds (0.0 when untimed)
    pub start_time: f64,
    /// Window end in seconds (0.0 when untimed)
    pub end_time: f64,
    /// Number of words in the chunk
    pub word_count: usize,
}

impl Chunk {
    /// Whether the chunk carries no timing information
    pub fn is_untimed(&self) -> bool {
        self.start_time == 0.0 && self.end_time == 0.0
    }

    /// Chunk duration in seconds
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Window geometry for the chunker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Window duration in seconds
    pub window_seconds: f64,
    /// Overlap between consecutive windows in seconds
    pub overlap_seconds: f64,
    /// Window size in words (untimed mode)
    pub window_words: usize,
    /// Overlap in words (untimed mode)
    pub overlap_words: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            window_seconds: DEFAULT_WINDOW_SECONDS,
            overlap_seconds: DEFAULT_OVERLAP_SECONDS,
            window_words: DEFAULT_WINDOW_WORDS,
            overlap_words: DEFAULT_OVERLAP_WORDS,
        }
    }
}

impl ChunkerConfig {
    /// Check that every window advances the cursor
    pub fn validate(&self) -> Result<(), String> {
        if !(self.window_seconds.is_finite() && self.window_seconds > 0.0) {
            return Err(format!(
                "window_seconds must be positive, got {}",
                self.window_seconds
            ));
        }
        if !(self.overlap_seconds >= 0.0 && self.overlap_seconds < self.window_seconds) {
            return Err(format!(
                "overlap_seconds must be in [0, {}), got {}",
                self.window_seconds, self.overlap_seconds
            ));
        }
        if self.window_words == 0 {
            return Err("window_words must be at least 1".to_string());
        }
        if self.overlap_words >= self.window_words {
            return Err(format!(
                "overlap_words must be smaller than window_words ({}), got {}",
                self.window_words, self.overlap_words
            ));
        }
        Ok(())
    }
}

/// Splits transcripts into overlapping windows
#[derive(Debug, Clone, Default)]
pub struct TranscriptChunker {
    config: ChunkerConfig,
}

impl TranscriptChunker {
    pub fn new(config: ChunkerConfig) -> Result<Self, ConfigError> {
        config.validate().map_err(ConfigError::ValidationFailed)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk a transcript, using the richest timing information available.
    pub fn chunk(
        &self,
        text: &str,
        word_timestamps: Option<&[WordTimestamp]>,
        total_duration: Option<f64>,
    ) -> Vec<Chunk> {
        if let Some(words) = word_timestamps.filter(|w| !w.is_empty()) {
            return self.chunk_timed(words);
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        match total_duration.filter(|d| d.is_finite() && *d > 0.0) {
            Some(duration) => self.chunk_estimated(&words, duration),
            None => slide_words(
                &words,
                self.config.window_words,
                self.config.overlap_words,
                |_| 0.0,
            ),
        }
    }

    fn chunk_timed(&self, words: &[WordTimestamp]) -> Vec<Chunk> {
        let mut words: Vec<&WordTimestamp> = words
            .iter()
            .filter(|w| w.start.is_finite() && w.end.is_finite())
            .collect();
        words.sort_by(|a, b| a.start.total_cmp(&b.start));

        let Some(first) = words.first() else {
            return Vec::new();
        };
        let last_end = words
            .iter()
            .map(|w| w.end.max(w.start))
            .fold(f64::MIN, f64::max);

        let window = self.config.window_seconds;
        // A window that would not advance falls back to back-to-back windows
        let step = match window - self.config.overlap_seconds {
            step if step > 0.0 => step,
            _ => window,
        };

        let mut chunks = Vec::new();
        let mut window_start = first.start;

        while window_start <= last_end {
            let window_end = window_start + window;
            let content: Vec<&str> = words
                .iter()
                .filter(|w| w.start >= window_start && w.start < window_end)
                .map(|w| w.word.as_str())
                .collect();

            // A silent window ends chunking rather than emitting an empty chunk
            if content.is_empty() {
                break;
            }

            chunks.push(Chunk {
                index: chunks.len(),
                text: content.join(" "),
                start_time: window_start,
                end_time: window_end.min(last_end).max(window_start),
                word_count: content.len(),
            });

            window_start += step;
        }

        chunks
    }

    fn chunk_estimated(&self, words: &[&str], duration: f64) -> Vec<Chunk> {
        if words.is_empty() {
            return Vec::new();
        }

        let words_per_second = words.len() as f64 / duration;
        let window_words = ((self.config.window_seconds * words_per_second).round() as usize).max(1);
        let overlap_words = ((self.config.overlap_seconds * words_per_second).round() as usize)
            .min(window_words - 1);

        slide_words(words, window_words, overlap_words, |idx| {
            (idx as f64 / words_per_second).min(duration)
        })
    }
}

/// Slide a word-count window over `words`, mapping word offsets to times.
fn slide_words(
    words: &[&str],
    window_words: usize,
    overlap_words: usize,
    time_at: impl Fn(usize) -> f64,
) -> Vec<Chunk> {
    let window_words = window_words.max(1);
    let step = window_words.saturating_sub(overlap_words).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + window_words).min(words.len());
        chunks.push(Chunk {
            index: chunks.len(),
            text: words[start..end].join(" "),
            start_time: time_at(start),
            end_time: time_at(end),
            word_count: end - start,
        });

        if end == words.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Chunk a transcript with the default window geometry.
pub fn chunk_transcript(
    text: &str,
    word_timestamps: Option<&[WordTimestamp]>,
    total_duration: Option<f64>,
) -> Vec<Chunk> {
    TranscriptChunker::default().chunk(text, word_timestamps, total_duration)
}
