//! Decides which incoming agent messages should be spoken aloud
//!
//! Audio output itself is behind the [`Speaker`] trait.

use crate::session::{Message, Sender};
use crate::state::ChatEntry;
use tracing::debug;

/// Messages older than this (relative to now) are never spoken
pub const MAX_SPEECH_AGE_MS: i64 = 10_000;

/// Something that can say text out loud
pub trait Speaker: Send {
    /// Speak `text`; implementations decide whether to queue or interrupt
    fn speak(&mut self, text: &str);
}

/// Speaker that only logs what it would say
#[derive(Debug, Default)]
pub struct LogSpeaker;

impl Speaker for LogSpeaker {
    fn speak(&mut self, text: &str) {
        tracing::info!(text = %text, "Speaking");
    }
}

/// The fields the gate looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpokenItem {
    /// Who wrote it
    pub sender: Sender,
    /// What to say
    pub text: String,
    /// Creation time in Unix milliseconds
    pub timestamp_ms: i64,
}

impl From<&ChatEntry> for SpokenItem {
    fn from(entry: &ChatEntry) -> Self {
        Self {
            sender: entry.sender,
            text: entry.text.clone(),
            timestamp_ms: entry.timestamp,
        }
    }
}

impl From<&Message> for SpokenItem {
    fn from(message: &Message) -> Self {
        Self {
            sender: message.sender,
            text: message.text.clone(),
            timestamp_ms: message.created_at.timestamp_millis(),
        }
    }
}

/// Watermark over already-processed messages
///
/// Every observed item advances the watermark, whatever its sender. Only
/// agent items newer than the previous watermark and at most
/// [`MAX_SPEECH_AGE_MS`] old are returned for speaking.
#[derive(Debug, Clone, Default)]
pub struct SpeechGate {
    watermark_ms: i64,
}

impl SpeechGate {
    /// Gate that has seen nothing yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest timestamp processed so far
    pub fn watermark(&self) -> i64 {
        self.watermark_ms
    }

    /// Process a batch and return the texts to speak, oldest first
    pub fn observe<'a, I>(&mut self, items: I, now_ms: i64) -> Vec<String>
    where
        I: IntoIterator<Item = &'a SpokenItem>,
    {
        let previous = self.watermark_ms;
        let mut to_speak: Vec<(i64, String)> = Vec::new();

        for item in items {
            self.watermark_ms = self.watermark_ms.max(item.timestamp_ms);

            let is_new = item.timestamp_ms > previous;
            let is_fresh = now_ms - item.timestamp_ms <= MAX_SPEECH_AGE_MS;
            if item.sender == Sender::Agent && is_new && is_fresh {
                to_speak.push((item.timestamp_ms, item.text.clone()));
            }
        }

        to_speak.sort_by_key(|(timestamp, _)| *timestamp);
        if !to_speak.is_empty() {
            debug!(count = to_speak.len(), watermark = self.watermark_ms, "Speech gate opened");
        }
        to_speak.into_iter().map(|(_, text)| text).collect()
    }

    /// Observe a batch and hand each selected text to `speaker`
    pub fn speak_new<'a, I>(&mut self, items: I, now_ms: i64, speaker: &mut dyn Speaker) -> usize
    where
        I: IntoIterator<Item = &'a SpokenItem>,
    {
        let texts = self.observe(items, now_ms);
        for text in &texts {
            speaker.speak(text);
        }
        texts.len()
    }
}
