use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::Instant;

/// A completed run of text taken out of the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub content: String,
    /// Wall-clock arrival of the first byte of the run.
    pub started_at: DateTime<Local>,
}

/// Result of [`FrameAccumulator::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Buffered,
    /// The run grew past the limit and everything buffered so far was dropped.
    Discarded { dropped_chars: usize },
}

/// Idle-timeout framing state for one connection session.
///
/// There is no delimiter: a frame is complete once no bytes have arrived for
/// the idle threshold. Back-to-back sends closer together than the threshold
/// coalesce into a single frame.
///
/// The accumulator does no locking of its own. The reader and the idle timer
/// share it behind one mutex, and [`take_if_idle`](Self::take_if_idle) keeps
/// the idle check and the take inside the same critical section so an append
/// can never slip in between them.
#[derive(Debug)]
pub struct FrameAccumulator {
    buffer: String,
    char_len: usize,
    max_length: usize,
    last_receive: Option<Instant>,
    frame_started_at: Option<DateTime<Local>>,
}

impl FrameAccumulator {
    pub fn new(max_length: usize) -> Self {
        FrameAccumulator {
            buffer: String::new(),
            char_len: 0,
            max_length,
            last_receive: None,
            frame_started_at: None,
        }
    }

    /// Appends decoded text and records `now` as the last receive time.
    ///
    /// Exceeding `max_length` clears the whole buffer instead of truncating it.
    pub fn append(&mut self, text: &str, now: Instant) -> AppendOutcome {
        self.last_receive = Some(now);
        if text.is_empty() {
            return AppendOutcome::Buffered;
        }
        if self.buffer.is_empty() {
            self.frame_started_at = Some(Local::now());
        }
        self.buffer.push_str(text);
        self.char_len += text.chars().count();

        if self.char_len > self.max_length {
            let dropped_chars = self.char_len;
            self.clear();
            return AppendOutcome::Discarded { dropped_chars };
        }
        AppendOutcome::Buffered
    }

    pub fn should_emit(&self, now: Instant, idle_threshold: Duration) -> bool {
        match self.last_receive {
            Some(last) if !self.buffer.is_empty() => {
                now.saturating_duration_since(last) >= idle_threshold
            }
            _ => false,
        }
    }

    /// Empties the buffer and returns its content, `None` when nothing is buffered.
    pub fn take_frame(&mut self) -> Option<Frame> {
        if self.buffer.is_empty() {
            return None;
        }
        let content = std::mem::take(&mut self.buffer);
        let started_at = self.frame_started_at.take().unwrap_or_else(Local::now);
        self.char_len = 0;
        Some(Frame {
            content,
            started_at,
        })
    }

    /// `should_emit` followed by `take_frame` as one step.
    pub fn take_if_idle(&mut self, now: Instant, idle_threshold: Duration) -> Option<Frame> {
        if self.should_emit(now, idle_threshold) {
            self.take_frame()
        } else {
            None
        }
    }

    /// Buffered length in characters.
    pub fn len(&self) -> usize {
        self.char_len
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn last_receive(&self) -> Option<Instant> {
        self.last_receive
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.char_len = 0;
        self.frame_started_at = None;
    }
}
