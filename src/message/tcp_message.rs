use std::fmt;

use chrono::{DateTime, Local};

/// One frame reconstructed from the byte stream.
///
/// `received_at` is the arrival time of the first byte of the run, not the
/// time the frame was emitted. Values are never mutated after construction;
/// every consumer gets its own clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpMessage {
    content: String,
    received_at: DateTime<Local>,
    session_id: u64,
}

impl TcpMessage {
    pub fn new(content: impl Into<String>, received_at: DateTime<Local>, session_id: u64) -> Self {
        TcpMessage {
            content: content.into(),
            received_at,
            session_id,
        }
    }

    /// Message stamped with the current time, outside of any session.
    pub fn now(content: impl Into<String>) -> Self {
        Self::new(content, Local::now(), 0)
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn received_at(&self) -> DateTime<Local> {
        self.received_at
    }

    /// Id of the connection session that produced this message.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Length in characters.
    pub fn length(&self) -> usize {
        self.content.chars().count()
    }

    /// `true` when the content is empty or whitespace only.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }

    pub fn into_content(self) -> String {
        self.content
    }
}

impl fmt::Display for TcpMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.received_at.format("%Y-%m-%d %H:%M:%S"),
            self.content
        )
    }
}
