use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use parking_lot::Mutex;

/// Diagnostic counters shared by the reader and the idle timer.
#[derive(Debug, Default)]
pub struct ClientStats {
    bytes_received: AtomicU64,
    frames_emitted: AtomicU64,
    frames_discarded: AtomicU64,
    last_output: Mutex<Option<DateTime<Local>>>,
}

/// Point-in-time copy of [`ClientStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub bytes_received: u64,
    pub frames_emitted: u64,
    pub frames_discarded: u64,
    pub last_output: Option<DateTime<Local>>,
}

impl ClientStats {
    pub(crate) fn record_bytes(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_discard(&self) {
        self.frames_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_emit(&self, at: DateTime<Local>) {
        self.frames_emitted.fetch_add(1, Ordering::Relaxed);
        *self.last_output.lock() = Some(at);
    }

    pub fn last_output(&self) -> Option<DateTime<Local>> {
        *self.last_output.lock()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
            last_output: self.last_output(),
        }
    }
}
