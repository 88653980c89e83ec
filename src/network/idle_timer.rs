use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use parking_lot::Mutex;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::client::ClientStats;
use crate::message::TcpMessage;
use crate::network::FrameAccumulator;
use crate::service::Shutdown;
use crate::utils::Notifier;

/// Periodic idle check that turns a quiet buffer into a [`TcpMessage`].
///
/// Ticks every `idle` period, the same value used as the quiet threshold, so
/// a frame is emitted between one and two periods after its last byte.
pub struct IdleTimer {
    session_id: u64,
    idle: Duration,
    accumulator: Arc<Mutex<FrameAccumulator>>,
    messages: Arc<Notifier<TcpMessage>>,
    stats: Arc<ClientStats>,
}

impl IdleTimer {
    pub fn new(
        session_id: u64,
        idle: Duration,
        accumulator: Arc<Mutex<FrameAccumulator>>,
        messages: Arc<Notifier<TcpMessage>>,
        stats: Arc<ClientStats>,
    ) -> Self {
        IdleTimer {
            session_id,
            idle,
            accumulator,
            messages,
            stats,
        }
    }

    /// One idle check. Returns the message it published, if any.
    pub fn tick(&self, now: Instant) -> Option<TcpMessage> {
        // check and take under a single lock acquisition
        let frame = self.accumulator.lock().take_if_idle(now, self.idle)?;

        let message = TcpMessage::new(frame.content, frame.started_at, self.session_id);
        self.stats.record_emit(Local::now());
        let receivers = self.messages.publish(message.clone());
        trace!(
            session_id = self.session_id,
            length = message.length(),
            receivers,
            "emitted frame"
        );
        Some(message)
    }

    pub async fn run(self, mut shutdown: Shutdown) {
        let mut interval = time::interval_at(Instant::now() + self.idle, self.idle);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!(session_id = self.session_id, "idle timer received shutdown signal");
                    break;
                }
                _ = interval.tick() => {
                    self.tick(Instant::now());
                }
            }
        }
    }
}
