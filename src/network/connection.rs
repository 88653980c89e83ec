use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::client::ClientStats;
use crate::network::{AppendOutcome, FrameAccumulator};
use crate::service::Shutdown;

/// Why a session's read loop ended.
#[derive(Debug, Clone)]
pub enum DisconnectReason {
    /// The peer closed its side of the stream (read returned 0).
    RemoteClosed,
    /// A read failed. The session cannot receive anymore.
    ReadFailed(Arc<io::Error>),
    /// The session was stopped locally.
    Cancelled,
}

impl DisconnectReason {
    /// `false` only for a locally requested stop.
    pub fn is_unexpected(&self) -> bool {
        !matches!(self, DisconnectReason::Cancelled)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::RemoteClosed => write!(f, "closed by remote peer"),
            DisconnectReason::ReadFailed(e) => write!(f, "read failed: {}", e),
            DisconnectReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Incremental UTF-8 decoder.
///
/// A multi-byte character split across two reads is held back until the
/// rest of it arrives. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    pending: BytesMut,
}

impl Utf8Decoder {
    pub(crate) fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.advance(valid + invalid);
                        }
                        None => {
                            // incomplete trailing character, wait for more bytes
                            self.pending.advance(valid);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flushes a dangling partial character at end of stream.
    pub(crate) fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Pumps bytes from the socket into the session's [`FrameAccumulator`].
///
/// This loop is the only writer of appends for its session.
pub struct ConnectionReader<R> {
    session_id: u64,
    reader: R,
    buffer: BytesMut,
    read_size: usize,
    decoder: Utf8Decoder,
    accumulator: Arc<Mutex<FrameAccumulator>>,
    stats: Arc<ClientStats>,
}

impl<R: AsyncRead + Unpin> ConnectionReader<R> {
    pub fn new(
        session_id: u64,
        reader: R,
        read_size: usize,
        accumulator: Arc<Mutex<FrameAccumulator>>,
        stats: Arc<ClientStats>,
    ) -> Self {
        ConnectionReader {
            session_id,
            reader,
            buffer: BytesMut::with_capacity(read_size),
            read_size,
            decoder: Utf8Decoder::default(),
            accumulator,
            stats,
        }
    }

    /// Reads until the peer closes, a read fails, or `shutdown` fires.
    ///
    /// Errors are not returned: they end the loop and are reported as the
    /// [`DisconnectReason`]. A read that is already in flight when shutdown
    /// is signalled is abandoned.
    pub async fn run(mut self, mut shutdown: Shutdown) -> DisconnectReason {
        loop {
            self.buffer.clear();
            self.buffer.reserve(self.read_size);

            let read = tokio::select! {
                res = self.reader.read_buf(&mut self.buffer) => res,
                _ = shutdown.recv() => {
                    debug!(session_id = self.session_id, "reader received shutdown signal");
                    return DisconnectReason::Cancelled;
                }
            };

            match read {
                Ok(0) => {
                    let rest = self.decoder.finish();
                    if !rest.is_empty() {
                        self.append(&rest);
                    }
                    debug!(session_id = self.session_id, "remote peer closed the stream");
                    return DisconnectReason::RemoteClosed;
                }
                Ok(n) => {
                    self.stats.record_bytes(n);
                    let text = self.decoder.decode(&self.buffer[..n]);
                    trace!(session_id = self.session_id, bytes = n, "read chunk");
                    self.append(&text);
                }
                Err(e) => {
                    warn!(session_id = self.session_id, error = %e, "read loop terminated");
                    return DisconnectReason::ReadFailed(Arc::new(e));
                }
            }
        }
    }

    fn append(&self, text: &str) {
        let outcome = self.accumulator.lock().append(text, Instant::now());
        if let AppendOutcome::Discarded { dropped_chars } = outcome {
            self.stats.record_discard();
            warn!(
                session_id = self.session_id,
                dropped_chars,
                "frame exceeded max message length, buffer discarded"
            );
        }
    }
}
