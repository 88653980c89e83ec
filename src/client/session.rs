use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tracing::{debug, info, warn};

use crate::message::TcpMessage;
use crate::network::{ConnectionReader, DisconnectReason, FrameAccumulator, IdleTimer};
use crate::service::{AppError, AppResult, ClientConfig, Shutdown};
use crate::utils::Notifier;

use super::ClientStats;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// unbuffered, so a cancelled send leaves nothing for shutdown to flush
pub(crate) type SessionWriter = Arc<tokio::sync::Mutex<OwnedWriteHalf>>;

/// Published when a session's read loop ends.
#[derive(Debug, Clone)]
pub struct Disconnect {
    pub session_id: u64,
    pub address: String,
    pub reason: DisconnectReason,
}

/// Shared sinks a session reports into.
#[derive(Clone)]
pub(crate) struct SessionSinks {
    pub messages: Arc<Notifier<TcpMessage>>,
    pub disconnects: Arc<Notifier<Disconnect>>,
    pub stats: Arc<ClientStats>,
}

/// One connect/disconnect cycle. Never reused: every start opens a new one.
pub(crate) struct ConnectionSession {
    id: u64,
    writer: SessionWriter,
    connected: Arc<AtomicBool>,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_rx: mpsc::Receiver<()>,
    closed: bool,
}

async fn connect(config: &ClientConfig) -> AppResult<TcpStream> {
    let address = config.address();
    let connect = TcpStream::connect(address.as_str());
    let result = match config.connect_timeout() {
        Some(timeout) => time::timeout(timeout, connect)
            .await
            .map_err(|_| AppError::ConnectTimeout(address.clone()))?,
        None => connect.await,
    };
    result.map_err(|source| AppError::ConnectFailed { address, source })
}

impl ConnectionSession {
    /// Connects and spawns the reader and idle timer tasks.
    pub(crate) async fn open(config: &ClientConfig, sinks: SessionSinks) -> AppResult<Self> {
        let stream = connect(config).await?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "failed to set TCP_NODELAY");
        }
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let address = config.address();
        let (reader, writer) = stream.into_split();

        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, shutdown_complete_rx) = mpsc::channel::<()>(1);
        let accumulator = Arc::new(Mutex::new(FrameAccumulator::new(
            config.max_message_length,
        )));
        let connected = Arc::new(AtomicBool::new(true));

        let connection_reader = ConnectionReader::new(
            id,
            reader,
            config.effective_read_buffer_size(),
            accumulator.clone(),
            sinks.stats.clone(),
        );
        let reader_shutdown = Shutdown::new(notify_shutdown.subscribe());
        let reader_complete_tx = shutdown_complete_tx.clone();
        let reader_connected = connected.clone();
        let disconnects = sinks.disconnects.clone();
        tokio::spawn(async move {
            let reason = connection_reader.run(reader_shutdown).await;
            reader_connected.store(false, Ordering::Release);
            if reason.is_unexpected() {
                warn!(session_id = id, %address, %reason, "connection lost");
            }
            disconnects.publish(Disconnect {
                session_id: id,
                address,
                reason,
            });
            drop(reader_complete_tx);
        });

        let idle_timer = IdleTimer::new(
            id,
            config.idle_timeout(),
            accumulator,
            sinks.messages.clone(),
            sinks.stats.clone(),
        );
        let timer_shutdown = Shutdown::new(notify_shutdown.subscribe());
        tokio::spawn(async move {
            idle_timer.run(timer_shutdown).await;
            drop(shutdown_complete_tx);
        });

        info!(session_id = id, address = %config.address(), "session opened");
        Ok(ConnectionSession {
            id,
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            connected,
            notify_shutdown,
            shutdown_complete_rx,
            closed: false,
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// `false` once the read loop has ended.
    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn writer(&self) -> SessionWriter {
        self.writer.clone()
    }

    /// Fires when the session is closed; lets a pending send give up its
    /// hold on the writer.
    pub(crate) fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }

    /// Cancels both tasks and any pending send, waits for the tasks to exit,
    /// then closes the socket.
    pub(crate) async fn close(mut self) {
        self.closed = true;
        let _ = self.notify_shutdown.send(());
        // every task holds a sender; recv returns None once all have exited
        let _ = self.shutdown_complete_rx.recv().await;
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!(session_id = self.id, error = %e, "socket shutdown failed");
        }
        info!(session_id = self.id, "session closed");
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // stop background tasks even when the session was not closed explicitly
        let _ = self.notify_shutdown.send(());
        debug!(session_id = self.id, "connection session dropped");
    }
}
