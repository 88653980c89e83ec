use std::io;
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::message::TcpMessage;
use crate::service::{AppError, AppResult, ClientConfig, Shutdown};
use crate::utils::{Notifier, NotifyReceiver};

use super::session::{ConnectionSession, SessionSinks};
use super::{ClientState, ClientStats, Disconnect, StatsSnapshot};

/// Receiver of emitted messages, see [`TcpClient::subscribe`].
pub type MessageReceiver = NotifyReceiver<TcpMessage>;

/// Long-lived TCP client that frames the inbound stream by idle timeout.
///
/// Each call to [`start`](Self::start) connects and opens a fresh session
/// with its own reader task and idle timer. Emitted frames are multicast to
/// every receiver obtained from [`subscribe`](Self::subscribe).
///
/// ```ignore
/// let client = TcpClient::new(ClientConfig::new("127.0.0.1", 4001))?;
/// let messages = client.subscribe();
/// client.start().await?;
/// client.send("PING").await?;
/// while let Ok(message) = messages.recv().await {
///     println!("{message}");
/// }
/// ```
pub struct TcpClient {
    config: ClientConfig,
    state: Mutex<ClientState>,
    // state transitions happen under this lock; the connect itself does not
    session: tokio::sync::Mutex<Option<ConnectionSession>>,
    // present while a connect is in flight
    connect_cancel: Mutex<Option<broadcast::Sender<()>>>,
    messages: Arc<Notifier<TcpMessage>>,
    disconnects: Arc<Notifier<Disconnect>>,
    stats: Arc<ClientStats>,
}

impl TcpClient {
    pub fn new(config: ClientConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(TcpClient {
            config,
            state: Mutex::new(ClientState::Idle),
            session: tokio::sync::Mutex::new(None),
            connect_cancel: Mutex::new(None),
            messages: Arc::new(Notifier::new()),
            disconnects: Arc::new(Notifier::new()),
            stats: Arc::new(ClientStats::default()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn address(&self) -> String {
        self.config.address()
    }

    pub fn state(&self) -> ClientState {
        *self.state.lock()
    }

    fn set_state(&self, state: ClientState) {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        debug!(from = %previous, to = %state, "client state changed");
    }

    /// Every emitted message is delivered to every live receiver.
    pub fn subscribe(&self) -> MessageReceiver {
        self.messages.subscribe()
    }

    /// Notified whenever a session's read loop ends, including after `stop`.
    pub fn disconnects(&self) -> NotifyReceiver<Disconnect> {
        self.disconnects.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// When the most recent frame was emitted.
    pub fn last_output_time(&self) -> Option<DateTime<Local>> {
        self.stats.last_output()
    }

    /// Connects and starts receiving.
    ///
    /// Valid from `Idle` and `Stopped`. A failed connect leaves the client
    /// `Idle` so it can be retried; there is no automatic retry. The connect
    /// runs outside the session lock, so `stop` or `dispose` can cancel it,
    /// in which case this returns `StartCancelled` (or `Disposed`).
    pub async fn start(&self) -> AppResult<()> {
        let (own_cancel, mut cancelled) = {
            let _session = self.session.lock().await;
            match self.state() {
                ClientState::Disposed => return Err(AppError::Disposed),
                ClientState::Starting | ClientState::Running | ClientState::Stopping => {
                    return Err(AppError::AlreadyStarted)
                }
                ClientState::Idle | ClientState::Stopped => {}
            }
            self.set_state(ClientState::Starting);
            let (cancel_tx, cancel_rx) = broadcast::channel(1);
            *self.connect_cancel.lock() = Some(cancel_tx.clone());
            (cancel_tx, Shutdown::new(cancel_rx))
        };

        let sinks = SessionSinks {
            messages: self.messages.clone(),
            disconnects: self.disconnects.clone(),
            stats: self.stats.clone(),
        };
        let opened = tokio::select! {
            opened = ConnectionSession::open(&self.config, sinks) => opened,
            _ = cancelled.recv() => Err(AppError::StartCancelled),
        };

        let mut session = self.session.lock().await;
        // a stop takes the sender; a later start may already have installed its own
        let still_ours = {
            let mut slot = self.connect_cancel.lock();
            let ours = matches!(slot.as_ref(), Some(tx) if tx.same_channel(&own_cancel));
            if ours {
                slot.take();
            }
            ours
        };
        let state = self.state();
        if !still_ours || state != ClientState::Starting {
            // stop or dispose ran while connecting
            if let Ok(opened) = opened {
                opened.close().await;
            }
            info!(address = %self.config.address(), %state, "tcp client start cancelled");
            return Err(match self.state() {
                ClientState::Disposed => AppError::Disposed,
                _ => AppError::StartCancelled,
            });
        }

        match opened {
            Ok(opened) => {
                info!(
                    session_id = opened.id(),
                    address = %self.config.address(),
                    "tcp client started"
                );
                *session = Some(opened);
                self.set_state(ClientState::Running);
                Ok(())
            }
            Err(e) => {
                error!(address = %self.config.address(), error = %e, "tcp client failed to start");
                self.set_state(ClientState::Idle);
                Err(e)
            }
        }
    }

    fn cancel_connect(&self) {
        if let Some(cancel) = self.connect_cancel.lock().take() {
            let _ = cancel.send(());
        }
    }

    /// Writes `text` as UTF-8. Write errors are returned, never swallowed,
    /// and do not change the client state.
    ///
    /// A send still pending when the session is closed fails with an
    /// `Interrupted` `SendFailed`; part of `text` may already have been sent.
    pub async fn send(&self, text: &str) -> AppResult<()> {
        match self.state() {
            ClientState::Running => {}
            ClientState::Disposed => return Err(AppError::Disposed),
            _ => return Err(AppError::NotConnected),
        }
        let (writer, mut shutdown) = {
            let session = self.session.lock().await;
            match session.as_ref() {
                Some(session) if session.is_connected() => {
                    (session.writer(), session.shutdown_signal())
                }
                _ => return Err(AppError::NotConnected),
            }
        };
        let interrupted = || {
            AppError::SendFailed(io::Error::new(
                io::ErrorKind::Interrupted,
                "session closed while sending",
            ))
        };

        let mut writer = tokio::select! {
            writer = writer.lock() => writer,
            _ = shutdown.recv() => return Err(interrupted()),
        };
        tokio::select! {
            written = writer.write_all(text.as_bytes()) => {
                written.map_err(AppError::SendFailed)?
            }
            _ = shutdown.recv() => return Err(interrupted()),
        }
        debug!(bytes = text.len(), "sent message");
        Ok(())
    }

    /// Stops the session, or cancels a connect still in progress. A no-op
    /// when nothing is running.
    pub async fn stop(&self) -> AppResult<()> {
        let mut session = self.session.lock().await;
        let state = self.state();
        if state == ClientState::Disposed {
            return Err(AppError::Disposed);
        }
        if !state.is_active() {
            return Ok(());
        }
        if state == ClientState::Starting {
            self.cancel_connect();
            self.set_state(ClientState::Stopped);
            info!(address = %self.config.address(), "tcp client stopped while connecting");
            return Ok(());
        }

        self.set_state(ClientState::Stopping);
        if let Some(session) = session.take() {
            session.close().await;
        }
        self.set_state(ClientState::Stopped);
        info!(address = %self.config.address(), "tcp client stopped");
        Ok(())
    }

    /// Releases the session and ends every subscriber stream. Idempotent.
    pub async fn dispose(&self) {
        let mut session = self.session.lock().await;
        if self.state() == ClientState::Disposed {
            return;
        }
        self.cancel_connect();
        if let Some(session) = session.take() {
            session.close().await;
        }
        self.set_state(ClientState::Disposed);
        self.messages.close();
        self.disconnects.close();
        info!(address = %self.config.address(), "tcp client disposed");
    }
}

impl std::fmt::Debug for TcpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpClient")
            .field("address", &self.config.address())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TcpClient {
        TcpClient::new(ClientConfig::new("127.0.0.1", 1)).unwrap()
    }

    #[test]
    fn new_client_is_idle() {
        let client = client();
        assert_eq!(client.state(), ClientState::Idle);
        assert_eq!(client.address(), "127.0.0.1:1");
        assert_eq!(client.stats(), StatsSnapshot::default());
        assert!(client.last_output_time().is_none());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = TcpClient::new(ClientConfig::new("127.0.0.1", 1).with_idle_timeout_ms(0));
        assert!(matches!(result, Err(AppError::InvalidValue(_))));
    }

    #[tokio::test]
    async fn send_before_start_is_not_connected() {
        let client = client();
        assert!(matches!(
            client.send("x").await,
            Err(AppError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn stop_when_idle_is_a_no_op() {
        let client = client();
        client.stop().await.unwrap();
        assert_eq!(client.state(), ClientState::Idle);
    }

    #[tokio::test]
    async fn dispose_twice_then_everything_fails() {
        let client = client();
        let messages = client.subscribe();
        client.dispose().await;
        client.dispose().await;

        assert_eq!(client.state(), ClientState::Disposed);
        assert!(matches!(client.start().await, Err(AppError::Disposed)));
        assert!(matches!(client.send("x").await, Err(AppError::Disposed)));
        assert!(matches!(client.stop().await, Err(AppError::Disposed)));
        assert!(messages.recv().await.is_err());
    }
}
