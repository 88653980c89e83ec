use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::client::{Disconnect, TcpClient};
use crate::dispatch::Dispatcher;
use crate::network::DisconnectReason;
use crate::utils::NotifyReceiver;

use super::AppResult;

/// Why [`ClientHost::run_until`] returned.
#[derive(Debug, Clone)]
pub enum HostExit {
    /// The shutdown future completed.
    Signal,
    /// The connection ended on its own; the owner decides whether to restart.
    ConnectionLost(Disconnect),
}

/// Wires a [`TcpClient`] to a [`Dispatcher`] and manages both lifetimes.
pub struct ClientHost {
    client: Arc<TcpClient>,
    dispatcher: Option<Dispatcher>,
    dispatch_task: Option<JoinHandle<()>>,
    disconnects: NotifyReceiver<Disconnect>,
}

impl ClientHost {
    pub fn new(client: TcpClient, dispatcher: Dispatcher) -> Self {
        let disconnects = client.disconnects();
        ClientHost {
            client: Arc::new(client),
            dispatcher: Some(dispatcher),
            dispatch_task: None,
            disconnects,
        }
    }

    pub fn client(&self) -> &Arc<TcpClient> {
        &self.client
    }

    /// Subscribes the dispatcher, then connects.
    pub async fn start(&mut self) -> AppResult<()> {
        if let Some(dispatcher) = self.dispatcher.take() {
            self.dispatch_task = Some(dispatcher.spawn(self.client.subscribe()));
        }
        match self.client.start().await {
            Ok(()) => {
                info!(address = %self.client.address(), "tcp client service started");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "error starting tcp client service");
                Err(e)
            }
        }
    }

    /// Waits for `shutdown` or for the connection to drop, whichever is first.
    pub async fn run_until<F: Future>(&self, shutdown: F) -> HostExit {
        tokio::select! {
            _ = shutdown => {
                info!("get shutdown signal");
                HostExit::Signal
            }
            disconnect = self.next_unexpected_disconnect() => {
                match disconnect {
                    Some(disconnect) => HostExit::ConnectionLost(disconnect),
                    // notifier closed: the client was disposed elsewhere
                    None => HostExit::Signal,
                }
            }
        }
    }

    async fn next_unexpected_disconnect(&self) -> Option<Disconnect> {
        while let Ok(disconnect) = self.disconnects.recv().await {
            if disconnect.reason.is_unexpected() {
                return Some(disconnect);
            }
        }
        None
    }

    /// Stops and disposes the client, then waits for the dispatcher to drain.
    pub async fn stop(&mut self) -> AppResult<()> {
        let stopped = self.client.stop().await;
        if let Err(e) = &stopped {
            warn!(error = %e, "error stopping tcp client service");
        }
        self.client.dispose().await;
        if let Some(task) = self.dispatch_task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "dispatcher task failed");
            }
        }
        info!("tcp client service stopped");
        stopped
    }
}

impl HostExit {
    pub fn reason(&self) -> Option<&DisconnectReason> {
        match self {
            HostExit::Signal => None,
            HostExit::ConnectionLost(disconnect) => Some(&disconnect.reason),
        }
    }
}
