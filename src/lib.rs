pub mod client;
pub mod dispatch;
mod message;
pub mod network;
pub mod service;
mod utils;

pub use client::{ClientState, Disconnect, MessageReceiver, StatsSnapshot, TcpClient};
pub use dispatch::{
    DispatchReport, Dispatcher, MessageObserver, MessageSource, MessageSubscriber,
    ObserverCompletion, ObserverEvent, ObserverStream,
};
pub use message::TcpMessage;
pub use network::DisconnectReason;
pub use service::{
    setup_local_tracing, setup_tracing, AppConfig, AppError, AppResult, ClientConfig, ClientHost,
    ConsumerError, HostExit, LogConfig, LogGuard,
};
pub use utils::{Notifier, NotifyReceiver};
