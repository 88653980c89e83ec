//! Connection lifecycle: connect, run one session at a time, send, stop and
//! dispose. Emitted messages and disconnects are published to any number of
//! subscribers.

pub use session::Disconnect;
pub use state::ClientState;
pub use stats::{ClientStats, StatsSnapshot};
pub use tcp_client::{MessageReceiver, TcpClient};

mod session;
mod state;
mod stats;
mod tcp_client;
