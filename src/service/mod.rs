pub use app_error::{AppError, AppResult, ConsumerError};
pub use config::{AppConfig, ClientConfig, LogConfig};
pub use host::{ClientHost, HostExit};
pub use shutdown::Shutdown;
pub use tracing_config::{setup_local_tracing, setup_tracing, LogGuard};

mod app_error;
mod config;
mod host;
mod shutdown;
mod tracing_config;
