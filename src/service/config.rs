use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dispatch::ObserverCompletion;

use super::{AppError, AppResult};

const ENV_PREFIX: &str = "QUIETWIRE";

/// Connection and framing settings for one [`TcpClient`](crate::TcpClient).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub server_address: String,
    pub server_port: u16,
    /// Quiet period that ends a frame; also the idle timer's tick period.
    pub idle_timeout_ms: u64,
    /// Frame ceiling in decoded characters. A longer run is discarded.
    pub max_message_length: usize,
    /// 0 waits for the OS connect timeout.
    pub connect_timeout_ms: u64,
    /// 0 sizes the socket read buffer from `max_message_length`.
    pub read_buffer_size: usize,
    pub observer_completion: ObserverCompletion,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server_address: "127.0.0.1".to_string(),
            server_port: 4001,
            idle_timeout_ms: 100,
            max_message_length: 1024,
            connect_timeout_ms: 5000,
            read_buffer_size: 0,
            observer_completion: ObserverCompletion::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(server_address: impl Into<String>, server_port: u16) -> Self {
        ClientConfig {
            server_address: server_address.into(),
            server_port,
            ..Default::default()
        }
    }

    pub fn with_idle_timeout_ms(mut self, idle_timeout_ms: u64) -> Self {
        self.idle_timeout_ms = idle_timeout_ms;
        self
    }

    pub fn with_max_message_length(mut self, max_message_length: usize) -> Self {
        self.max_message_length = max_message_length;
        self
    }

    pub fn with_connect_timeout_ms(mut self, connect_timeout_ms: u64) -> Self {
        self.connect_timeout_ms = connect_timeout_ms;
        self
    }

    pub fn with_observer_completion(mut self, completion: ObserverCompletion) -> Self {
        self.observer_completion = completion;
        self
    }

    /// `host:port` used both for connecting and for log fields.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server_address, self.server_port)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }

    pub fn effective_read_buffer_size(&self) -> usize {
        if self.read_buffer_size > 0 {
            self.read_buffer_size
        } else {
            self.max_message_length.max(64)
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.server_address.trim().is_empty() {
            return Err(AppError::InvalidValue(
                "server_address must not be empty".to_string(),
            ));
        }
        if self.idle_timeout_ms == 0 {
            return Err(AppError::InvalidValue(
                "idle_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_message_length == 0 {
            return Err(AppError::InvalidValue(
                "max_message_length must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Directory of the hourly rolling log file.
    pub dir: String,
    pub file_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            dir: "logs".to_string(),
            file_name: "quietwire.log".to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub tcp_client: ClientConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// Loads the config file (if it exists) and layers `QUIETWIRE__*`
    /// environment variables over it, e.g.
    /// `QUIETWIRE__TCP_CLIENT__SERVER_PORT=4002`.
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<AppConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.tcp_client.validate()?;

        Ok(app_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_follow_documented_values() {
        let config = ClientConfig::default();
        assert_eq!(config.server_port, 4001);
        assert_eq!(config.idle_timeout_ms, 100);
        assert_eq!(config.max_message_length, 1024);
        assert_eq!(config.observer_completion, ObserverCompletion::OnShutdown);
        assert_eq!(config.effective_read_buffer_size(), 1024);
        assert_eq!(config.address(), "127.0.0.1:4001");
    }

    #[test]
    fn validate_rejects_zero_timeout_and_length() {
        assert!(ClientConfig::default()
            .with_idle_timeout_ms(0)
            .validate()
            .is_err());
        assert!(ClientConfig::default()
            .with_max_message_length(0)
            .validate()
            .is_err());
        assert!(ClientConfig::new(" ", 1).validate().is_err());
        assert!(ClientConfig::new("localhost", 9000).validate().is_ok());
    }

    #[test]
    fn connect_timeout_zero_disables_it() {
        assert_eq!(
            ClientConfig::default().with_connect_timeout_ms(0).connect_timeout(),
            None
        );
        assert_eq!(
            ClientConfig::default().connect_timeout(),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn load_from_toml_file() -> AppResult<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            r#"
[tcp_client]
server_address = "10.1.2.3"
server_port = 5000
idle_timeout_ms = 250
observer_completion = "per_message"

[log]
dir = "/var/log/quietwire"
"#
        )?;

        let config = AppConfig::set_up_config(file.path())?;
        assert_eq!(config.tcp_client.server_address, "10.1.2.3");
        assert_eq!(config.tcp_client.server_port, 5000);
        assert_eq!(config.tcp_client.idle_timeout_ms, 250);
        // not present in the file, falls back to the default
        assert_eq!(config.tcp_client.max_message_length, 1024);
        assert_eq!(
            config.tcp_client.observer_completion,
            ObserverCompletion::PerMessage
        );
        assert_eq!(config.log.dir, "/var/log/quietwire");
        assert_eq!(config.log.file_name, "quietwire.log");
        Ok(())
    }

    #[test]
    fn missing_file_yields_defaults() -> AppResult<()> {
        let dir = tempfile::tempdir()?;
        let config = AppConfig::set_up_config(dir.path().join("absent.toml"))?;
        assert_eq!(config.tcp_client.server_port, 4001);
        Ok(())
    }

    #[test]
    fn invalid_values_in_file_are_rejected() -> AppResult<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(file, "[tcp_client]\nidle_timeout_ms = 0")?;
        let result = AppConfig::set_up_config(file.path());
        assert!(matches!(result, Err(AppError::InvalidValue(_))));
        Ok(())
    }
}
