// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub type AppResult<T> = Result<T, AppError>;

/// Error type returned by consumers (subscribers, observers, callbacks).
///
/// Boxed so that consumer implementations can bubble up any error with `?`.
pub type ConsumerError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// lifecycle errors, surfaced to the direct caller
    #[error("failed to connect to {address}: {source}")]
    ConnectFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("start cancelled before the connection was established")]
    StartCancelled,

    #[error("client already started")]
    AlreadyStarted,

    #[error("client is not connected")]
    NotConnected,

    #[error("client has been disposed")]
    Disposed,

    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// general errors
    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),
}

impl AppError {
    /// `true` for both refused and timed out connection attempts.
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            AppError::ConnectFailed { .. } | AppError::ConnectTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn connect_failures_are_grouped() {
        let refused = AppError::ConnectFailed {
            address: "127.0.0.1:1".to_string(),
            source: Error::new(ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(refused.is_connect_failure());
        assert!(AppError::ConnectTimeout("10.0.0.1:4001".into()).is_connect_failure());
        assert!(!AppError::NotConnected.is_connect_failure());
        assert!(!AppError::StartCancelled.is_connect_failure());
        assert!(refused.to_string().contains("127.0.0.1:1"));
    }
}
