use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the vehicle link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The TCP connect attempt did not complete within the configured timeout.
    #[error("Connection Timeout")]
    ConnectTimeout,
    /// Transport-level failure while connecting or while connected.
    #[error("Socket Error: {0}")]
    Socket(#[from] std::io::Error),
    /// A write failed on a connection that was assumed live.
    #[error("Send Error: {0}")]
    SendFailure(String),
    /// The link task is gone; no further requests can be delivered.
    #[error("vehicle link task has shut down")]
    ChannelClosed,
}

/// Connection parameters for the vehicle link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub send_debounce: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "192.168.4.1".to_string(),
            port: 100,
            connect_timeout: Duration::from_millis(5000),
            heartbeat_interval: Duration::from_millis(1000),
            send_debounce: Duration::from_millis(50),
        }
    }
}

/// Externally observable connection state, published on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    pub connected: bool,
    /// Human-readable reason when the link dropped or failed to come up.
    pub error: Option<String>,
    /// Informational text for non-final states ("Connecting...").
    pub message: Option<String>,
}

impl LinkStatus {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            error: None,
            message: None,
        }
    }

    pub fn connecting() -> Self {
        Self {
            connected: false,
            error: None,
            message: Some("Connecting...".to_string()),
        }
    }

    pub fn connected() -> Self {
        Self {
            connected: true,
            error: None,
            message: None,
        }
    }

    pub fn dropped(reason: impl Into<String>) -> Self {
        Self {
            connected: false,
            error: Some(reason.into()),
            message: None,
        }
    }
}
