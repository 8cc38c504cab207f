//! JSON frames exchanged with browser clients over the WebSocket.

use car_link::LinkStatus;
use serde::{Deserialize, Serialize};

/// Inbound intent from a control client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Bring the vehicle link up (idempotent).
    #[serde(rename = "connect")]
    Connect,
    /// Tear the vehicle link down on behalf of the client.
    #[serde(rename = "disconnectCar")]
    DisconnectCar,
    /// Drive command. The action string is validated against the known set;
    /// unknown actions are logged and dropped.
    #[serde(rename = "command")]
    Command { action: String },
}

/// Outbound notification to a control client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "status")]
    Status {
        #[serde(rename = "isConnected")]
        is_connected: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerMessage {
    pub fn status(link: &LinkStatus) -> Self {
        ServerMessage::Status {
            is_connected: link.connected,
            error: link.error.clone(),
            message: link.message.clone(),
        }
    }
}
