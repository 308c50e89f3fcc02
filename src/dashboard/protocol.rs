//! WebSocket protocol types for live dashboard updates.
//!
//! The server exposes a WebSocket endpoint at `/ws`. Messages are JSON-encoded
//! and use a `type` field for discrimination.
//!
//! ## Server → Client ([`ServerMessage`])
//! - `connected`: sent once after the upgrade
//! - `file_change`: something under a watched root changed; re-query
//! - `pong`: keepalive response
//!
//! ## Client → Server ([`ClientMessage`])
//! - `ping`: keepalive ping

use serde::{Deserialize, Serialize};

use crate::models::ChangeSignal;

/// Messages sent from the dashboard server to subscribers.
///
/// # Examples
///
/// ```json
/// {"type": "connected", "version": "0.1.0"}
/// {"type": "file_change", "data": {"event": "modified", "path": "/p/.forge/progress/auth/checkpoint.json"}}
/// {"type": "pong"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection acknowledgment.
    Connected {
        /// Server version string.
        version: String,
    },

    /// A watched file was created, modified or deleted.
    FileChange {
        /// What changed, without contents.
        data: ChangeSignal,
    },

    /// Keepalive response to a ping.
    Pong,
}

impl ServerMessage {
    /// Serialize for sending over the socket.
    pub fn to_json(&self) -> String {
        // Serializing these variants cannot fail: all fields are strings.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Messages sent from subscribers to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keepalive ping message. The server responds with `pong`.
    Ping,
}
