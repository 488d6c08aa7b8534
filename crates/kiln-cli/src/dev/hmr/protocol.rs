//! HMR wire messages, JSON over the websocket.

use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// First message of every session
    Connected { revision: u64 },

    /// Modules changed since the client's last acknowledged revision
    Update {
        revision: u64,
        changed_modules: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        removed_modules: Vec<String>,
    },

    FullReload {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// The entry bundle failed to build; the revision did not advance
    Error { message: String },
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        // Plain data with string keys; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// The client has applied everything up to `revision`
    Ack { revision: u64 },
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, ChannelError> {
        serde_json::from_str(text).map_err(|e| ChannelError::Malformed(e.to_string()))
    }
}
