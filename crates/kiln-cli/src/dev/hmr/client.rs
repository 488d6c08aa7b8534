//! Client-side revision bookkeeping.
//!
//! `assets/dev/hmr-client.js` runs the same state machine in the browser.
//! Keeping a Rust copy lets the channel be tested end to end.

use crate::dev::hmr::protocol::{ClientMessage, ServerMessage};

/// What the browser should do with a server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Fetch and apply these modules, then acknowledge `revision`
    Apply {
        revision: u64,
        modules: Vec<String>,
        removed: Vec<String>,
    },
    /// Reconnected after missing updates; tell the server where we are
    Resync(ClientMessage),
    Reload,
    ShowError(String),
    Ignore,
}

#[derive(Debug, Default, Clone)]
pub struct ClientRuntime {
    revision: Option<u64>,
    error: Option<String>,
}

impl ClientRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last applied revision.
    pub fn revision(&self) -> Option<u64> {
        self.revision
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn receive(&mut self, message: &ServerMessage) -> ClientAction {
        match message {
            ServerMessage::Connected { revision } => match self.revision {
                None => {
                    self.revision = Some(*revision);
                    ClientAction::Ignore
                }
                Some(current) if current == *revision => ClientAction::Ignore,
                Some(current) => ClientAction::Resync(ClientMessage::Ack { revision: current }),
            },
            ServerMessage::Update {
                revision,
                changed_modules,
                removed_modules,
            } => {
                if self.revision.is_some_and(|current| *revision <= current) {
                    return ClientAction::Ignore;
                }
                self.revision = Some(*revision);
                self.error = None;
                ClientAction::Apply {
                    revision: *revision,
                    modules: changed_modules.clone(),
                    removed: removed_modules.clone(),
                }
            }
            ServerMessage::FullReload { .. } => ClientAction::Reload,
            ServerMessage::Error { message } => {
                self.error = Some(message.clone());
                ClientAction::ShowError(message.clone())
            }
        }
    }

    /// Acknowledgement to send after applying.
    pub fn ack(&self) -> Option<ClientMessage> {
        self.revision.map(|revision| ClientMessage::Ack { revision })
    }
}
