//! Server half of the HMR channel.
//!
//! Every successful build of the entry bundle becomes a revision. Each
//! session remembers the last revision its client acknowledged; updates are
//! always planned from that revision, so a dropped message is recovered by
//! the next push or by the client's ack on reconnect.

use std::collections::VecDeque;
use std::sync::Arc;

use kiln_graph::{plan_update, ModuleId, ReloadReason, UpdatePlan};
use kiln_pipeline::BundleModules;
use parking_lot::Mutex;
use rustc_hash::FxHashMap as HashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::dev::hmr::protocol::ServerMessage;
use crate::error::ChannelError;

/// Revisions retained for incremental updates.
pub const HISTORY_LIMIT: usize = 32;

/// Messages buffered per session before further pushes are dropped.
const SESSION_BUFFER: usize = 32;

pub type SessionId = u64;

struct Session {
    last_acked: u64,
    /// Newest revision already pushed and not yet acknowledged
    in_flight: Option<u64>,
    tx: mpsc::Sender<ServerMessage>,
}

#[derive(Default)]
struct State {
    revision: u64,
    history: VecDeque<(u64, Arc<BundleModules>)>,
    sessions: HashMap<SessionId, Session>,
    next_session: SessionId,
    last_error: Option<String>,
}

impl State {
    fn modules_at(&self, revision: u64) -> Option<&Arc<BundleModules>> {
        self.history
            .iter()
            .find(|(rev, _)| *rev == revision)
            .map(|(_, modules)| modules)
    }

    fn latest(&self) -> Option<&Arc<BundleModules>> {
        self.history.back().map(|(_, modules)| modules)
    }

    /// Message that moves a client from `from` to the current revision.
    fn plan_from(&self, from: u64) -> ServerMessage {
        let (Some(previous), Some(current)) = (self.modules_at(from), self.latest()) else {
            return full_reload(ReloadReason::RevisionUnavailable);
        };

        match plan_update(&previous.snapshot, &current.snapshot) {
            UpdatePlan::Unchanged => update(self.revision, Vec::new(), Vec::new()),
            UpdatePlan::Modules { changed, removed } => update(self.revision, changed, removed),
            UpdatePlan::FullReload(reason) => full_reload(reason),
        }
    }
}

fn update(revision: u64, changed: Vec<ModuleId>, removed: Vec<ModuleId>) -> ServerMessage {
    ServerMessage::Update {
        revision,
        changed_modules: changed.into_iter().map(|id| id.as_str().to_string()).collect(),
        removed_modules: removed.into_iter().map(|id| id.as_str().to_string()).collect(),
    }
}

fn full_reload(reason: ReloadReason) -> ServerMessage {
    ServerMessage::FullReload {
        reason: Some(reason.to_string()),
    }
}

/// Outcome of pushing one message to one session.
enum Delivery {
    Sent,
    Dropped,
    Closed,
}

fn deliver(id: SessionId, session: &Session, message: ServerMessage) -> Delivery {
    match session.tx.try_send(message) {
        Ok(()) => Delivery::Sent,
        Err(TrySendError::Full(_)) => {
            debug!(session = id, "HMR session is behind, dropping message");
            Delivery::Dropped
        }
        Err(TrySendError::Closed(_)) => Delivery::Closed,
    }
}

/// Shared handle to the channel. Cloning is cheap.
#[derive(Clone, Default)]
pub struct HmrChannel {
    state: Arc<Mutex<State>>,
}

impl HmrChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current revision; `0` until the entry bundle has built once.
    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Open a session. The client is assumed to be at the current revision
    /// until it acknowledges otherwise.
    pub fn connect(&self) -> (SessionId, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        let mut state = self.state.lock();

        let id = state.next_session;
        state.next_session += 1;

        let _ = tx.try_send(ServerMessage::Connected {
            revision: state.revision,
        });
        if let Some(message) = state.last_error.clone() {
            let _ = tx.try_send(ServerMessage::Error { message });
        }

        let last_acked = state.revision;
        state.sessions.insert(
            id,
            Session {
                last_acked,
                in_flight: None,
                tx,
            },
        );
        debug!(session = id, revision = last_acked, "HMR session opened");
        (id, rx)
    }

    pub fn disconnect(&self, id: SessionId) {
        if self.state.lock().sessions.remove(&id).is_some() {
            debug!(session = id, "HMR session closed");
        }
    }

    /// Record a successful build of the entry bundle and push updates.
    ///
    /// Returns the revision after publishing. An identical rebuild does not
    /// advance the revision unless clients are showing a build error.
    pub fn publish(&self, modules: &BundleModules) -> u64 {
        let mut state = self.state.lock();

        let unchanged = state
            .latest()
            .is_some_and(|latest| **latest == *modules);
        if unchanged && state.last_error.is_none() {
            return state.revision;
        }

        state.revision += 1;
        let revision = state.revision;
        state.history.push_back((revision, Arc::new(modules.clone())));
        while state.history.len() > HISTORY_LIMIT {
            state.history.pop_front();
        }
        state.last_error = None;

        let plans: Vec<(SessionId, ServerMessage)> = state
            .sessions
            .iter()
            .map(|(id, session)| (*id, state.plan_from(session.last_acked)))
            .collect();

        let mut closed = Vec::new();
        for (id, message) in plans {
            let Some(session) = state.sessions.get_mut(&id) else {
                continue;
            };
            match deliver(id, session, message) {
                Delivery::Sent => session.in_flight = Some(revision),
                Delivery::Dropped => {}
                Delivery::Closed => closed.push(id),
            }
        }
        for id in closed {
            state.sessions.remove(&id);
        }

        debug!(revision, sessions = state.sessions.len(), "HMR revision published");
        revision
    }

    /// Tell every client the entry bundle failed. The revision stays put.
    pub fn publish_error(&self, message: impl Into<String>) {
        let message = message.into();
        let mut state = self.state.lock();
        state.last_error = Some(message.clone());

        let mut closed = Vec::new();
        for (id, session) in &state.sessions {
            if let Delivery::Closed = deliver(
                *id,
                session,
                ServerMessage::Error {
                    message: message.clone(),
                },
            ) {
                closed.push(*id);
            }
        }
        for id in closed {
            state.sessions.remove(&id);
        }
    }

    /// Handle `{type: "ack", revision}` from a session.
    ///
    /// A client behind the current revision gets a catch-up message unless
    /// one is already on its way.
    pub fn ack(&self, id: SessionId, revision: u64) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        let latest = state.revision;
        if revision > latest {
            return Err(ChannelError::UnknownRevision { revision, latest });
        }

        let catch_up = {
            let session = state
                .sessions
                .get_mut(&id)
                .ok_or(ChannelError::SessionClosed(id))?;
            session.last_acked = revision;
            if session.in_flight.is_some_and(|r| r <= revision) {
                session.in_flight = None;
            }
            revision < latest && session.in_flight != Some(latest)
        };
        if !catch_up {
            return Ok(());
        }

        let message = state.plan_from(revision);
        let Some(session) = state.sessions.get_mut(&id) else {
            return Err(ChannelError::SessionClosed(id));
        };
        match deliver(id, session, message) {
            Delivery::Sent => {
                session.in_flight = Some(latest);
                Ok(())
            }
            Delivery::Dropped => Ok(()),
            Delivery::Closed => {
                state.sessions.remove(&id);
                Err(ChannelError::SessionClosed(id))
            }
        }
    }

    /// Emitted code of `id` in the current revision.
    pub fn module_code(&self, id: &str) -> Option<String> {
        let state = self.state.lock();
        let latest = state.latest()?;
        latest.code.get(&ModuleId::new(id)).cloned()
    }

    /// Message currently shown to clients, if the last entry build failed.
    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }
}

impl std::fmt::Debug for HmrChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("HmrChannel")
            .field("revision", &state.revision)
            .field("sessions", &state.sessions.len())
            .finish()
    }
}

pub(crate) fn warn_session_error(id: SessionId, err: &ChannelError) {
    warn!(session = id, error = %err, "closing HMR session");
}
