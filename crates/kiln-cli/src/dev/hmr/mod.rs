//! Hot module replacement channel.

pub mod channel;
pub mod client;
pub mod protocol;

pub use channel::{HmrChannel, SessionId, HISTORY_LIMIT};
pub use client::{ClientAction, ClientRuntime};
pub use protocol::{ClientMessage, ServerMessage};
