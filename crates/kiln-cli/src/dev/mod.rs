//! The `kiln dev` engine.
//!
//! - [`orchestrator`] schedules pipeline builds and owns all build state
//! - [`server`] serves the output tree and the HMR websocket
//! - [`hmr`] turns entry bundle builds into client updates
//! - [`watcher`] feeds file changes back into the orchestrator

pub mod hmr;
pub mod job;
pub mod orchestrator;
pub mod routes;
pub mod server;
pub mod state;
pub mod watcher;

pub use hmr::HmrChannel;
pub use job::{BuildJob, BuildReason, JobStatus, StatusEvent};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use routes::{Resolution, RouteTable};
pub use server::DevServer;
pub use state::{CachedFile, OutputCache};
pub use watcher::{ChangeKind, FileWatcher, WatchEvent};
