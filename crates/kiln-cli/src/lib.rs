//! Kiln CLI - asset pipelines with a live-reloading dev server.
//!
//! The binary wires the library crates together:
//!
//! - `kiln-config` loads and validates `kiln.json`
//! - [`dev::Orchestrator`] schedules pipeline builds from `kiln-pipeline`
//!   and tracks dependencies with `kiln-graph`
//! - [`dev::DevServer`] serves the output tree and the HMR websocket
//!
//! Supporting modules:
//!
//! - [`error`] - error types with actionable messages
//! - [`logger`] - structured logging with tracing
//! - [`ui`] - terminal status lines and the build summary
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use kiln_cli::dev::{BuildReason, Orchestrator};
//! use kiln_config::ConfigDiscovery;
//! use kiln_pipeline::{Runner, RunnerContext};
//!
//! # async fn run() -> kiln_cli::Result<()> {
//! let config = ConfigDiscovery::new(".").load()?;
//! let runner = Arc::new(Runner::new(RunnerContext::from_config(&config)));
//! let orchestrator = Orchestrator::builder(runner)
//!     .pipelines(config.all_pipelines())
//!     .workers(config.build.workers)
//!     .build();
//!
//! orchestrator.rebuild_all(BuildReason::Initial);
//! orchestrator.wait_idle().await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod commands;
pub mod dev;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{CliError, Result, ResultExt};
