//! Command-line interface definition.
//!
//! - `kiln dev` - build, watch, serve and hot-reload
//! - `kiln build` - run every pipeline once
//! - `kiln check` - validate the configuration and print what it resolves to

mod commands;

use clap::Parser;

pub use commands::{BuildArgs, CheckArgs, Command, ConfigArgs, DevArgs};

/// Kiln - asset pipelines with a live-reloading dev server
#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    version,
    about = "Asset pipelines with a live-reloading dev server",
    long_about = "Kiln compiles the script bundles and stylesheets declared in kiln.json,\n\
                  serves the output tree and pushes changed modules to the browser\n\
                  while you edit."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}
