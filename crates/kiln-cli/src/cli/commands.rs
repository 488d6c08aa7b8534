use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Available kiln subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the development server
    ///
    /// Builds every pipeline, serves the output tree, rebuilds affected
    /// pipelines when source files change and pushes updated modules to
    /// connected browsers.
    Dev(DevArgs),

    /// Build every pipeline once
    ///
    /// Exits with a non-zero status if any pipeline fails.
    Build(BuildArgs),

    /// Validate the configuration
    ///
    /// Prints the normalized pipelines and routes without building anything.
    Check(CheckArgs),
}

/// Where the configuration comes from.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Configuration file (kiln.json or kiln.toml)
    ///
    /// Relative paths inside the file resolve against its directory.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory to search for a configuration file (defaults to the
    /// current directory)
    #[arg(long, value_name = "DIR", conflicts_with = "config")]
    pub cwd: Option<PathBuf>,
}

/// Arguments for `kiln dev`
#[derive(Args, Debug)]
pub struct DevArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Override devServer.port
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Override devServer.hostname
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,
}

/// Arguments for `kiln build`
#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Build for production regardless of the configured environment
    #[arg(long)]
    pub production: bool,
}

/// Arguments for `kiln check`
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}
