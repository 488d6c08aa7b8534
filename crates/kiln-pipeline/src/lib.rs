//! # kiln-pipeline
//!
//! Compiles one declared pipeline into its output files.
//!
//! - **Script** pipelines resolve the module graph from the input, strip
//!   TypeScript and JSX with oxc and emit a single bundle, an optional
//!   source map and any declared HTML pages.
//! - **Stylesheet** pipelines inline `@import`s, validate every file with
//!   lightningcss and emit one CSS file, minified in production.
//!
//! Every successful run reports the dependency manifest, the set of source
//! files it read, so callers know which file changes affect which pipeline.
//!
//! ```no_run
//! use kiln_config::ConfigDiscovery;
//! use kiln_pipeline::{PipelineRunner, Runner, RunnerContext};
//!
//! let config = ConfigDiscovery::new(".").load()?;
//! let runner = Runner::new(RunnerContext::from_config(&config));
//! for spec in config.all_pipelines() {
//!     let output = runner.run(&spec)?;
//!     println!("{} read {} files", spec.id, output.dependency_manifest.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod html;
pub mod output;
pub mod runner;
pub mod script;
pub mod sourcemap;
pub mod style;
pub mod writer;

pub use error::{CompileError, Result, SourceLocation};
pub use output::{content_type_for, Artifact, BuildOutput, BundleModules, Diagnostic};
pub use runner::{PipelineRunner, Runner, RunnerContext};
pub use script::{hot_update_script, ScriptRunner};
pub use style::StylesheetRunner;
pub use writer::write_artifacts;
