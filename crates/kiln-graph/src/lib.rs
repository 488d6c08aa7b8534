//! Dependency tracking for kiln.
//!
//! Two graphs live here:
//!
//! - [`DependencyGraph`] maps each pipeline to the source files its last
//!   successful build read, with an inverted index so a changed file resolves
//!   to the pipelines that must rebuild.
//! - [`ModuleGraph`] is the import graph of one script bundle. Together with
//!   [`ModuleSnapshot`] it drives hot module replacement deltas.
//!
//! ```
//! use kiln_config::PipelineId;
//! use kiln_graph::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! let app = PipelineId::new("js:0");
//! graph.update(&app, ["/project/src/app.js", "/project/src/util.js"]);
//!
//! assert!(graph.affected_pipelines("/project/src/util.js").contains(&app));
//! assert!(graph.affected_pipelines("/project/README.md").is_empty());
//! ```

pub mod changes;
pub mod dependency_graph;
pub mod module_graph;

pub use changes::{
    detect_changes, plan_update, ChangeSet, ContentHash, ModuleSnapshot, ReloadReason,
    UpdatePlan,
};
pub use dependency_graph::DependencyGraph;
pub use module_graph::{ModuleGraph, ModuleId};
