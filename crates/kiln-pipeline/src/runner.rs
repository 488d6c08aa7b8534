//! Pipeline runner seam.
//!
//! The orchestrator only sees [`PipelineRunner`]. [`Runner`] is the real
//! implementation and dispatches on [`PipelineKind`]; tests substitute their
//! own runners to observe scheduling.

use kiln_config::{Environment, KilnConfig, PipelineId, PipelineKind, PipelineSpec};
use tracing::{debug, info_span};

use crate::error::Result;
use crate::output::BuildOutput;
use crate::script::ScriptRunner;
use crate::style::StylesheetRunner;
use crate::writer::write_artifacts;

/// Builds one pipeline and writes its artifacts.
///
/// Implementations must be safe to call from several threads at once for
/// different pipelines.
pub trait PipelineRunner: Send + Sync + 'static {
    fn run(&self, spec: &PipelineSpec) -> Result<BuildOutput>;
}

/// Settings shared by every pipeline of one configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerContext {
    pub environment: Environment,
    /// URL prefix HTML targets use to reference bundles
    pub public_path: String,
    /// Pipeline whose bundle carries the hot module replacement runtime
    pub hmr_pipeline: Option<PipelineId>,
}

impl Default for RunnerContext {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            public_path: "/".to_string(),
            hmr_pipeline: None,
        }
    }
}

impl RunnerContext {
    /// Derive the context from a loaded configuration.
    ///
    /// Hot module replacement is only wired in development builds.
    pub fn from_config(config: &KilnConfig) -> Self {
        let environment = config.build.environment;
        let public_path = config
            .dev_server
            .as_ref()
            .map(|d| d.public_path.clone())
            .unwrap_or_else(|| "/".to_string());

        let hmr_pipeline = match environment {
            Environment::Development => config.hmr_entry().map(|spec| spec.id.clone()),
            Environment::Production => None,
        };

        Self {
            environment,
            public_path,
            hmr_pipeline,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Whether `spec` gets the hot runtime.
    pub fn is_hot(&self, spec: &PipelineSpec) -> bool {
        !self.is_production() && self.hmr_pipeline.as_ref() == Some(&spec.id)
    }
}

/// Compiles and writes script bundles and stylesheets.
#[derive(Debug, Clone, Default)]
pub struct Runner {
    context: RunnerContext,
    script: ScriptRunner,
    style: StylesheetRunner,
}

impl Runner {
    pub fn new(context: RunnerContext) -> Self {
        Self {
            context,
            script: ScriptRunner::default(),
            style: StylesheetRunner::default(),
        }
    }

    pub fn context(&self) -> &RunnerContext {
        &self.context
    }

    /// Compile `spec` without writing anything.
    pub fn compile(&self, spec: &PipelineSpec) -> Result<BuildOutput> {
        match spec.kind {
            PipelineKind::Script => self.script.build(spec, &self.context),
            PipelineKind::Stylesheet => self.style.build(spec, &self.context),
        }
    }
}

impl PipelineRunner for Runner {
    fn run(&self, spec: &PipelineSpec) -> Result<BuildOutput> {
        let _span = info_span!("pipeline", id = %spec.id, kind = %spec.kind).entered();

        let output = self.compile(spec)?;
        write_artifacts(&spec.id, &output.artifacts)?;

        debug!(
            artifacts = output.artifacts.len(),
            dependencies = output.dependency_manifest.len(),
            bytes = output.total_size(),
            "pipeline written"
        );
        Ok(output)
    }
}
