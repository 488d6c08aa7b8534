//! Turning a [`RawConfig`] into a validated [`KilnConfig`].
//!
//! Every path is resolved exactly once here, against an explicit base
//! directory (normally the directory holding the config file). Nothing
//! downstream ever re-resolves a path against the process working directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use path_clean::PathClean;

use crate::error::{ConfigError, Result};
use crate::model::{
    BuildSpec, DevServerSpec, Environment, HmrSpec, KilnConfig, PipelineId, PipelineKind,
    PipelineSpec, RouteSpec, WatchSpec,
};
use crate::raw::{
    RawConfig, RawDevServer, RawHtmlTarget, RawRoute, RawScriptPipeline, RawStylePipeline,
    RawWatch,
};

/// Id given to the HMR entry bundle when it is not also a declared script pipeline.
pub const HMR_PIPELINE_ID: &str = "hmr";

/// Loads raw declarations relative to a base directory.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().clean(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Validate and normalize a raw declaration.
    ///
    /// The only I/O performed is checking that route files exist; routes
    /// pointing at something a pipeline will produce are exempt.
    pub fn load(&self, raw: &RawConfig) -> Result<KilnConfig> {
        let environment = match raw.environment.as_deref() {
            Some(value) => Environment::parse(value)?,
            None => Environment::default(),
        };

        let workers = match raw.workers {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    field: "workers".to_string(),
                    hint: Some("at least one worker is required".to_string()),
                });
            }
            Some(n) => n,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        };

        let mut pipelines = Vec::with_capacity(raw.js.len() + raw.css.len());
        for (index, js) in raw.js.iter().enumerate() {
            let id = PipelineId::new(format!("js:{index}"));
            pipelines.push(self.script_pipeline(id, &format!("js[{index}]"), js)?);
        }
        for (index, css) in raw.css.iter().enumerate() {
            let id = PipelineId::new(format!("css:{index}"));
            pipelines.push(self.style_pipeline(id, &format!("css[{index}]"), css)?);
        }

        let build = BuildSpec {
            environment,
            workers,
            pipelines,
        };

        let dev_server = match &raw.dev_server {
            Some(dev) => Some(self.dev_server(dev, &build.pipelines)?),
            None => None,
        };

        check_unique_outputs(&build, dev_server.as_ref())?;

        tracing::debug!(
            pipelines = build.pipelines.len(),
            dev_server = dev_server.is_some(),
            "loaded kiln config"
        );

        Ok(KilnConfig { build, dev_server })
    }

    fn script_pipeline(
        &self,
        id: PipelineId,
        field: &str,
        raw: &RawScriptPipeline,
    ) -> Result<PipelineSpec> {
        let (input, output) = self.input_output(field, raw.input.as_deref(), raw.output.as_deref())?;

        let out_dir = output.parent().unwrap_or(Path::new("/")).to_path_buf();
        let mut html_targets = Vec::with_capacity(raw.html.len());
        for (index, target) in raw.html.iter().enumerate() {
            let field = format!("{field}.html[{index}].filename");
            check_raw_path(&field, &target.filename)?;
            html_targets.push(out_dir.join(&target.filename).clean());
        }

        Ok(PipelineSpec {
            id,
            kind: PipelineKind::Script,
            input,
            output,
            source_map: raw.sourcemap,
            html_targets,
        })
    }

    fn style_pipeline(
        &self,
        id: PipelineId,
        field: &str,
        raw: &RawStylePipeline,
    ) -> Result<PipelineSpec> {
        let (input, output) = self.input_output(field, raw.input.as_deref(), raw.output.as_deref())?;
        Ok(PipelineSpec {
            id,
            kind: PipelineKind::Stylesheet,
            input,
            output,
            source_map: raw.sourcemap,
            html_targets: Vec::new(),
        })
    }

    fn input_output(
        &self,
        field: &str,
        input: Option<&Path>,
        output: Option<&Path>,
    ) -> Result<(PathBuf, PathBuf)> {
        let input_field = format!("{field}.input");
        let output_field = format!("{field}.output");
        let input = input.ok_or_else(|| ConfigError::missing(&input_field))?;
        let output = output.ok_or_else(|| ConfigError::missing(&output_field))?;
        let input = self.resolve(&input_field, input)?;
        let output = self.resolve(&output_field, output)?;

        if input == output {
            return Err(ConfigError::InvalidValue {
                field: output_field,
                hint: Some("output would overwrite the pipeline input".to_string()),
            });
        }
        Ok((input, output))
    }

    fn dev_server(&self, raw: &RawDevServer, pipelines: &[PipelineSpec]) -> Result<DevServerSpec> {
        let hostname = raw
            .hostname
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigError::missing("devServer.hostname"))?
            .to_string();

        let port = raw.port.ok_or_else(|| ConfigError::missing("devServer.port"))?;
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(ConfigError::InvalidPort { port })?;

        let public_dir = raw
            .public_dir
            .as_deref()
            .ok_or_else(|| ConfigError::missing("devServer.publicDir"))?;
        let public_dir = self.resolve("devServer.publicDir", public_dir)?;

        let public_path = normalize_public_path(raw.public_path.as_deref().unwrap_or("/"));

        let entry = match &raw.hot_module_build {
            Some(build) => {
                let candidate =
                    self.script_pipeline(PipelineId::new(HMR_PIPELINE_ID), "devServer.hotModuleBuild", build)?;
                // Reuse a declared script pipeline when it is the same bundle.
                let declared = pipelines.iter().find(|p| {
                    p.kind == PipelineKind::Script
                        && p.input == candidate.input
                        && p.output == candidate.output
                });
                Some(declared.cloned().unwrap_or(candidate))
            }
            None => None,
        };

        if raw.use_hot_module_replacement && entry.is_none() {
            return Err(ConfigError::HmrEntryMissing);
        }

        // Routes may point at output that has not been built yet.
        let mut buildable: HashSet<PathBuf> = pipelines
            .iter()
            .flat_map(PipelineSpec::artifact_paths)
            .collect();
        if let Some(entry) = &entry {
            buildable.extend(entry.artifact_paths());
        }

        let mut routes = Vec::with_capacity(raw.routes.len());
        for (index, route) in raw.routes.iter().enumerate() {
            routes.push(self.route(index, route, &buildable)?);
        }

        let watch = match &raw.watch {
            Some(RawWatch { debounce_ms, ignore }) => {
                let defaults = WatchSpec::default();
                WatchSpec {
                    debounce_ms: debounce_ms.unwrap_or(defaults.debounce_ms),
                    ignore: ignore.clone().unwrap_or(defaults.ignore),
                }
            }
            None => WatchSpec::default(),
        };

        Ok(DevServerSpec {
            hostname,
            port,
            public_dir,
            public_path,
            routes,
            hmr: HmrSpec {
                enabled: raw.use_hot_module_replacement,
                entry,
            },
            watch,
        })
    }

    fn route(&self, index: usize, raw: &RawRoute, buildable: &HashSet<PathBuf>) -> Result<RouteSpec> {
        let uri = raw
            .uri
            .as_deref()
            .ok_or_else(|| ConfigError::missing(format!("devServer.routes[{index}].uri")))?;
        let file = raw
            .file
            .as_deref()
            .ok_or_else(|| ConfigError::missing(format!("devServer.routes[{index}].file")))?;
        let file = self.resolve(&format!("devServer.routes[{index}].file"), file)?;

        if !file.is_file() && !buildable.contains(&file) {
            return Err(ConfigError::RouteFileNotFound {
                uri: uri.to_string(),
                path: file,
            });
        }

        RouteSpec::new(uri, file)
    }

    fn resolve(&self, field: &str, path: &Path) -> Result<PathBuf> {
        check_raw_path(field, path)?;
        let resolved = if path.is_absolute() {
            path.clean()
        } else {
            self.base_dir.join(path).clean()
        };

        if !resolved.is_absolute() {
            return Err(ConfigError::InvalidPath {
                field: field.to_string(),
                path: path.to_path_buf(),
                hint: format!(
                    "relative paths are resolved against '{}', which is not absolute",
                    self.base_dir.display()
                ),
            });
        }
        Ok(resolved)
    }
}

fn check_raw_path(field: &str, path: &Path) -> Result<()> {
    let text = path.as_os_str();
    if text.is_empty() {
        return Err(ConfigError::InvalidPath {
            field: field.to_string(),
            path: path.to_path_buf(),
            hint: "path is empty".to_string(),
        });
    }
    if text.to_string_lossy().contains('\0') {
        return Err(ConfigError::InvalidPath {
            field: field.to_string(),
            path: path.to_path_buf(),
            hint: "path contains a null byte".to_string(),
        });
    }
    Ok(())
}

fn check_unique_outputs(build: &BuildSpec, dev: Option<&DevServerSpec>) -> Result<()> {
    let mut seen: HashSet<&Path> = HashSet::new();
    let entry = dev.and_then(|d| d.hmr.entry.as_ref());
    let extra = entry.filter(|e| !build.pipelines.iter().any(|p| p.id == e.id));

    for pipeline in build.pipelines.iter().chain(extra) {
        if !seen.insert(pipeline.output.as_path()) {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.output", pipeline.id),
                hint: Some(format!(
                    "'{}' is written by more than one pipeline",
                    pipeline.output.display()
                )),
            });
        }
    }
    Ok(())
}

/// `assets/js` → `/assets/js/`
pub fn normalize_public_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

impl KilnConfig {
    /// Every pipeline the orchestrator runs: the declared ones plus the HMR
    /// entry bundle when it is not one of them.
    pub fn all_pipelines(&self) -> Vec<PipelineSpec> {
        let mut pipelines = self.build.pipelines.clone();
        if let Some(entry) = self.hmr_entry() {
            if !pipelines.iter().any(|p| p.id == entry.id) {
                pipelines.push(entry.clone());
            }
        }
        pipelines
    }

    /// The hot-reloadable entry bundle, if HMR is enabled.
    pub fn hmr_entry(&self) -> Option<&PipelineSpec> {
        self.dev_server
            .as_ref()
            .filter(|d| d.hmr.enabled)
            .and_then(|d| d.hmr.entry.as_ref())
    }

    /// Serialize back to a raw declaration with absolute paths.
    pub fn to_raw(&self) -> RawConfig {
        let mut raw = RawConfig {
            environment: Some(self.build.environment.as_str().to_string()),
            workers: Some(self.build.workers),
            ..Default::default()
        };

        for pipeline in &self.build.pipelines {
            match pipeline.kind {
                PipelineKind::Script => raw.js.push(script_to_raw(pipeline)),
                PipelineKind::Stylesheet => raw.css.push(RawStylePipeline {
                    input: Some(pipeline.input.clone()),
                    output: Some(pipeline.output.clone()),
                    sourcemap: pipeline.source_map,
                }),
            }
        }

        raw.dev_server = self.dev_server.as_ref().map(|dev| RawDevServer {
            hostname: Some(dev.hostname.clone()),
            port: Some(i64::from(dev.port)),
            public_dir: Some(dev.public_dir.clone()),
            public_path: Some(dev.public_path.clone()),
            routes: dev
                .routes
                .iter()
                .map(|route| RawRoute {
                    uri: Some(route.pattern().as_str().to_string()),
                    file: Some(route.file().to_path_buf()),
                })
                .collect(),
            use_hot_module_replacement: dev.hmr.enabled,
            hot_module_build: dev.hmr.entry.as_ref().map(script_to_raw),
            watch: Some(RawWatch {
                debounce_ms: Some(dev.watch.debounce_ms),
                ignore: Some(dev.watch.ignore.clone()),
            }),
        });

        raw
    }
}

fn script_to_raw(pipeline: &PipelineSpec) -> RawScriptPipeline {
    RawScriptPipeline {
        input: Some(pipeline.input.clone()),
        output: Some(pipeline.output.clone()),
        sourcemap: pipeline.source_map,
        html: pipeline
            .html_targets
            .iter()
            .map(|filename| RawHtmlTarget {
                filename: filename.clone(),
            })
            .collect(),
    }
}

/// Convenience wrapper around [`ConfigLoader::load`].
pub fn load(raw: &RawConfig, base_dir: impl AsRef<Path>) -> Result<KilnConfig> {
    ConfigLoader::new(base_dir).load(raw)
}
