//! Script bundle pipeline.
//!
//! Resolves the module graph from the pipeline input, rewrites every module
//! into a factory for the bundle runtime and concatenates them, dependencies
//! first. TypeScript and JSX are stripped with oxc on the way in. The hot
//! bundle additionally carries the HMR runtime, and every script build keeps
//! the per-module factory bodies so the dev server can push deltas.

mod analyze;
mod render;
mod resolve;
mod runtime;

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use kiln_config::{PipelineId, PipelineSpec};
use kiln_graph::{ModuleGraph, ModuleId, ModuleSnapshot};
use rustc_hash::FxHashMap as HashMap;
use tracing::{debug, warn};

use crate::error::{CompileError, Result, SourceLocation};
use crate::html::render_html_targets;
use crate::output::{Artifact, BuildOutput, BundleModules, Diagnostic};
use crate::runner::RunnerContext;
use crate::sourcemap::MapBuilder;

use analyze::{analyze, AnalyzedModule, SyntaxError};
use render::{render, RenderContext};

pub use resolve::{ResolveError, Resolver, EXTENSIONS};
pub use runtime::hot_update_script;

struct LoadedModule {
    path: PathBuf,
    analyzed: AnalyzedModule,
    resolved: HashMap<String, ModuleId>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptRunner {
    resolver: Resolver,
}

impl ScriptRunner {
    pub fn build(&self, spec: &PipelineSpec, context: &RunnerContext) -> Result<BuildOutput> {
        let root = bundle_root(&spec.input);
        let (graph, modules, diagnostics) = self.load_graph(spec, &root)?;
        let Some(entry) = graph.entry().cloned() else {
            return Err(CompileError::new(&spec.id, "module graph has no entry"));
        };

        let hot = context.is_hot(spec);
        let mut bundle = runtime::prologue(hot);
        let mut line = bundle.matches('\n').count() as u32;
        let mut map = spec.source_map.then(|| MapBuilder::new(&spec.output));
        let mut code = BTreeMap::new();

        for id in graph.emit_order() {
            let Some(module) = modules.get(&id) else {
                continue;
            };
            let mut body = render(
                &module.analyzed,
                &RenderContext {
                    resolved: &module.resolved,
                    environment: context.environment,
                },
            )
            .map_err(|e| {
                CompileError::new(
                    &spec.id,
                    format!(
                        "conflicting rewrites in '{}' at byte {}",
                        module.path.display(),
                        e.offset
                    ),
                )
            })?;
            if !body.ends_with('\n') {
                body.push('\n');
            }
            let body_lines = body.matches('\n').count() as u32;

            bundle.push_str(&runtime::factory_open(&id));
            line += 1;

            if let Some(map) = map.as_mut() {
                let source = map.add_source(&module.path, &module.analyzed.source);
                match &module.analyzed.generated_map {
                    Some(generated) => map.add_shifted(generated, source, line),
                    None => {
                        for k in 0..body_lines {
                            map.add_line(line + k, source, k);
                        }
                    }
                }
            }

            bundle.push_str(&body);
            line += body_lines;
            bundle.push_str(runtime::FACTORY_CLOSE);
            line += 1;
            code.insert(id, body);
        }
        bundle.push_str(&runtime::epilogue(&entry));

        let mut output = BuildOutput::new(spec.id.clone());
        output.dependency_manifest = graph.files();
        output.diagnostics = diagnostics;

        match map {
            Some(map) => {
                let map_path = spec.source_map_path();
                let map_name = map_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                bundle.push_str(&format!("//# sourceMappingURL={map_name}\n"));
                output.artifacts.push(Artifact::new(&spec.output, bundle));
                output.artifacts.push(Artifact::new(map_path, map.finish()));
            }
            None => output.artifacts.push(Artifact::new(&spec.output, bundle)),
        }
        output
            .artifacts
            .extend(render_html_targets(spec, &context.public_path)?);

        let snapshot =
            ModuleSnapshot::from_graph(&graph, code.iter().map(|(id, body)| (id, body.as_str())))
                .ok_or_else(|| CompileError::new(&spec.id, "module graph has no entry"))?;
        output.modules = Some(BundleModules { snapshot, code });

        for diagnostic in &output.diagnostics {
            match &diagnostic.location {
                Some(location) => warn!(pipeline = %spec.id, %location, "{}", diagnostic.message),
                None => warn!(pipeline = %spec.id, "{}", diagnostic.message),
            }
        }
        debug!(pipeline = %spec.id, modules = graph.len(), hot, "script bundled");
        Ok(output)
    }

    /// Breadth-first from the input, resolving every specifier.
    ///
    /// On failure the error carries every file reached so far.
    fn load_graph(
        &self,
        spec: &PipelineSpec,
        root: &Path,
    ) -> Result<(ModuleGraph, HashMap<ModuleId, LoadedModule>, Vec<Diagnostic>)> {
        self.resolver.clear_cache();

        let mut graph = ModuleGraph::new();
        let mut modules = HashMap::default();
        let mut diagnostics = Vec::new();

        let entry = ModuleId::from_path(root, &spec.input);
        graph.add_module(entry.clone(), spec.input.clone());
        graph.set_entry(entry.clone());
        let mut queue = VecDeque::from([(entry, spec.input.clone())]);

        while let Some((id, path)) = queue.pop_front() {
            let loaded =
                self.load_module(spec, root, &path, &mut graph, &mut queue, &mut diagnostics);
            match loaded {
                Ok((analyzed, resolved)) => {
                    modules.insert(
                        id,
                        LoadedModule {
                            path,
                            analyzed,
                            resolved,
                        },
                    );
                }
                Err(err) => return Err(err.with_manifest(graph.files())),
            }
        }

        Ok((graph, modules, diagnostics))
    }

    /// Reads and analyzes one module, queueing its unseen imports.
    fn load_module(
        &self,
        spec: &PipelineSpec,
        root: &Path,
        path: &Path,
        graph: &mut ModuleGraph,
        queue: &mut VecDeque<(ModuleId, PathBuf)>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(AnalyzedModule, HashMap<String, ModuleId>)> {
        let id = ModuleId::from_path(root, path);
        let source = fs::read_to_string(path).map_err(|e| CompileError::read(&spec.id, path, e))?;
        let analyzed =
            analyze(path, source.clone()).map_err(|e| syntax_error(&spec.id, path, &source, e))?;

        for offset in &analyzed.unresolvable_dynamic {
            diagnostics.push(
                Diagnostic::warning("dynamic import with a computed specifier is left as is")
                    .at(SourceLocation::from_offset(path, &analyzed.source, *offset)),
            );
        }

        let mut resolved = HashMap::default();
        for specifier in analyzed.specifiers() {
            let target = self.resolver.resolve(specifier, path).map_err(|e| {
                let err = CompileError::new(&spec.id, e.to_string());
                match analyzed.origins.get(specifier) {
                    Some(offset) => {
                        err.at(SourceLocation::from_offset(path, &analyzed.source, *offset))
                    }
                    None => err.at(SourceLocation::new(path, 1, 1)),
                }
            })?;

            let target_id = ModuleId::from_path(root, &target);
            if graph.add_module(target_id.clone(), target.clone()) {
                queue.push_back((target_id.clone(), target));
            }
            graph.add_dependency(&id, target_id.clone());
            resolved.insert(specifier.to_string(), target_id);
        }

        Ok((analyzed, resolved))
    }
}

fn syntax_error(pipeline_id: &PipelineId, path: &Path, source: &str, err: SyntaxError) -> CompileError {
    let location = match err.offset {
        Some(offset) => SourceLocation::from_offset(path, source, offset),
        None => SourceLocation::new(path, 1, 1),
    };
    CompileError::new(pipeline_id, err.message).at(location)
}

/// Nearest ancestor of `input` with a `package.json`; module ids are
/// relative to it.
fn bundle_root(input: &Path) -> PathBuf {
    let start = input.parent().unwrap_or_else(|| Path::new("/"));
    start
        .ancestors()
        .find(|dir| dir.join("package.json").is_file())
        .unwrap_or(start)
        .to_path_buf()
}
