//! Stylesheet pipeline.
//!
//! Follows `@import` statements from the input, dependencies first, and
//! emits one CSS file. Each stylesheet is validated with lightningcss so
//! syntax errors surface as compile errors with a location. Development
//! builds keep the source text as written, production builds minify every
//! stylesheet.
//!
//! This pipeline knows nothing about script bundles.

mod imports;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use kiln_config::{PipelineId, PipelineSpec};
use lightningcss::error::Error as CssError;
use lightningcss::printer::PrinterOptions;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, StyleSheet};
use path_clean::PathClean;
use rustc_hash::FxHashSet as HashSet;
use tracing::debug;

use crate::error::{CompileError, Result, SourceLocation};
use crate::output::{Artifact, BuildOutput};
use crate::runner::RunnerContext;
use crate::sourcemap::{relative_path, MapBuilder};

pub use imports::{scan_imports, CssImport, ImportConditions};

/// One stylesheet in emit order.
#[derive(Debug)]
struct StyleFile {
    path: PathBuf,
    source: String,
    /// Source with its import statements blanked out
    body: String,
    /// Wrappers from the import chain that reached this file
    wrappers: Vec<String>,
}

#[derive(Debug, Default)]
struct Collected {
    files: Vec<StyleFile>,
    external: Vec<String>,
    visited: HashSet<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StylesheetRunner;

impl StylesheetRunner {
    pub fn build(&self, spec: &PipelineSpec, context: &RunnerContext) -> Result<BuildOutput> {
        let mut collected = Collected::default();
        collected.visited.insert(spec.input.clone());
        collect(&spec.id, &spec.input, Vec::new(), &mut collected)
            .map_err(|e| e.with_manifest(collected.visited.iter().cloned()))?;

        for file in &collected.files {
            validate(&spec.id, file)
                .map_err(|e| e.with_manifest(collected.visited.iter().cloned()))?;
        }

        let minify = context.is_production();
        let mut map = spec.source_map.then(|| MapBuilder::new(&spec.output));
        let css = if minify {
            render_minified(&spec.id, &collected, map.as_mut())?
        } else {
            render_readable(spec, &collected, map.as_mut())
        };

        let mut output = BuildOutput::new(spec.id.clone());
        output.dependency_manifest = collected.files.iter().map(|f| f.path.clone()).collect();

        match map {
            Some(map) => {
                let map_path = spec.source_map_path();
                let map_name = map_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let css = format!("{css}/*# sourceMappingURL={map_name} */\n");
                output.artifacts.push(Artifact::new(&spec.output, css));
                output.artifacts.push(Artifact::new(map_path, map.finish()));
            }
            None => output.artifacts.push(Artifact::new(&spec.output, css)),
        }

        debug!(
            pipeline = %spec.id,
            stylesheets = collected.files.len(),
            minify,
            "stylesheet compiled"
        );
        Ok(output)
    }
}

/// Depth-first walk; a file is pushed after everything it imports.
fn collect(
    pipeline_id: &PipelineId,
    path: &Path,
    wrappers: Vec<String>,
    collected: &mut Collected,
) -> Result<()> {
    let source =
        fs::read_to_string(path).map_err(|e| CompileError::read(pipeline_id, path, e))?;
    let imports = scan_imports(&source);
    let base = path.parent().unwrap_or_else(|| Path::new("/"));

    for import in &imports {
        if import.is_external() {
            let statement = source[import.range.clone()].to_string();
            if !collected.external.contains(&statement) {
                collected.external.push(statement);
            }
            continue;
        }

        let resolved = resolve_import(base, &import.url).ok_or_else(|| {
            CompileError::new(
                pipeline_id,
                format!("cannot resolve stylesheet import '{}'", import.url),
            )
            .at(SourceLocation::from_offset(
                path,
                &source,
                import.range.start as u32,
            ))
        })?;

        if !collected.visited.insert(resolved.clone()) {
            continue;
        }
        let mut nested = wrappers.clone();
        nested.extend(import.conditions.open());
        collect(pipeline_id, &resolved, nested, collected)?;
    }

    let body = imports::strip_imports(&source, &imports);
    collected.files.push(StyleFile {
        path: path.to_path_buf(),
        source,
        body,
        wrappers,
    });
    Ok(())
}

/// Relative to the importing file; a missing `.css` extension is added.
fn resolve_import(base: &Path, url: &str) -> Option<PathBuf> {
    let url = url.split(['?', '#']).next().unwrap_or(url);
    let candidate = base.join(url).clean();
    if candidate.is_file() {
        return Some(candidate);
    }
    if candidate.extension().is_none() {
        let with_ext = candidate.with_extension("css");
        if with_ext.is_file() {
            return Some(with_ext);
        }
    }
    None
}

fn css_error<T: fmt::Display>(
    pipeline_id: &PipelineId,
    path: &Path,
    error: &CssError<T>,
) -> CompileError {
    let compile = CompileError::new(pipeline_id, format!("invalid stylesheet: {}", error.kind));
    match &error.loc {
        Some(loc) => compile.at(SourceLocation::new(path, loc.line + 1, loc.column)),
        None => compile.at(SourceLocation::new(path, 1, 1)),
    }
}

fn validate(pipeline_id: &PipelineId, file: &StyleFile) -> Result<()> {
    StyleSheet::parse(
        &file.body,
        ParserOptions {
            filename: file.path.display().to_string(),
            ..ParserOptions::default()
        },
    )
    .map(|_| ())
    .map_err(|e| css_error(pipeline_id, &file.path, &e))
}

fn minify_file(pipeline_id: &PipelineId, file: &StyleFile) -> Result<String> {
    let mut stylesheet = StyleSheet::parse(
        &file.body,
        ParserOptions {
            filename: file.path.display().to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| css_error(pipeline_id, &file.path, &e))?;
    stylesheet
        .minify(MinifyOptions::default())
        .map_err(|e| css_error(pipeline_id, &file.path, &e))?;
    let printed = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|e| css_error(pipeline_id, &file.path, &e))?;
    Ok(printed.code)
}

/// Source text as written, one line of output per line of input.
fn render_readable(
    spec: &PipelineSpec,
    collected: &Collected,
    mut map: Option<&mut MapBuilder>,
) -> String {
    let out_dir = spec.output.parent().unwrap_or_else(|| Path::new("/"));
    let mut css = String::new();
    let mut line = 0u32;

    for statement in &collected.external {
        css.push_str(statement);
        css.push('\n');
        line += 1;
    }

    for file in &collected.files {
        let source_id = map.as_mut().map(|m| m.add_source(&file.path, &file.source));

        for wrapper in &file.wrappers {
            css.push_str(wrapper);
            css.push('\n');
            line += 1;
        }
        css.push_str(&format!("/* {} */\n", relative_path(out_dir, &file.path)));
        line += 1;

        for (src_line, text) in file.body.lines().enumerate() {
            if let (Some(map), Some(id)) = (map.as_mut(), source_id) {
                map.add_line(line, id, src_line as u32);
            }
            css.push_str(text.trim_end());
            css.push('\n');
            line += 1;
        }

        if !file.wrappers.is_empty() {
            css.push_str(&"}".repeat(file.wrappers.len()));
            css.push('\n');
            line += 1;
        }
    }

    css
}

/// Each stylesheet minified onto its own line.
fn render_minified(
    pipeline_id: &PipelineId,
    collected: &Collected,
    mut map: Option<&mut MapBuilder>,
) -> Result<String> {
    let mut css = String::new();
    let mut line = 0u32;

    for statement in &collected.external {
        css.push_str(statement);
        css.push('\n');
        line += 1;
    }

    for file in &collected.files {
        let code = minify_file(pipeline_id, file)?;
        if code.trim().is_empty() {
            continue;
        }
        if let Some(map) = map.as_mut() {
            let id = map.add_source(&file.path, &file.source);
            map.add_line(line, id, 0);
        }
        css.push_str(&file.wrappers.concat());
        css.push_str(code.trim());
        css.push_str(&"}".repeat(file.wrappers.len()));
        css.push('\n');
        line += 1;
    }

    Ok(css)
}
