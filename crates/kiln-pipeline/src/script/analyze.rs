//! Per-module analysis.
//!
//! Parses a module with oxc, strips TypeScript and JSX when the file needs
//! it, and records every piece of module syntax the bundle format has to
//! rewrite as an [`Edit`] over the resulting JavaScript text.

use std::ops::Range;
use std::path::Path;

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, CallExpression, Declaration, ExportDefaultDeclarationKind, Expression,
    ImportDeclarationSpecifier, ImportExpression, MetaProperty, ModuleDeclaration,
    ModuleExportName, Program, StaticMemberExpression,
};
use oxc_ast_visit::{walk, Visit};
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_diagnostics::OxcDiagnostic;
use oxc_parser::{Parser, ParserReturn};
use oxc_semantic::SemanticBuilder;
use oxc_sourcemap::SourceMap;
use oxc_span::{GetSpan, SourceType};
use oxc_transformer::{TransformOptions, Transformer};
use rustc_hash::FxHashMap as HashMap;

/// A binding introduced by an import declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportBinding {
    Default(String),
    Namespace(String),
    Named { imported: String, local: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditKind {
    /// `import ... from "x"` or `import "x"`
    Import {
        specifier: String,
        bindings: Vec<ImportBinding>,
    },
    /// `export { a as b } from "x"`, as (exported, imported) pairs
    ReExport {
        specifier: String,
        names: Vec<(String, String)>,
    },
    /// `export * from "x"` or `export * as ns from "x"`
    ExportStar {
        specifier: String,
        alias: Option<String>,
    },
    /// `require("x")`
    Require { specifier: String },
    /// `import("x")`
    DynamicImport { specifier: String },
    /// `import.meta`
    ImportMeta,
    /// `process.env.NODE_ENV`
    NodeEnv,
    /// Literal replacement, usually removing `export` keywords
    Replace(String),
}

impl EditKind {
    pub fn specifier(&self) -> Option<&str> {
        match self {
            EditKind::Import { specifier, .. }
            | EditKind::ReExport { specifier, .. }
            | EditKind::ExportStar { specifier, .. }
            | EditKind::Require { specifier }
            | EditKind::DynamicImport { specifier } => Some(specifier),
            _ => None,
        }
    }
}

/// Replace `range` of the module text according to `kind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub range: Range<usize>,
    pub kind: EditKind,
}

/// A name the module exports, read lazily from a local expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBinding {
    pub exported: String,
    pub local: String,
}

/// Parse or transform failure inside one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    /// Byte offset into the original source
    pub offset: Option<u32>,
}

#[derive(Debug)]
pub struct AnalyzedModule {
    /// Original file contents
    pub source: String,
    /// JavaScript the edits apply to
    pub code: String,
    /// Present when `code` was generated from TypeScript or JSX
    pub generated_map: Option<SourceMap>,
    pub edits: Vec<Edit>,
    pub exports: Vec<ExportBinding>,
    pub is_esm: bool,
    /// Byte offset in `source` where each specifier first appears
    pub origins: HashMap<String, u32>,
    /// Dynamic imports whose target is not a string literal
    pub unresolvable_dynamic: Vec<u32>,
}

impl AnalyzedModule {
    /// Specifiers in order of first appearance.
    pub fn specifiers(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for edit in &self.edits {
            if let Some(specifier) = edit.kind.specifier() {
                if !seen.contains(&specifier) {
                    seen.push(specifier);
                }
            }
        }
        seen
    }
}

/// Whether `path` must go through the TypeScript/JSX transform.
pub fn needs_transform(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("ts" | "tsx" | "mts" | "cts" | "jsx")
    )
}

pub fn analyze(path: &Path, source: String) -> Result<AnalyzedModule, SyntaxError> {
    if path.extension().is_some_and(|e| e == "json") {
        return analyze_json(source);
    }

    let allocator = Allocator::default();
    let source_type = SourceType::from_path(path).unwrap_or_else(|_| SourceType::mjs());
    let ParserReturn {
        mut program,
        errors,
        ..
    } = Parser::new(&allocator, &source, source_type).parse();
    if let Some(error) = errors.first() {
        return Err(syntax_error(error));
    }

    let original = collect(&program);
    let origins = origins_of(&original.edits);

    if !needs_transform(path) {
        return Ok(AnalyzedModule {
            code: source.clone(),
            source,
            generated_map: None,
            edits: original.edits,
            exports: original.exports,
            is_esm: original.is_esm,
            origins,
            unresolvable_dynamic: original.unresolvable_dynamic,
        });
    }

    let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
    let transformed = Transformer::new(&allocator, path, &TransformOptions::default())
        .build_with_scoping(scoping, &mut program);
    if let Some(error) = transformed.errors.first() {
        return Err(syntax_error(error));
    }

    let generated = Codegen::new()
        .with_options(CodegenOptions {
            source_map_path: Some(path.to_path_buf()),
            ..CodegenOptions::default()
        })
        .build(&program);

    let js_allocator = Allocator::default();
    let reparsed = Parser::new(&js_allocator, &generated.code, SourceType::mjs()).parse();
    if let Some(error) = reparsed.errors.first() {
        return Err(SyntaxError {
            message: format!("generated JavaScript is invalid: {}", error.message),
            offset: None,
        });
    }
    let collected = collect(&reparsed.program);

    Ok(AnalyzedModule {
        source,
        code: generated.code.clone(),
        generated_map: generated.map,
        edits: collected.edits,
        exports: collected.exports,
        is_esm: collected.is_esm,
        origins,
        unresolvable_dynamic: original.unresolvable_dynamic,
    })
}

fn analyze_json(source: String) -> Result<AnalyzedModule, SyntaxError> {
    if let Err(e) = serde_json::from_str::<serde_json::Value>(&source) {
        let offset = offset_of(&source, e.line(), e.column());
        return Err(SyntaxError {
            message: format!("invalid JSON: {e}"),
            offset: Some(offset),
        });
    }

    Ok(AnalyzedModule {
        code: format!("module.exports = {};", source.trim_end()),
        source,
        generated_map: None,
        edits: Vec::new(),
        exports: Vec::new(),
        is_esm: false,
        origins: HashMap::default(),
        unresolvable_dynamic: Vec::new(),
    })
}

/// Byte offset of a 1-based line and column.
fn offset_of(source: &str, line: usize, column: usize) -> u32 {
    let line_start: usize = source
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    (line_start + column.saturating_sub(1)).min(source.len()) as u32
}

fn syntax_error(error: &OxcDiagnostic) -> SyntaxError {
    let offset = error
        .labels
        .as_ref()
        .and_then(|labels| labels.first())
        .map(|label| label.offset() as u32);
    SyntaxError {
        message: error.message.to_string(),
        offset,
    }
}

fn origins_of(edits: &[Edit]) -> HashMap<String, u32> {
    let mut origins = HashMap::default();
    for edit in edits {
        if let Some(specifier) = edit.kind.specifier() {
            origins
                .entry(specifier.to_string())
                .or_insert(edit.range.start as u32);
        }
    }
    origins
}

#[derive(Debug, Default)]
struct Collected {
    edits: Vec<Edit>,
    exports: Vec<ExportBinding>,
    is_esm: bool,
    unresolvable_dynamic: Vec<u32>,
}

impl Collected {
    fn edit(&mut self, range: Range<u32>, kind: EditKind) {
        self.edits.push(Edit {
            range: range.start as usize..range.end as usize,
            kind,
        });
    }

    fn remove(&mut self, range: Range<u32>) {
        self.edit(range, EditKind::Replace(String::new()));
    }

    fn export(&mut self, exported: impl Into<String>, local: impl Into<String>) {
        self.exports.push(ExportBinding {
            exported: exported.into(),
            local: local.into(),
        });
    }
}

fn export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(ident) => ident.name.to_string(),
        ModuleExportName::IdentifierReference(ident) => ident.name.to_string(),
        ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
    }
}

fn collect(program: &Program<'_>) -> Collected {
    let mut collected = Collected::default();

    for stmt in &program.body {
        let Some(decl) = stmt.as_module_declaration() else {
            continue;
        };
        collected.is_esm = true;
        let span = decl.span();

        match decl {
            ModuleDeclaration::ImportDeclaration(import) => {
                if import.import_kind.is_type() {
                    collected.remove(span.start..span.end);
                    continue;
                }
                let mut bindings = Vec::new();
                for spec in import.specifiers.iter().flatten() {
                    match spec {
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                            bindings.push(ImportBinding::Default(s.local.name.to_string()));
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                            bindings.push(ImportBinding::Namespace(s.local.name.to_string()));
                        }
                        ImportDeclarationSpecifier::ImportSpecifier(s) => {
                            if s.import_kind.is_type() {
                                continue;
                            }
                            bindings.push(ImportBinding::Named {
                                imported: export_name(&s.imported),
                                local: s.local.name.to_string(),
                            });
                        }
                    }
                }
                collected.edit(
                    span.start..span.end,
                    EditKind::Import {
                        specifier: import.source.value.to_string(),
                        bindings,
                    },
                );
            }

            ModuleDeclaration::ExportAllDeclaration(all) => {
                if all.export_kind.is_type() {
                    collected.remove(span.start..span.end);
                    continue;
                }
                collected.edit(
                    span.start..span.end,
                    EditKind::ExportStar {
                        specifier: all.source.value.to_string(),
                        alias: all.exported.as_ref().map(export_name),
                    },
                );
            }

            ModuleDeclaration::ExportDefaultDeclaration(default) => {
                let inner = default.declaration.span();
                match &default.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(func) => match &func.id {
                        Some(id) => {
                            collected.remove(span.start..inner.start);
                            collected.export("default", id.name.as_str());
                        }
                        None => collected.edit(
                            span.start..inner.start,
                            EditKind::Replace("exports.default = ".to_string()),
                        ),
                    },
                    ExportDefaultDeclarationKind::ClassDeclaration(class) => match &class.id {
                        Some(id) => {
                            collected.remove(span.start..inner.start);
                            collected.export("default", id.name.as_str());
                        }
                        None => collected.edit(
                            span.start..inner.start,
                            EditKind::Replace("exports.default = ".to_string()),
                        ),
                    },
                    ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => {
                        collected.remove(span.start..span.end);
                    }
                    _ => collected.edit(
                        span.start..inner.start,
                        EditKind::Replace("exports.default = ".to_string()),
                    ),
                }
            }

            ModuleDeclaration::ExportNamedDeclaration(named) => {
                if named.export_kind.is_type() {
                    collected.remove(span.start..span.end);
                    continue;
                }

                if let Some(source) = &named.source {
                    let names = named
                        .specifiers
                        .iter()
                        .filter(|s| !s.export_kind.is_type())
                        .map(|s| (export_name(&s.exported), export_name(&s.local)))
                        .collect();
                    collected.edit(
                        span.start..span.end,
                        EditKind::ReExport {
                            specifier: source.value.to_string(),
                            names,
                        },
                    );
                    continue;
                }

                match &named.declaration {
                    Some(declaration) => {
                        let names: Vec<String> = match declaration {
                            Declaration::VariableDeclaration(var) => var
                                .declarations
                                .iter()
                                .flat_map(|d| d.id.get_binding_identifiers())
                                .map(|ident| ident.name.to_string())
                                .collect(),
                            Declaration::FunctionDeclaration(func) => {
                                func.id.iter().map(|id| id.name.to_string()).collect()
                            }
                            Declaration::ClassDeclaration(class) => {
                                class.id.iter().map(|id| id.name.to_string()).collect()
                            }
                            _ => {
                                // Type-only declarations have no runtime value.
                                collected.remove(span.start..span.end);
                                continue;
                            }
                        };
                        collected.remove(span.start..declaration.span().start);
                        for name in names {
                            collected.export(name.clone(), name);
                        }
                    }
                    None => {
                        collected.remove(span.start..span.end);
                        for s in named.specifiers.iter().filter(|s| !s.export_kind.is_type()) {
                            collected.export(export_name(&s.exported), export_name(&s.local));
                        }
                    }
                }
            }

            _ => {}
        }
    }

    let mut expressions = ExpressionCollector::default();
    expressions.visit_program(program);
    collected.edits.extend(expressions.edits);
    collected
        .unresolvable_dynamic
        .extend(expressions.unresolvable_dynamic);

    collected.edits.sort_by_key(|e| e.range.start);
    collected
}

/// Finds `require()`, `import()`, `import.meta` and `process.env.NODE_ENV`
/// anywhere in the module.
#[derive(Default)]
struct ExpressionCollector {
    edits: Vec<Edit>,
    unresolvable_dynamic: Vec<u32>,
}

impl ExpressionCollector {
    fn push(&mut self, start: u32, end: u32, kind: EditKind) {
        self.edits.push(Edit {
            range: start as usize..end as usize,
            kind,
        });
    }
}

impl<'a> Visit<'a> for ExpressionCollector {
    fn visit_import_expression(&mut self, it: &ImportExpression<'a>) {
        match &it.source {
            Expression::StringLiteral(lit) => self.push(
                it.span.start,
                it.span.end,
                EditKind::DynamicImport {
                    specifier: lit.value.to_string(),
                },
            ),
            _ => self.unresolvable_dynamic.push(it.span.start),
        }
        walk::walk_import_expression(self, it);
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if let Expression::Identifier(callee) = &it.callee {
            if callee.name.as_str() == "require" && it.arguments.len() == 1 {
                if let Argument::StringLiteral(lit) = &it.arguments[0] {
                    self.push(
                        it.span.start,
                        it.span.end,
                        EditKind::Require {
                            specifier: lit.value.to_string(),
                        },
                    );
                    return;
                }
            }
        }
        walk::walk_call_expression(self, it);
    }

    fn visit_meta_property(&mut self, it: &MetaProperty<'a>) {
        if it.meta.name.as_str() == "import" && it.property.name.as_str() == "meta" {
            self.push(it.span.start, it.span.end, EditKind::ImportMeta);
        }
    }

    fn visit_static_member_expression(&mut self, it: &StaticMemberExpression<'a>) {
        if it.property.name.as_str() == "NODE_ENV" {
            if let Expression::StaticMemberExpression(env) = &it.object {
                if env.property.name.as_str() == "env" {
                    if let Expression::Identifier(process) = &env.object {
                        if process.name.as_str() == "process" {
                            self.push(it.span.start, it.span.end, EditKind::NodeEnv);
                            return;
                        }
                    }
                }
            }
        }
        walk::walk_static_member_expression(self, it);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze_js(source: &str) -> AnalyzedModule {
        analyze(Path::new("/p/src/mod.js"), source.to_string()).unwrap()
    }

    fn kinds(module: &AnalyzedModule) -> Vec<&EditKind> {
        module.edits.iter().map(|e| &e.kind).collect()
    }

    #[test]
    fn collects_import_bindings() {
        let module = analyze_js("import def, { a, b as c } from './x';\nimport * as ns from './y';\nimport './z';\n");
        assert!(module.is_esm);
        assert_eq!(module.specifiers(), vec!["./x", "./y", "./z"]);
        assert_eq!(
            kinds(&module)[0],
            &EditKind::Import {
                specifier: "./x".to_string(),
                bindings: vec![
                    ImportBinding::Default("def".to_string()),
                    ImportBinding::Named {
                        imported: "a".to_string(),
                        local: "a".to_string()
                    },
                    ImportBinding::Named {
                        imported: "b".to_string(),
                        local: "c".to_string()
                    },
                ],
            }
        );
    }

    #[test]
    fn collects_exports() {
        let module = analyze_js(
            "export const one = 1, { two } = { two: 2 };\nexport function three() {}\nconst four = 4;\nexport { four as quattro };\nexport default class Five {}\n",
        );
        let exported: Vec<_> = module
            .exports
            .iter()
            .map(|e| (e.exported.as_str(), e.local.as_str()))
            .collect();
        assert_eq!(
            exported,
            vec![
                ("one", "one"),
                ("two", "two"),
                ("three", "three"),
                ("quattro", "four"),
                ("default", "Five"),
            ]
        );
    }

    #[test]
    fn collects_reexports_and_stars() {
        let module = analyze_js("export { a as b } from './x';\nexport * from './y';\nexport * as z from './z';\n");
        assert_eq!(
            kinds(&module),
            vec![
                &EditKind::ReExport {
                    specifier: "./x".to_string(),
                    names: vec![("b".to_string(), "a".to_string())],
                },
                &EditKind::ExportStar {
                    specifier: "./y".to_string(),
                    alias: None,
                },
                &EditKind::ExportStar {
                    specifier: "./z".to_string(),
                    alias: Some("z".to_string()),
                },
            ]
        );
    }

    #[test]
    fn finds_nested_requires_and_dynamic_imports() {
        let module = analyze_js(
            "function load() {\n  const lib = require('./lib');\n  return import('./lazy');\n}\nif (process.env.NODE_ENV !== 'production') {}\nimport(name);\n",
        );
        assert!(!module.is_esm);
        assert_eq!(module.specifiers(), vec!["./lib", "./lazy"]);
        assert!(kinds(&module).contains(&&EditKind::NodeEnv));
        assert_eq!(module.unresolvable_dynamic.len(), 1);
    }

    #[test]
    fn syntax_error_has_offset() {
        let err = analyze(Path::new("/p/bad.js"), "let x = ;\n".to_string()).unwrap_err();
        assert!(err.offset.is_some());
    }

    #[test]
    fn typescript_is_stripped() {
        let module = analyze(
            Path::new("/p/src/app.ts"),
            "import type { T } from './types';\nimport { helper } from './helper';\nconst n: number = helper();\nexport interface Shape { n: number }\nexport { n };\n".to_string(),
        )
        .unwrap();
        assert!(!module.code.contains(": number"));
        assert!(!module.code.contains("interface"));
        assert_eq!(module.specifiers(), vec!["./helper"]);
        assert!(module.generated_map.is_some());
        assert!(module.origins.contains_key("./helper"));
    }

    #[test]
    fn json_modules_export_their_value() {
        let module = analyze(Path::new("/p/data.json"), "{ \"a\": 1 }\n".to_string()).unwrap();
        assert_eq!(module.code, "module.exports = { \"a\": 1 };");
        let err = analyze(Path::new("/p/data.json"), "{\n  \"a\": }".to_string()).unwrap_err();
        assert!(err.message.starts_with("invalid JSON"));
    }
}
