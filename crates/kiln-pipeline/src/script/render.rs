//! Rewrites an analyzed module into a factory body for the bundle runtime.
//!
//! Every replacement keeps the newline count of the original range, so line
//! `n` of the body is line `n` of the analyzed code. Source maps rely on this.
//! Static imports and re-exports are hoisted onto the first line, ahead of
//! any module code, and leave only their newlines behind.

use kiln_config::Environment;
use kiln_graph::ModuleId;
use rustc_hash::FxHashMap as HashMap;

use super::analyze::{AnalyzedModule, EditKind, ExportBinding, ImportBinding};

/// Name of the require function inside a module factory.
pub const REQUIRE: &str = "__kiln_require";

pub struct RenderContext<'a> {
    /// Resolved module for every specifier the module uses
    pub resolved: &'a HashMap<String, ModuleId>,
    pub environment: Environment,
}

/// An edit starts inside the previous one or runs past the end of the code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEdit {
    /// Byte offset of the edit in the analyzed code
    pub offset: usize,
}

pub fn render(module: &AnalyzedModule, cx: &RenderContext<'_>) -> Result<String, InvalidEdit> {
    let code = module.code.as_str();
    let mut out = String::with_capacity(code.len() + 256);
    let mut hoisted = Vec::new();
    let mut exports: Vec<ExportBinding> = module.exports.clone();
    let mut temps = 0usize;
    let mut cursor = 0usize;

    for edit in &module.edits {
        if edit.range.start < cursor || edit.range.end > code.len() {
            return Err(InvalidEdit {
                offset: edit.range.start,
            });
        }
        out.push_str(&code[cursor..edit.range.start]);

        let mut temp = || {
            let name = format!("__kiln_m{temps}");
            temps += 1;
            name
        };

        let replacement = match &edit.kind {
            EditKind::Import {
                specifier,
                bindings,
            } => {
                let target = target(cx, specifier);
                if bindings.is_empty() {
                    format!("{REQUIRE}({target});")
                } else {
                    let m = temp();
                    let mut text = format!("const {m} = {REQUIRE}.i({target});");
                    let mut named = Vec::new();
                    for binding in bindings {
                        match binding {
                            ImportBinding::Default(local) => {
                                text.push_str(&format!(" const {local} = {m}.default;"));
                            }
                            ImportBinding::Namespace(local) => {
                                text.push_str(&format!(" const {local} = {m};"));
                            }
                            ImportBinding::Named { imported, local } => {
                                named.push(format!("{}: {local}", quote(imported)));
                            }
                        }
                    }
                    if !named.is_empty() {
                        text.push_str(&format!(" const {{ {} }} = {m};", named.join(", ")));
                    }
                    text
                }
            }
            EditKind::ReExport { specifier, names } => {
                let m = temp();
                for (exported, imported) in names {
                    exports.push(ExportBinding {
                        exported: exported.clone(),
                        local: format!("{m}[{}]", quote(imported)),
                    });
                }
                format!("const {m} = {REQUIRE}.i({});", target(cx, specifier))
            }
            EditKind::ExportStar {
                specifier,
                alias: None,
            } => format!(
                "{REQUIRE}.s(exports, {REQUIRE}({}));",
                target(cx, specifier)
            ),
            EditKind::ExportStar {
                specifier,
                alias: Some(alias),
            } => {
                let m = temp();
                exports.push(ExportBinding {
                    exported: alias.clone(),
                    local: m.clone(),
                });
                format!("const {m} = {REQUIRE}.i({});", target(cx, specifier))
            }
            EditKind::Require { specifier } => {
                format!("{REQUIRE}({})", target(cx, specifier))
            }
            EditKind::DynamicImport { specifier } => format!(
                "Promise.resolve().then(function () {{ return {REQUIRE}.i({}); }})",
                target(cx, specifier)
            ),
            EditKind::ImportMeta => "module.meta".to_string(),
            EditKind::NodeEnv => quote(cx.environment.as_str()),
            EditKind::Replace(text) => text.clone(),
        };

        if is_declaration(&edit.kind) {
            hoisted.push(replacement);
        } else {
            out.push_str(&replacement);
        }
        let newlines = code[edit.range.clone()].matches('\n').count();
        out.extend(std::iter::repeat_n('\n', newlines));
        cursor = edit.range.end;
    }
    out.push_str(&code[cursor..]);

    let mut prelude = String::new();
    if module.is_esm {
        prelude.push_str(&format!("\"use strict\"; {REQUIRE}.r(exports);"));
        if !exports.is_empty() {
            let getters: Vec<String> = exports
                .iter()
                .map(|e| {
                    format!(
                        "{}: function () {{ return {}; }}",
                        quote(&e.exported),
                        e.local
                    )
                })
                .collect();
            prelude.push_str(&format!(" {REQUIRE}.d(exports, {{ {} }});", getters.join(", ")));
        }
        prelude.push(' ');
    }
    for declaration in &hoisted {
        prelude.push_str(declaration);
        prelude.push(' ');
    }
    out.insert_str(0, &prelude);

    Ok(out)
}

/// Module-level declarations that run before the module body.
fn is_declaration(kind: &EditKind) -> bool {
    matches!(
        kind,
        EditKind::Import { .. } | EditKind::ReExport { .. } | EditKind::ExportStar { .. }
    )
}

fn target(cx: &RenderContext<'_>, specifier: &str) -> String {
    match cx.resolved.get(specifier) {
        Some(id) => quote(id.as_str()),
        None => quote(specifier),
    }
}

/// JavaScript string literal for `value`.
pub fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
