//! The module runtime embedded in every script bundle.
//!
//! A bundle is one IIFE that receives a table of module factories and the
//! entry id:
//!
//! ```text
//! (function (modules, entry) {
//! <runtime>
//! load(entry, null);
//! })({
//! "src/app.js": function (module, exports, __kiln_require) {
//! <module body>
//! },
//! }, "src/app.js");
//! ```
//!
//! The hot bundle also carries the HMR runtime, which exposes
//! `globalThis.__kiln_hmr` for the dev client to push replacement
//! factories through.

use kiln_graph::ModuleId;

use super::render::{quote, REQUIRE};

const RUNTIME: &str = include_str!("../../assets/runtime/runtime.js");
const HOT_RUNTIME: &str = include_str!("../../assets/runtime/hot-runtime.js");

/// Everything up to the first factory.
pub fn prologue(hot: bool) -> String {
    let mut out = String::from("(function (modules, entry) {\n");
    out.push_str(RUNTIME);
    if hot {
        out.push_str(HOT_RUNTIME);
    }
    out.push_str("load(entry, null);\n})({\n");
    out
}

/// Opening line of a factory in the module table.
pub fn factory_open(id: &ModuleId) -> String {
    format!("{}: function (module, exports, {REQUIRE}) {{\n", quote(id.as_str()))
}

pub const FACTORY_CLOSE: &str = "},\n";

pub fn epilogue(entry: &ModuleId) -> String {
    format!("}}, {});\n", quote(entry.as_str()))
}

/// Script the dev client evaluates to stage a replacement factory.
pub fn hot_update_script(id: &ModuleId, body: &str) -> String {
    let mut out = format!(
        "__kiln_hmr.define({}, function (module, exports, {REQUIRE}) {{\n",
        quote(id.as_str())
    );
    out.push_str(body);
    if !body.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("});\n//# sourceURL=kiln:///");
    out.push_str(id.as_str());
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hot_runtime_only_in_hot_bundles() {
        assert!(prologue(true).contains("__kiln_hmr"));
        assert!(!prologue(false).contains("__kiln_hmr"));
        assert!(prologue(false).ends_with("})({\n"));
    }

    #[test]
    fn update_script_defines_factory() {
        let script = hot_update_script(&ModuleId::new("src/a.js"), "exports.x = 1;");
        assert!(script.starts_with(
            "__kiln_hmr.define(\"src/a.js\", function (module, exports, __kiln_require) {\nexports.x = 1;\n});"
        ));
        assert!(script.ends_with("//# sourceURL=kiln:///src/a.js\n"));
    }
}
