//! The schema engine: expected attribute vocabularies at a position.
//!
//! Two sources of vocabulary are recognised when the cursor sits inside an
//! attribute set: a call whose callee is (a selection ending in)
//! `mkDerivation`, and an option tree provided through the configuration
//! stack. Option trees are read from the evaluator: an attrs whose
//! `_type` is `option` is a leaf; any other attrs is a tree whose keys
//! carry sub-schemas. More specific matches win over the lexical-scope
//! fallback, which lives in the completion layer.

use nix_eval::{Evaluator, ValueRef};
use nix_parser::{Expr, ExprId, Symbol};

use crate::analysis::Analysis;
use crate::analyzer::Analyzer;
use crate::config;
use crate::document::Document;

/// One expected attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaItem {
    /// Attribute name.
    pub name: String,
    /// Optional documentation.
    pub doc: Option<String>,
}

impl SchemaItem {
    fn new(name: &str, doc: &str) -> Self {
        SchemaItem { name: name.to_string(), doc: Some(doc.to_string()) }
    }
}

/// A resolved schema: a fixed vocabulary or an option tree value.
pub enum Schema {
    /// A fixed list of items.
    Items(Vec<SchemaItem>),
    /// An option tree; keys are read from the evaluator on demand.
    Options(ValueRef),
}

impl Schema {
    /// The expected attribute names at this level.
    pub fn items(&self, eval: &Evaluator) -> Vec<SchemaItem> {
        match self {
            Schema::Items(items) => items.clone(),
            Schema::Options(value) => {
                let Ok(set) = eval.force_attrs(value) else { return Vec::new() };
                if is_option_leaf(eval, value) {
                    return Vec::new();
                }
                let symbols = eval.symbols();
                set.attrs
                    .keys()
                    .map(|sym| symbols.name(*sym))
                    .filter(|name| !name.is_empty() && !name.starts_with('_'))
                    .map(|name| SchemaItem { name, doc: None })
                    .collect()
            }
        }
    }

    /// Descend into the sub-schema of one attribute.
    pub fn subschema(&self, eval: &Evaluator, sym: Symbol) -> Option<Schema> {
        match self {
            Schema::Items(_) => None,
            Schema::Options(value) => {
                let set = eval.force_attrs(value).ok()?;
                let attr = set.get(sym)?;
                Some(Schema::Options(attr.value.clone()))
            }
        }
    }
}

/// `{ _type = "option"; ... }` marks a leaf of an option tree.
fn is_option_leaf(eval: &Evaluator, value: &ValueRef) -> bool {
    let Ok(set) = eval.force_attrs(value) else { return false };
    let type_sym = eval.symbols().intern("_type");
    match set.get(type_sym) {
        Some(attr) => matches!(
            eval.force_string(&attr.value).as_deref(),
            Ok("option")
        ),
        None => false,
    }
}

/// Resolve the schema of the innermost attribute set on the cursor path.
pub fn get_schema(analyzer: &Analyzer, doc: &Document, analysis: &Analysis) -> Option<Schema> {
    let entries = &analysis.entries;
    if entries.len() < 2 {
        return None;
    }
    let unit = &analysis.unit;
    if !matches!(unit.result.ast.expr(entries[0].expr), Expr::Attrs(_)) {
        return None;
    }

    // Call-shape match: `stdenv.mkDerivation { <cursor> }`.
    if let Expr::Call { fun, args } = unit.result.ast.expr(entries[1].expr) {
        if *fun != entries[0].expr && args.contains(&entries[0].expr) {
            if let Some(name) = callee_name(analyzer, unit, *fun) {
                if name == "mkDerivation" {
                    return Some(Schema::Items(mk_derivation_items()));
                }
            }
        }
    }

    // Option-tree match: the configuration stack provides an options
    // root; descend along the attribute path from the document root.
    let options = {
        let info = doc.file_info.borrow();
        config::get_value(analyzer.evaluator(), &info.config, "options")
    }?;
    let mut schema = Schema::Options(options);
    for sym in attr_path_to_innermost(unit, entries) {
        schema = schema.subschema(analyzer.evaluator(), sym)?;
    }
    Some(schema)
}

/// Syntactic callee name: a variable, or the last component of a
/// selection.
fn callee_name(
    analyzer: &Analyzer,
    unit: &std::rc::Rc<nix_eval::SourceUnit>,
    fun: ExprId,
) -> Option<String> {
    let symbols = analyzer.symbols();
    match unit.result.ast.expr(fun) {
        Expr::Var(sym) => Some(symbols.name(*sym)),
        Expr::Select { path, .. } => path.last()?.symbol().map(|sym| symbols.name(sym)),
        _ => None,
    }
}

/// Attribute names along the path from the outermost node down to the
/// innermost attribute set, outer first.
fn attr_path_to_innermost(
    unit: &std::rc::Rc<nix_eval::SourceUnit>,
    entries: &[crate::analysis::PathEntry],
) -> Vec<Symbol> {
    let mut names = Vec::new();
    for i in (1..entries.len()).rev() {
        let parent = entries[i].expr;
        let child = entries[i - 1].expr;
        if let Expr::Attrs(attrs) = unit.result.ast.expr(parent) {
            for (sym, def) in &attrs.attrs {
                if def.expr == child {
                    names.push(*sym);
                    break;
                }
            }
        }
    }
    names
}

/// The `mkDerivation` vocabulary.
fn mk_derivation_items() -> Vec<SchemaItem> {
    vec![
        SchemaItem::new("pname", "Package name without the version."),
        SchemaItem::new("version", "Package version."),
        SchemaItem::new("name", "Full derivation name; usually pname-version."),
        SchemaItem::new("src", "Source of the package."),
        SchemaItem::new("srcs", "Multiple sources."),
        SchemaItem::new("sourceRoot", "Directory to change into after unpacking."),
        SchemaItem::new("outputs", "Derivation outputs, e.g. [ \"out\" \"dev\" ]."),
        SchemaItem::new("buildInputs", "Dependencies available at run time."),
        SchemaItem::new("nativeBuildInputs", "Dependencies available at build time."),
        SchemaItem::new(
            "propagatedBuildInputs",
            "Dependencies propagated to dependents.",
        ),
        SchemaItem::new("patches", "Patches applied before the configure phase."),
        SchemaItem::new("configureFlags", "Extra flags passed to configure."),
        SchemaItem::new("makeFlags", "Extra flags passed to make."),
        SchemaItem::new("buildPhase", "Shell code for the build phase."),
        SchemaItem::new("checkPhase", "Shell code for the check phase."),
        SchemaItem::new("installPhase", "Shell code for the install phase."),
        SchemaItem::new("preBuild", "Hook run before the build phase."),
        SchemaItem::new("postBuild", "Hook run after the build phase."),
        SchemaItem::new("preInstall", "Hook run before the install phase."),
        SchemaItem::new("postInstall", "Hook run after the install phase."),
        SchemaItem::new("doCheck", "Whether to run the check phase."),
        SchemaItem::new("dontUnpack", "Skip the unpack phase."),
        SchemaItem::new("dontConfigure", "Skip the configure phase."),
        SchemaItem::new("dontBuild", "Skip the build phase."),
        SchemaItem::new("strictDeps", "Enforce build/run dependency separation."),
        SchemaItem::new("env", "Environment variables set in the builder."),
        SchemaItem::new("passthru", "Extra attributes not passed to the builder."),
        SchemaItem::new("meta", "Package metadata: description, license, maintainers."),
    ]
}
