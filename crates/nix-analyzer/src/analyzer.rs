//! The analyzer: one evaluator, the package-set cache, and the pipeline
//! that turns (document, position) into an [`Analysis`].

use std::cell::RefCell;
use std::rc::Rc;

use nix_eval::{EvalError, Evaluator, ExprRef, SourceUnit, Value, ValueRef, value_ref};
use nix_lexer::Position;
use nix_parser::{Expr, SymbolTable};
use tracing::debug;

use crate::analysis::{Analysis, PathEntry, update_env};
use crate::config;
use crate::diagnostics::{Diagnostic, from_eval_error};
use crate::document::{Document, FileInfo, FileType};
use crate::flakes;

/// Process-wide analysis engine. Owned by the server; the evaluator and
/// its caches are initialised once and never torn down.
pub struct Analyzer {
    eval: Evaluator,
    package_set: RefCell<Option<ValueRef>>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer::new()
    }
}

impl Analyzer {
    /// Create an analyzer with a fresh evaluator and symbol table.
    pub fn new() -> Self {
        let symbols = Rc::new(SymbolTable::new());
        Analyzer { eval: Evaluator::new(symbols), package_set: RefCell::new(None) }
    }

    /// The evaluator.
    pub fn evaluator(&self) -> &Evaluator {
        &self.eval
    }

    /// The shared symbol table.
    pub fn symbols(&self) -> &Rc<SymbolTable> {
        self.eval.symbols()
    }

    // ===== Documents =====

    /// Parse (or reuse) the document's source unit.
    pub fn unit_for(&self, doc: &Document) -> Rc<SourceUnit> {
        if let Some(unit) = doc.cached_unit() {
            return unit;
        }
        let result = nix_parser::parse(
            doc.source(),
            doc.path.as_deref(),
            &doc.base_path,
            self.symbols(),
        );
        let unit = self.eval.bind_unit(result, doc.path.clone());
        doc.cache_unit(unit.clone());
        unit
    }

    /// Populate the document's per-file caches: file type, config stack,
    /// and (for flakes) the synthesised input attr set. Runs on open and
    /// on save.
    pub fn refresh_file_info(&self, doc: &Document) {
        let stack = config::load_stack(&self.eval, doc.path.as_deref());
        let file_type = if doc.is_flake() {
            FileType::Flake
        } else if is_package_path(doc.path.as_deref()) {
            FileType::Package
        } else {
            FileType::None
        };
        let flake_inputs = if file_type == FileType::Flake {
            flakes::flake_inputs(self, doc)
        } else {
            None
        };
        *doc.file_info.borrow_mut() = FileInfo { flake_inputs, file_type, config: stack };
    }

    // ===== The pipeline =====

    /// Locate the cursor path and reconstruct the environments along it.
    pub fn analyze(&self, doc: &Document, pos: Position) -> Analysis {
        let unit = self.unit_for(doc);
        let cursor = nix_parser::locate(&unit.result, pos);
        let mut analysis = Analysis {
            unit,
            entries: cursor.path.into_iter().map(PathEntry::new).collect(),
            attr: cursor.attr,
            formal: cursor.formal,
            inherit: cursor.inherit,
            diagnostics: Vec::new(),
        };
        self.infer_lambda_args(doc, &mut analysis);
        self.calculate_envs(&mut analysis);
        debug!(
            path_len = analysis.entries.len(),
            attr = ?analysis.attr,
            "analysis complete"
        );
        analysis
    }

    /// Synthetic lambda arguments for the lambdas on the path: flake
    /// outputs get the flake inputs, package files get the package set.
    /// Call-site arguments are filled in during the environment walk,
    /// which is the first moment the call's environment exists.
    fn infer_lambda_args(&self, doc: &Document, analysis: &mut Analysis) {
        let n = analysis.entries.len();
        if n == 0 {
            return;
        }

        if let Some(index) = flakes::outputs_lambda_index(self, doc, analysis) {
            let inputs = doc.file_info.borrow().flake_inputs.clone();
            match inputs {
                Some(inputs) => analysis.entries[index].lambda_arg = Some(inputs),
                None => debug!("flake inputs are not available"),
            }
            return;
        }

        if doc.file_info.borrow().file_type != FileType::Package {
            return;
        }
        let top_lambda = (0..n)
            .rev()
            .find(|&i| matches!(analysis.unit.result.ast.expr(analysis.entries[i].expr), Expr::Lambda(_)));
        if let Some(index) = top_lambda {
            match self.package_set_value(doc) {
                Ok(pkgs) => analysis.entries[index].lambda_arg = Some(pkgs),
                Err(err) => analysis.diagnostics.push(from_eval_error(&err)),
            }
        }
    }

    /// Walk the path outermost to innermost, assigning each entry the
    /// environment its expression would be evaluated in.
    fn calculate_envs(&self, analysis: &mut Analysis) {
        let n = analysis.entries.len();
        if n == 0 {
            return;
        }
        let unit = analysis.unit.clone();
        let mut env = self.eval.base_env();
        analysis.entries[n - 1].env = Some(env.clone());

        for i in (1..n).rev() {
            let parent = analysis.entries[i].expr;
            let child = analysis.entries[i - 1].expr;

            // A lambda entered through a call on the path receives its
            // call-site argument, evaluated in the call's environment.
            if analysis.entries[i - 1].lambda_arg.is_none()
                && matches!(unit.result.ast.expr(child), Expr::Lambda(_))
            {
                if let Expr::Call { fun, args } = unit.result.ast.expr(parent) {
                    if *fun == child && !args.is_empty() {
                        let arg_ref = ExprRef { unit: unit.clone(), id: args[0] };
                        match self.eval.eval(&arg_ref, &env) {
                            Ok(v) => analysis.entries[i - 1].lambda_arg = Some(v),
                            Err(err) => {
                                analysis.diagnostics.push(from_eval_error(&err));
                            }
                        }
                    }
                }
            }

            let lambda_arg = analysis.entries[i].lambda_arg.clone();
            env = update_env(&self.eval, &unit, parent, child, env, lambda_arg);
            analysis.entries[i - 1].env = Some(env.clone());
        }
    }

    // ===== Package set =====

    /// The configured package root: the `nixpkgs` config setting, with the
    /// `nixpkgs` search-path entry as fallback.
    pub fn package_root(&self, doc: &Document) -> Option<String> {
        let info = doc.file_info.borrow();
        if let Some(root) = config::get_string(&self.eval, &info.config, "nixpkgs") {
            return Some(root);
        }
        drop(info);
        nix_path_lookup("nixpkgs")
    }

    /// The package-set fixpoint: import the package root and call it with
    /// an empty argument. Cached for the life of the process.
    pub fn package_set_value(&self, doc: &Document) -> Result<ValueRef, EvalError> {
        if let Some(cached) = self.package_set.borrow().clone() {
            return Ok(cached);
        }
        let root = self.package_root(doc).ok_or_else(|| {
            EvalError::new(
                "no package root configured: set 'nixpkgs' in nix-analyzer-config.nix \
                 or add a nixpkgs entry to $NIX_PATH",
            )
        })?;
        let fun = self.eval.import(&root)?;
        let empty = value_ref(Value::attrs_from([]));
        let pkgs = self.eval.call(&fun, empty)?;
        *self.package_set.borrow_mut() = Some(pkgs.clone());
        Ok(pkgs)
    }

    /// Invalidate the package-set cache (configuration reload).
    pub fn invalidate_package_set(&self) {
        *self.package_set.borrow_mut() = None;
        self.eval.clear_import_cache();
    }
}

/// Package files by convention: anything under a `pkgs/` tree or named
/// `package.nix`.
fn is_package_path(path: Option<&str>) -> bool {
    path.is_some_and(|p| p.contains("/pkgs/") || p.ends_with("/package.nix"))
}

/// Resolve a prefix against `NIX_PATH` without going through the
/// evaluator.
fn nix_path_lookup(name: &str) -> Option<String> {
    let raw = std::env::var("NIX_PATH").ok()?;
    for element in raw.split(':').filter(|e| !e.is_empty()) {
        match element.split_once('=') {
            Some((prefix, path)) if prefix == name => return Some(path.to_string()),
            Some(_) => {}
            None => {
                let candidate = format!("{}/{}", element.trim_end_matches('/'), name);
                if std::path::Path::new(&candidate).exists() {
                    return Some(candidate);
                }
            }
        }
    }
    None
}

/// A diagnostic for a node of the analysis, at its own range.
pub fn diagnostic_at(unit: &SourceUnit, id: nix_parser::ExprId, message: String) -> Diagnostic {
    Diagnostic { message, range: unit.range(id) }
}
