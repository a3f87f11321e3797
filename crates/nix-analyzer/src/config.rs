//! Configuration discovery.
//!
//! `nix-analyzer-config.nix` may exist in any ancestor of the document,
//! in the system config dirs, and in the install resource dir. Every file
//! that exists is evaluated to a value; lookups walk the stack most
//! specific first. Files that fail to load are logged and treated as
//! absent.

use nix_eval::{Evaluator, Value, ValueRef};
use tracing::{debug, warn};

/// File name looked for at every level.
pub const CONFIG_FILE_NAME: &str = "nix-analyzer-config.nix";

/// Resource dir baked into the install; overridable for tests.
fn resource_dir() -> String {
    std::env::var("NIX_ANALYZER_RESOURCE_DIR")
        .unwrap_or_else(|_| "/usr/share/nix-analyzer".to_string())
}

fn try_load(eval: &Evaluator, path: &std::path::Path) -> Option<ValueRef> {
    if !path.exists() {
        return None;
    }
    match eval.import(&path.to_string_lossy()) {
        Ok(v) => {
            debug!(path = %path.display(), "loaded config file");
            Some(v)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unloadable config file");
            None
        }
    }
}

/// Load the configuration stack for the document at `path`, most specific
/// first: ancestors nearest-first, then XDG config dirs, then the
/// resource dir.
pub fn load_stack(eval: &Evaluator, path: Option<&str>) -> Vec<ValueRef> {
    let mut values = Vec::new();

    if let Some(path) = path {
        let mut dir = std::path::Path::new(path).parent();
        while let Some(current) = dir {
            if let Some(v) = try_load(eval, &current.join(CONFIG_FILE_NAME)) {
                values.push(v);
            }
            dir = current.parent();
        }
    }

    for dir in config_dirs() {
        if let Some(v) = try_load(eval, &std::path::Path::new(&dir).join(CONFIG_FILE_NAME)) {
            values.push(v);
        }
    }

    if let Some(v) =
        try_load(eval, &std::path::Path::new(&resource_dir()).join(CONFIG_FILE_NAME))
    {
        values.push(v);
    }

    values
}

fn config_dirs() -> Vec<String> {
    let mut dirs = Vec::new();
    if let Ok(home) = std::env::var("XDG_CONFIG_HOME") {
        dirs.push(home);
    } else if let Ok(home) = std::env::var("HOME") {
        dirs.push(format!("{home}/.config"));
    }
    match std::env::var("XDG_CONFIG_DIRS") {
        Ok(raw) => dirs.extend(raw.split(':').filter(|d| !d.is_empty()).map(String::from)),
        Err(_) => dirs.push("/etc/xdg".to_string()),
    }
    dirs
}

/// Read a string setting from the stack, most specific wins.
pub fn get_string(eval: &Evaluator, stack: &[ValueRef], key: &str) -> Option<String> {
    let sym = eval.symbols().intern(key);
    for value in stack {
        let Ok(set) = eval.force_attrs(value) else { continue };
        if let Some(attr) = set.get(sym) {
            if let Ok(s) = eval.force_string(&attr.value) {
                return Some(s);
            }
        }
    }
    None
}

/// Read a list-of-strings setting from the stack, most specific wins.
pub fn get_string_list(eval: &Evaluator, stack: &[ValueRef], key: &str) -> Option<Vec<String>> {
    let sym = eval.symbols().intern(key);
    for value in stack {
        let Ok(set) = eval.force_attrs(value) else { continue };
        let Some(attr) = set.get(sym) else { continue };
        let Ok(items) = eval.force_list(&attr.value) else { continue };
        let mut out = Vec::with_capacity(items.len());
        for item in &items {
            match eval.force_string(item) {
                Ok(s) => out.push(s),
                Err(_) => return None,
            }
        }
        return Some(out);
    }
    None
}

/// Read an attrs-valued setting without forcing its contents.
pub fn get_value(eval: &Evaluator, stack: &[ValueRef], key: &str) -> Option<ValueRef> {
    let sym = eval.symbols().intern(key);
    for value in stack {
        let Ok(set) = eval.force_attrs(value) else { continue };
        if let Some(attr) = set.get(sym) {
            if !matches!(&*attr.value.borrow(), Value::Null) {
                return Some(attr.value.clone());
            }
        }
    }
    None
}
