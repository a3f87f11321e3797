//! External formatter integration.
//!
//! The formatter is a child process per request: the document goes to its
//! stdin, stdout becomes the new text. A non-zero exit or a failed spawn
//! yields `None`, which the handler turns into a null response.

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

/// Default formatter command line.
pub const DEFAULT_FORMATTER: &[&str] = &["alejandra", "--quiet"];

/// Run the configured formatter over `source`.
pub fn run_formatter(source: &str, argv: &[String]) -> Option<String> {
    let (command, args) = argv.split_first()?;
    let mut child = match Command::new(command)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            warn!(command = %command, error = %err, "failed to spawn formatter");
            return None;
        }
    };

    // Scope the handle so the child sees EOF on its stdin.
    {
        let mut stdin = child.stdin.take()?;
        if stdin.write_all(source.as_bytes()).is_err() {
            let _ = child.kill();
            let _ = child.wait();
            return None;
        }
    }

    let output = child.wait_with_output().ok()?;
    if !output.status.success() {
        debug!(status = ?output.status, "formatter exited non-zero");
        return None;
    }
    String::from_utf8(output.stdout).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identity_formatter_round_trips() {
        let formatted = run_formatter("{ a = 1; }\n", &argv(&["cat"])).unwrap();
        assert_eq!(formatted, "{ a = 1; }\n");
    }

    #[test]
    fn formatting_twice_is_idempotent() {
        let once = run_formatter("x\n", &argv(&["cat"])).unwrap();
        let twice = run_formatter(&once, &argv(&["cat"])).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn non_zero_exit_yields_none() {
        assert!(run_formatter("x", &argv(&["false"])).is_none());
    }

    #[test]
    fn missing_binary_yields_none() {
        assert!(run_formatter("x", &argv(&["definitely-not-a-formatter-9f3a"])).is_none());
    }
}
