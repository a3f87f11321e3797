//! Nix language server binary.
//!
//! Usage:
//!   nix-lsp [options]
//!
//! Options:
//!   --stdio      Use stdio for communication (default)
//!   --log LEVEL  Log filter written to stderr (overrides RUST_LOG)
//!   --version    Show version information
//!   --help       Show this help message

use std::env;
use std::process;

use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut log_filter: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--stdio" => {}
            "--log" => {
                if i + 1 < args.len() {
                    log_filter = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--version" => {
                println!("nix-lsp {}", env!("CARGO_PKG_VERSION"));
                process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            other => {
                eprintln!("Unknown option: {other}");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    // stdout carries the protocol; logging must stay on stderr.
    let filter = match log_filter {
        Some(filter) => EnvFilter::new(filter),
        None => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    if let Err(err) = nix_lsp::run_stdio() {
        eprintln!("nix-lsp error: {err}");
        process::exit(1);
    }
}

fn print_help() {
    eprintln!("Nix Language Server");
    eprintln!();
    eprintln!("Usage: nix-lsp [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --stdio      Use stdio for communication (default)");
    eprintln!("  --log LEVEL  Log filter written to stderr (e.g. debug, nix_analyzer=trace)");
    eprintln!("  --version    Show version information");
    eprintln!("  --help       Show this help message");
}
