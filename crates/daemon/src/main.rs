// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sidecar daemon (scd)
//!
//! Foreground supervisor for one workspace. Usually spawned by the `sc`
//! CLI; run it directly to supervise a workspace with logs on stderr and
//! in the session's `daemon.log`.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use sc_core::SessionIdentity;
use sc_daemon::env;
use sc_daemon::{run_session, SessionOptions};
use sc_manifest::{Manifest, MANIFEST_FILE_NAME};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn usage() {
    println!("scd {VERSION}");
    println!("Sidecar daemon - per-workspace process supervisor");
    println!();
    println!("USAGE:");
    println!("    scd [--manifest <path>] [--no-watch] [--no-tmux]");
    println!();
    println!("OPTIONS:");
    println!("    --manifest <path>    Manifest to supervise (default: ./{MANIFEST_FILE_NAME})");
    println!("    --no-watch           Do not watch the manifest for changes");
    println!("    --no-tmux            Run children as plain host processes");
    println!("    -h, --help           Print help information");
    println!("    -v, --version        Print version information");
}

struct Args {
    manifest_path: PathBuf,
    watch: bool,
    no_tmux: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        manifest_path: PathBuf::from(MANIFEST_FILE_NAME),
        watch: true,
        no_tmux: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--manifest" => {
                args.manifest_path =
                    PathBuf::from(iter.next().ok_or("--manifest needs a path")?);
            }
            "--no-watch" => args.watch = false,
            "--no-tmux" => args.no_tmux = true,
            "--version" | "-V" | "-v" => {
                println!("scd {VERSION}");
                std::process::exit(0);
            }
            "--help" | "-h" | "help" => {
                usage();
                std::process::exit(0);
            }
            other => return Err(format!("unexpected argument '{other}'")),
        }
    }
    Ok(args)
}

fn setup_logging(identity: &SessionIdentity) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let runtime_dir = identity.runtime_dir(&env::runtime_root());
    let filter = tracing_subscriber::EnvFilter::try_from_env("SC_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match std::fs::create_dir_all(&runtime_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::never(&runtime_dir, "daemon.log");
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .with(
                    tracing_subscriber::fmt::layer().with_writer(file_writer).with_ansi(false),
                )
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!("Usage: scd [--manifest <path>] [--no-watch] [--no-tmux]");
            return std::process::ExitCode::from(1);
        }
    };

    let manifest = match Manifest::load(&args.manifest_path) {
        Ok(manifest) => manifest,
        Err(e) => {
            eprintln!("error: {e}");
            return std::process::ExitCode::from(1);
        }
    };

    let identity = match SessionIdentity::derive(&manifest.config_dir, manifest.reuse.key()) {
        Ok(identity) => identity,
        Err(e) => {
            eprintln!("error: cannot resolve workspace directory: {e}");
            return std::process::ExitCode::from(1);
        }
    };
    let _log_guard = setup_logging(&identity);

    let opts = SessionOptions {
        manifest_path: args.manifest_path,
        watch: args.watch,
        no_tmux: args.no_tmux,
    };
    match run_session(manifest, opts).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::ExitCode::from(1)
        }
    }
}
