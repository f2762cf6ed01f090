// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sc` - the sidecar CLI.
//!
//! `sc up` runs the workspace supervisor in the foreground (becoming the
//! session daemon); every other command talks to the running daemon over
//! the session socket.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod commands;
mod output;

use clap::{Parser, Subcommand};
use sc_core::LogStream;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "sc", version, about = "Workspace process supervisor")]
struct Cli {
    /// Manifest path (default: ./sidecar.toml)
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// Emit machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the workspace supervisor in the foreground
    Up {
        /// Do not watch the manifest and env files for changes
        #[arg(long)]
        no_watch: bool,
        /// Run children as plain host processes instead of tmux panes
        #[arg(long)]
        no_tmux: bool,
    },
    /// Stop the running session
    Down,
    /// List processes and their status
    Ps,
    /// Show one process's full state
    Status { name: String },
    /// Show captured logs for a process
    Logs {
        name: String,
        /// Stream: stdout, stderr, or combined
        #[arg(long, default_value = "combined")]
        stream: String,
        /// Number of trailing lines
        #[arg(short = 'n', long)]
        tail: Option<usize>,
    },
    /// Print a process's URL
    Url { name: String },
    /// Start a process
    Start {
        name: String,
        /// KEY=VALUE env overrides
        #[arg(short = 'e', long = "env")]
        env: Vec<String>,
        /// Reclaim the configured port first
        #[arg(long)]
        force: bool,
        /// Extra arguments appended to the configured command
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
    /// Stop a process
    Stop { name: String },
    /// Restart a process
    Restart { name: String },
    /// Floating interaction panes
    #[command(subcommand)]
    Interact(commands::interact::InteractCommand),
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("SC_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging();

    let manifest_path =
        cli.manifest.clone().unwrap_or_else(|| PathBuf::from(sc_manifest::MANIFEST_FILE_NAME));

    let result = match cli.command {
        Command::Up { no_watch, no_tmux } => {
            commands::up::run(manifest_path, !no_watch, no_tmux).await
        }
        Command::Down => commands::down::run(&manifest_path).await,
        Command::Ps => commands::ps::run(&manifest_path, cli.json).await,
        Command::Status { name } => commands::process::status(&manifest_path, &name).await,
        Command::Logs { name, stream, tail } => {
            let stream = match LogStream::parse(&stream) {
                Some(stream) => stream,
                None => {
                    eprintln!("error: unknown stream {stream:?} (stdout|stderr|combined)");
                    return ExitCode::from(1);
                }
            };
            commands::process::logs(&manifest_path, &name, stream, tail).await
        }
        Command::Url { name } => commands::process::url(&manifest_path, &name).await,
        Command::Start { name, env, force, args } => {
            commands::process::start(&manifest_path, &name, env, force, args).await
        }
        Command::Stop { name } => commands::process::stop(&manifest_path, &name).await,
        Command::Restart { name } => commands::process::restart(&manifest_path, &name).await,
        Command::Interact(command) => commands::interact::run(&manifest_path, command).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
