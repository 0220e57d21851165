use clap::{Args, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod child;
pub mod info;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Spawn a worker process and drive it.
    Run(RunArgs),
    /// Run as a worker child that echoes messages back to the parent.
    ChildEcho(ChildEchoArgs),
    /// Run as a worker child that sends a burst of messages.
    ChildBurst(ChildBurstArgs),
    /// Run as a broken worker child that never handshakes.
    ChildHang(ChildHangArgs),
    /// Exit immediately with a status, without connecting.
    ChildExit(ChildExitArgs),
    /// Print protocol constants and defaults.
    Info(InfoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::ChildEcho(args) => child::run_echo(args),
        Command::ChildBurst(args) => child::run_burst(args),
        Command::ChildHang(args) => child::run_hang(args),
        Command::ChildExit(args) => child::run_exit(args),
        Command::Info(args) => info::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Worker program to spawn.
    pub program: PathBuf,
    /// Arguments passed to the worker.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<OsString>,
    /// Run the program through an interpreter.
    #[arg(long, value_name = "PATH")]
    pub interpreter: Option<PathBuf>,
    /// Message to send once live (repeatable, sent in order).
    #[arg(long = "send", value_name = "DATA")]
    pub send: Vec<String>,
    /// Handshake deadline (e.g. 5s, 500ms, none).
    #[arg(long, default_value = "60s")]
    pub handshake_timeout: String,
    /// Maximum worker running time (e.g. 60s, none).
    #[arg(long, default_value = "60s")]
    pub max_duration: String,
}

#[derive(Args, Debug)]
pub struct ChildEchoArgs {
    /// Message that makes the child finish and exit cleanly.
    #[arg(long, default_value = "quit")]
    pub quit_token: String,
}

#[derive(Args, Debug)]
pub struct ChildBurstArgs {
    /// Number of messages to send after connecting.
    #[arg(long, default_value = "5")]
    pub count: usize,
    /// Exit abruptly (non-zero, no orderly shutdown) after the burst.
    #[arg(long)]
    pub crash: bool,
}

#[derive(Args, Debug, Default)]
pub struct ChildHangArgs {}

#[derive(Args, Debug)]
pub struct ChildExitArgs {
    /// Exit status to report.
    #[arg(long, default_value = "1")]
    pub code: i32,
}

#[derive(Args, Debug, Default)]
pub struct InfoArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
