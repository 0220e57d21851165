mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "workerproc", version, about = "Worker process supervision CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_subcommand() {
        // Flags come before the program: everything after it belongs to
        // the worker.
        let cli = Cli::try_parse_from([
            "workerproc",
            "run",
            "--send",
            "ping",
            "--send",
            "quit",
            "--handshake-timeout",
            "5s",
            "/usr/local/bin/worker",
            "--worker-flag",
        ])
        .expect("run args should parse");

        let args = match cli.command {
            Command::Run(args) => args,
            other => panic!("expected run, got {other:?}"),
        };
        assert_eq!(args.send, ["ping", "quit"]);
        assert_eq!(args.args, ["--worker-flag"]);
    }

    #[test]
    fn parses_child_echo_subcommand() {
        let cli = Cli::try_parse_from(["workerproc", "child-echo", "--quit-token", "bye"])
            .expect("child-echo args should parse");
        assert!(matches!(cli.command, Command::ChildEcho(_)));
    }

    #[test]
    fn parses_child_burst_with_crash() {
        let cli = Cli::try_parse_from(["workerproc", "child-burst", "--count", "8", "--crash"])
            .expect("child-burst args should parse");
        let args = match cli.command {
            Command::ChildBurst(args) => args,
            other => panic!("expected child-burst, got {other:?}"),
        };
        assert_eq!(args.count, 8);
        assert!(args.crash);
    }
}
