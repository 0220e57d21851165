use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use workerproc_peer::{Signal, Worker, WorkerOptions};

use crate::cmd::RunArgs;
use crate::exit::{frame_error, worker_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_message, OutputFormat};

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let handshake_timeout = parse_deadline(&args.handshake_timeout)?;
    let max_duration = parse_deadline(&args.max_duration)?;

    let mut options = WorkerOptions::new(&args.program)
        .args(args.args)
        .handshake_timeout(handshake_timeout)
        .max_duration(max_duration);
    if let Some(interpreter) = args.interpreter {
        options = options.interpreter(interpreter);
    }

    let worker =
        Worker::spawn(options).map_err(|err| worker_error("worker spawn failed", &err))?;
    tracing::info!(pid = worker.pid(), "worker live");
    let worker = Arc::new(worker);

    {
        let mut seq = 0usize;
        worker.set_on_message(move |payload| {
            seq += 1;
            print_message(seq, payload.as_ref(), format);
        });
    }

    install_ctrlc_handler(Arc::clone(&worker))?;

    for message in &args.send {
        let ticket = worker
            .send(Bytes::copy_from_slice(message.as_bytes()))
            .map_err(|err| worker_error("send failed", &err))?;
        ticket
            .wait()
            .map_err(|err| frame_error("send failed", err))?;
    }

    match worker.wait() {
        Ok(()) => Ok(SUCCESS),
        Err(err) => Err(worker_error("worker failed", &err)),
    }
}

fn install_ctrlc_handler(worker: Arc<Worker>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        tracing::info!("interrupt received; terminating worker");
        worker.kill(Signal::SIGTERM);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

/// Parse a deadline flag: `5s`, `500ms`, a bare number of seconds, or
/// `none` to disable the bound.
fn parse_deadline(input: &str) -> CliResult<Option<Duration>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "deadline must not be empty"));
    }
    if input.eq_ignore_ascii_case("none") {
        return Ok(None);
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid deadline value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(
            USAGE,
            "deadline must be greater than zero (use 'none' to disable)",
        ));
    }

    match unit {
        "ms" => Ok(Some(Duration::from_millis(value))),
        _ => Ok(Some(Duration::from_secs(value))),
    }
}
