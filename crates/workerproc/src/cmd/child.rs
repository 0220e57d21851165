//! Child-side behaviors, runnable as subcommands.
//!
//! These double as fixtures for the integration tests: `child-echo` is the
//! well-behaved worker, `child-burst` exercises high-volume sends (and,
//! with `--crash`, an abrupt mid-session death), `child-hang` never speaks
//! the protocol, and `child-exit` dies before connecting.

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use workerproc_peer::Connection;

use crate::cmd::{ChildBurstArgs, ChildEchoArgs, ChildExitArgs, ChildHangArgs};
use crate::exit::{connect_error, frame_error, CliResult, SUCCESS};

pub fn run_echo(args: ChildEchoArgs) -> CliResult<i32> {
    let connection =
        Connection::connect().map_err(|err| connect_error("worker connect failed", err))?;
    let connection = Arc::new(connection);

    let (quit_tx, quit_rx) = mpsc::channel();
    {
        let closure_connection = Arc::clone(&connection);
        let quit_token = args.quit_token.into_bytes();
        connection.set_on_message(move |payload| {
            let connection = &closure_connection;
            if payload.as_ref() == quit_token.as_slice() {
                tracing::debug!("quit token received");
                let _ = quit_tx.send(());
                return;
            }
            if let Err(err) = connection.send(payload) {
                tracing::warn!(error = %err, "echo send failed");
            }
        });
    }

    // Serve until the quit token arrives, then shut down in order.
    let _ = quit_rx.recv();
    connection
        .finish()
        .map_err(|err| connect_error("orderly shutdown failed", err))?;
    Ok(SUCCESS)
}

pub fn run_burst(args: ChildBurstArgs) -> CliResult<i32> {
    let connection =
        Connection::connect().map_err(|err| connect_error("worker connect failed", err))?;

    for i in 0..args.count {
        let payload = format!("burst-{i}");
        let ticket = connection
            .send(Bytes::from(payload.into_bytes()))
            .map_err(|err| frame_error("burst send failed", err))?;
        ticket
            .wait()
            .map_err(|err| frame_error("burst send failed", err))?;
    }

    if args.crash {
        tracing::warn!(count = args.count, "burst sent; crashing");
        std::process::exit(70);
    }

    connection
        .finish()
        .map_err(|err| connect_error("orderly shutdown failed", err))?;
    Ok(SUCCESS)
}

pub fn run_hang(_args: ChildHangArgs) -> CliResult<i32> {
    // Deliberately never adopts the channel or handshakes.
    loop {
        thread::sleep(Duration::from_secs(1));
    }
}

pub fn run_exit(args: ChildExitArgs) -> CliResult<i32> {
    std::process::exit(args.code);
}
