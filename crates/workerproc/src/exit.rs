use std::fmt;
use std::io;

use workerproc_channel::ChannelError;
use workerproc_frame::FrameError;
use workerproc_peer::{ConnectError, WorkerError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const CHANNEL_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::Pair(source) | ChannelError::Io(source) => io_error(context, source),
        other => CliError::new(CHANNEL_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn connect_error(context: &str, err: ConnectError) -> CliError {
    match err {
        ConnectError::Channel(err) => channel_error(context, err),
        ConnectError::Frame(err) => frame_error(context, err),
        ConnectError::ClosedBeforeHandshake => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

pub fn worker_error(context: &str, err: &WorkerError) -> CliError {
    match err {
        WorkerError::Spawn(source) => CliError::new(
            if source.kind() == io::ErrorKind::NotFound {
                USAGE
            } else {
                INTERNAL
            },
            format!("{context}: {err}"),
        ),
        WorkerError::Channel(_) => CliError::new(CHANNEL_ERROR, format!("{context}: {err}")),
        WorkerError::HandshakeTimeout(_) | WorkerError::MaxDurationExceeded(_) => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        WorkerError::NonZeroExit { .. }
        | WorkerError::ExitedBeforeHandshake { .. }
        | WorkerError::ClosedBeforeHandshake
        | WorkerError::KillTimeout => CliError::new(FAILURE, format!("{context}: {err}")),
        _ => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}
