use std::process::ExitStatus;
use std::time::Duration;

/// Errors terminating or rejecting a worker on the parent side.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The worker process could not be started.
    #[error("failed to spawn worker process: {0}")]
    Spawn(#[source] std::io::Error),

    /// Channel plumbing error.
    #[error("channel error: {0}")]
    Channel(#[from] workerproc_channel::ChannelError),

    /// Framing protocol error.
    #[error("frame error: {0}")]
    Frame(#[from] workerproc_frame::FrameError),

    /// The worker did not announce itself in time.
    #[error("worker did not complete the handshake within {0:?}")]
    HandshakeTimeout(Duration),

    /// The worker process exited before the handshake completed.
    #[error("worker exited before completing the handshake ({status})")]
    ExitedBeforeHandshake { status: ExitStatus },

    /// The channel closed before the handshake completed.
    #[error("channel closed before the worker completed the handshake")]
    ClosedBeforeHandshake,

    /// The worker exited with a failure status.
    #[error("worker exited with {status}")]
    NonZeroExit { status: ExitStatus },

    /// The worker outlived its allowed running time.
    #[error("worker exceeded its maximum duration of {0:?}")]
    MaxDurationExceeded(Duration),

    /// The worker ignored SIGTERM for the whole grace period.
    #[error("worker did not terminate in time")]
    KillTimeout,

    /// Operation requires a live worker.
    #[error("worker is not live")]
    NotLive,
}

pub type Result<T> = std::result::Result<T, WorkerError>;

/// Errors establishing the child-side connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The dedicated channel descriptor is missing or not a socket.
    #[error("channel error: {0}")]
    Channel(#[from] workerproc_channel::ChannelError),

    /// Protocol violation or read failure during the handshake.
    #[error("frame error: {0}")]
    Frame(#[from] workerproc_frame::FrameError),

    /// The parent closed the channel before announcing itself.
    #[error("channel closed before the parent completed the handshake")]
    ClosedBeforeHandshake,
}
