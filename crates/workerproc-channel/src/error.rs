use std::os::fd::RawFd;

/// Errors that can occur while setting up or using the worker channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Failed to create the socketpair backing a channel.
    #[error("failed to create channel pair: {0}")]
    Pair(std::io::Error),

    /// Could not stat the inherited channel descriptor.
    #[error("failed to stat fd {fd}: {source}")]
    Stat { fd: RawFd, source: std::io::Error },

    /// The inherited descriptor is not a socket.
    ///
    /// This is a configuration error: the process was not launched as a
    /// worker child, or something else occupies the channel slot.
    #[error(
        "fd {fd} is not a socket; was this process spawned as a worker child \
         with the channel on fd {fd}?"
    )]
    NotASocket { fd: RawFd },

    /// An I/O error occurred on the channel stream.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
