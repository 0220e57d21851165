/// Errors that can occur in the framing protocol engine.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The peer's handshake byte did not match the expected role value.
    ///
    /// Always fatal: the peer is misconfigured (e.g. two parents, or a
    /// stream that is not speaking this protocol at all).
    #[error("invalid handshake byte (expected 0x{expected:02x}, got 0x{got:02x})")]
    InvalidHandshake { expected: u8, got: u8 },

    /// Outbound payload exceeds the maximum frame length.
    ///
    /// Rejected synchronously at `send`; the connection stays usable.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The channel reached EOF or was closed by the peer.
    #[error("channel closed")]
    ConnectionClosed,

    /// The send queue is no longer accepting writes (a prior write failed
    /// or the codec shut down).
    #[error("send queue closed")]
    QueueClosed,

    /// An I/O error occurred on the channel.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
