//! Length-prefixed framing protocol engine for worker-process IPC.
//!
//! This is the protocol core. Each direction of the channel carries:
//! - A single leading handshake byte announcing the sender's role
//!   (`0x00` parent, `0x01` child), validated before any frame parsing
//! - Frames: a 4-byte big-endian payload length followed by exactly that
//!   many payload bytes, packed back-to-back with no delimiter
//!
//! [`FrameDecoder`] is the incremental receive state machine (handles
//! messages split arbitrarily across arrival chunks), [`FrameSender`] the
//! ordered backpressure-aware send queue, and [`FrameCodec`] composes both
//! over a channel's read/write halves, delivering inbound events through an
//! mpsc channel.

pub mod codec;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod sender;

pub use codec::{
    Role, HANDSHAKE_CHILD, HANDSHAKE_PARENT, MAX_FRAME_LEN, PREFIX_SIZE,
};
pub use decoder::{DecodeEvent, FrameDecoder};
pub use engine::{CodecEvent, FrameCodec};
pub use error::{FrameError, Result};
pub use sender::{FrameSender, SendTicket};
