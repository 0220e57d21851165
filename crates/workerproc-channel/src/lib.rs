//! Dedicated-channel plumbing for worker processes.
//!
//! A worker process talks to its parent over a private byte stream on a
//! well-known file descriptor, separate from stdin/stdout/stderr. This crate
//! owns the OS-level mechanics:
//!
//! - [`ChannelPair`]: a connected socketpair, one end per process, with
//!   spawn-time wiring of the child end onto [`WORKER_CHANNEL_FD`]
//! - [`adopt_worker_fd`]: child-side adoption of the inherited descriptor,
//!   with descriptor-kind validation
//!
//! No framing or protocol knowledge lives here.

pub mod error;
pub mod pair;
pub mod stream;

pub use error::{ChannelError, Result};
pub use pair::{adopt_fd, adopt_worker_fd, ChannelPair, WORKER_CHANNEL_FD};
pub use stream::ChannelStream;
