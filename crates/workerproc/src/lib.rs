//! Worker-process IPC: spawn a child with a private framed channel on a
//! dedicated descriptor, handshake, exchange length-prefixed messages, and
//! supervise the child's lifecycle.
//!
//! # Crate Structure
//!
//! - [`channel`]: OS-level channel plumbing (socketpair, descriptor wiring
//!   and adoption)
//! - [`frame`]: handshake and length-prefixed framing protocol engine
//! - [`peer`]: parent-side [`peer::Worker`] supervision and child-side
//!   [`peer::Connection`]

/// Re-export channel types.
pub mod channel {
    pub use workerproc_channel::*;
}

/// Re-export frame types.
pub mod frame {
    pub use workerproc_frame::*;
}

/// Re-export peer types.
pub mod peer {
    pub use workerproc_peer::*;
}
