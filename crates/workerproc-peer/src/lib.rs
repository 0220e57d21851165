//! Worker lifecycle supervision (parent side) and channel connection
//! (child side).
//!
//! [`Worker`] spawns a child process with the protocol channel wired onto
//! its dedicated descriptor, drives the handshake, supervises the child
//! through its live phase, and resolves a one-shot [`Lifetime`] outcome on
//! termination. [`Connection`] is the counterpart a worker process uses to
//! adopt the channel and talk back.
//!
//! Lifecycle states move one way only: unstarted, handshaking, live, then
//! exactly one of exited, errored, or killed. All fatal conditions on the
//! parent side converge on a single idempotent teardown routine; the first
//! error wins.

pub mod connection;
pub mod error;
pub mod lifetime;
pub mod options;
mod sink;
pub mod worker;

pub use connection::Connection;
pub use error::{ConnectError, Result, WorkerError};
pub use lifetime::{Lifetime, LifetimeOutcome};
pub use options::{StdinMode, WorkerOptions, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_DURATION};
pub use worker::{Worker, EXIT_GRACE};

pub use nix::sys::signal::Signal;
