use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use workerproc_channel::ChannelPair;
use workerproc_frame::{CodecEvent, FrameCodec, FrameError, Role, SendTicket};

use crate::error::{Result, WorkerError};
use crate::lifetime::{Lifetime, LifetimeOutcome};
use crate::options::WorkerOptions;
use crate::sink::MessageSink;

/// How long a worker gets to exit after SIGTERM before it is SIGKILLed.
pub const EXIT_GRACE: Duration = Duration::from_secs(30);

/// How long to wait for the child's exit status when the channel EOFs
/// during the handshake, so the failure can name the real cause.
const CLOSE_ATTRIBUTION_WINDOW: Duration = Duration::from_millis(200);

/// After the exit status arrives, how long the channel gets to surface the
/// traffic the child sent before dying. EOF always follows the death of
/// the child's channel end, so this bound only matters if the reader
/// thread is wedged.
const CHANNEL_DRAIN_WINDOW: Duration = Duration::from_secs(5);

/// Everything the supervisor can observe, merged into one channel: codec
/// traffic from the reader thread and the exit status from the wait
/// thread. The phase-scoped receive loops over this channel are the whole
/// lifecycle state machine.
enum WorkerEvent {
    Codec(CodecEvent),
    Exited(ExitStatus),
}

enum Wait {
    Event(WorkerEvent),
    Timeout,
    Disconnected,
}

fn recv_bounded(events: &mpsc::Receiver<WorkerEvent>, deadline: Option<Instant>) -> Wait {
    match deadline {
        None => match events.recv() {
            Ok(event) => Wait::Event(event),
            Err(_) => Wait::Disconnected,
        },
        Some(deadline) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match events.recv_timeout(remaining) {
                Ok(event) => Wait::Event(event),
                Err(mpsc::RecvTimeoutError::Timeout) => Wait::Timeout,
                Err(mpsc::RecvTimeoutError::Disconnected) => Wait::Disconnected,
            }
        }
    }
}

struct Shared {
    /// True from handshake completion until the first terminal event.
    live: AtomicBool,
    /// True until the child's exit status has been observed (or teardown
    /// gave up waiting for it).
    child_alive: AtomicBool,
    pid: i32,
    lifetime: Lifetime,
    sink: MessageSink,
}

/// A spawned, handshaken worker process.
///
/// `spawn` blocks through the handshake: a returned `Worker` is live. The
/// terminal outcome is observed with [`Worker::wait`]; a clean exit status
/// of zero while live is the only success path.
pub struct Worker {
    shared: Arc<Shared>,
    codec: FrameCodec,
    pid: u32,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl Worker {
    /// Launch the worker, wire the channel onto its dedicated descriptor,
    /// and drive the handshake to completion.
    ///
    /// Any failure before the handshake completes rejects the spawn; the
    /// child, if started, is terminated.
    pub fn spawn(options: WorkerOptions) -> Result<Self> {
        let pair = ChannelPair::new()?;
        let mut cmd = options.command();
        pair.wire_command(&mut cmd);

        let child = cmd.spawn().map_err(WorkerError::Spawn)?;
        let pid = child.id();
        let stream = pair.into_parent_end();
        debug!(pid, "worker process spawned");

        let (events_tx, events_rx) = mpsc::channel();

        // Bridge codec events into the unified worker event channel.
        let (codec_tx, codec_rx) = mpsc::channel();
        {
            let events_tx = events_tx.clone();
            thread::Builder::new()
                .name("workerproc-events".into())
                .spawn(move || {
                    for event in codec_rx {
                        if events_tx.send(WorkerEvent::Codec(event)).is_err() {
                            break;
                        }
                    }
                })
                .expect("spawning the event bridge thread should succeed");
        }

        // The wait thread reaps the child and reports its exit status.
        {
            let events_tx = events_tx.clone();
            let mut child = child;
            thread::Builder::new()
                .name("workerproc-wait".into())
                .spawn(move || match child.wait() {
                    Ok(status) => {
                        debug!(?status, "worker process exited");
                        let _ = events_tx.send(WorkerEvent::Exited(status));
                    }
                    Err(err) => warn!(error = %err, "waiting on worker process failed"),
                })
                .expect("spawning the wait thread should succeed");
        }
        drop(events_tx);

        let codec = match FrameCodec::over_channel(stream, Role::Parent, codec_tx) {
            Ok(codec) => codec,
            Err(err) => {
                terminate(pid);
                return Err(err.into());
            }
        };
        if let Err(err) = codec.announce() {
            terminate(pid);
            return Err(err.into());
        }

        if let Err(err) = await_handshake(&events_rx, pid, options.handshake_deadline()) {
            return Err(err);
        }
        info!(pid, "worker handshake complete");

        let shared = Arc::new(Shared {
            live: AtomicBool::new(true),
            child_alive: AtomicBool::new(true),
            pid: pid as i32,
            lifetime: Lifetime::new(),
            sink: MessageSink::new(),
        });

        {
            let shared = Arc::clone(&shared);
            let max_duration = options.max_duration_deadline();
            thread::Builder::new()
                .name("workerproc-supervise".into())
                .spawn(move || supervise(&shared, &events_rx, max_duration))
                .expect("spawning the supervisor thread should succeed");
        }

        Ok(Self { shared, codec, pid })
    }

    /// Queue a message to the worker. Fails unless the worker is live.
    pub fn send(&self, payload: Bytes) -> Result<SendTicket> {
        if !self.is_live() {
            return Err(WorkerError::NotLive);
        }
        Ok(self.codec.send(payload)?)
    }

    /// Attach the inbound message handler. Messages that arrived since the
    /// handshake are flushed to it in order; messages arriving after the
    /// worker stops being live are dropped, never delivered late.
    pub fn set_on_message(&self, handler: impl FnMut(Bytes) + Send + 'static) {
        self.shared.sink.attach(Box::new(handler));
    }

    /// Forward a signal to the worker process. A no-op once the child's
    /// exit has been observed.
    pub fn kill(&self, signal: Signal) {
        if self.shared.child_alive.load(Ordering::SeqCst) {
            debug!(pid = self.pid, ?signal, "signalling worker");
            let _ = signal::kill(Pid::from_raw(self.shared.pid), signal);
        }
    }

    /// Block until the worker reaches a terminal state.
    pub fn wait(&self) -> LifetimeOutcome {
        self.shared.lifetime.wait()
    }

    /// The terminal outcome if already reached, without blocking.
    pub fn try_wait(&self) -> Option<LifetimeOutcome> {
        self.shared.lifetime.poll()
    }

    pub fn is_live(&self) -> bool {
        self.shared.live.load(Ordering::SeqCst)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Best-effort SIGTERM used on spawn-phase failure paths.
fn terminate(pid: u32) {
    let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

/// Handshake phase: one bounded receive loop over the unified channel.
fn await_handshake(
    events: &mpsc::Receiver<WorkerEvent>,
    pid: u32,
    timeout: Option<Duration>,
) -> Result<()> {
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        match recv_bounded(events, deadline) {
            Wait::Event(WorkerEvent::Codec(CodecEvent::Handshake)) => return Ok(()),
            // The peer cannot frame a message before its handshake byte, so
            // a message here means the handshake event is right behind it.
            Wait::Event(WorkerEvent::Codec(CodecEvent::Message(_))) => continue,
            Wait::Event(WorkerEvent::Codec(CodecEvent::Error(FrameError::ConnectionClosed))) => {
                // EOF is usually the child dying; prefer reporting its exit
                // status when it arrives promptly.
                if let Some(status) = await_exit(events, CLOSE_ATTRIBUTION_WINDOW) {
                    return Err(WorkerError::ExitedBeforeHandshake { status });
                }
                terminate(pid);
                return Err(WorkerError::ClosedBeforeHandshake);
            }
            Wait::Event(WorkerEvent::Codec(CodecEvent::Error(err))) => {
                terminate(pid);
                return Err(err.into());
            }
            Wait::Event(WorkerEvent::Exited(status)) => {
                return Err(WorkerError::ExitedBeforeHandshake { status });
            }
            Wait::Timeout => {
                terminate(pid);
                let timeout = timeout.unwrap_or_default();
                warn!(pid, ?timeout, "worker handshake timed out");
                return Err(WorkerError::HandshakeTimeout(timeout));
            }
            Wait::Disconnected => {
                terminate(pid);
                return Err(WorkerError::ClosedBeforeHandshake);
            }
        }
    }
}

fn await_exit(events: &mpsc::Receiver<WorkerEvent>, window: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(WorkerEvent::Exited(status)) => return Some(status),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

/// Live phase: deliver messages, watch for the terminal event, enforce the
/// running-time bound.
///
/// The channel EOF and the exit status race each other: a finishing child
/// shuts its channel down before exiting, and a crashing child's exit
/// status can overtake messages still in the socket. Either way the exit
/// status decides the outcome, and the channel is drained first so every
/// message the child got out is delivered.
fn supervise(
    shared: &Shared,
    events: &mpsc::Receiver<WorkerEvent>,
    max_duration: Option<Duration>,
) {
    let deadline = max_duration.map(|d| Instant::now() + d);
    loop {
        match recv_bounded(events, deadline) {
            Wait::Event(WorkerEvent::Codec(CodecEvent::Message(payload))) => {
                deliver(shared, payload);
            }
            Wait::Event(WorkerEvent::Codec(CodecEvent::Handshake)) => {}
            Wait::Event(WorkerEvent::Codec(CodecEvent::Error(FrameError::ConnectionClosed))) => {
                match await_exit_status(shared, events, EXIT_GRACE) {
                    Some(status) => settle(shared, events, status),
                    None => fail(shared, events, FrameError::ConnectionClosed.into()),
                }
                return;
            }
            Wait::Event(WorkerEvent::Codec(CodecEvent::Error(err))) => {
                fail(shared, events, err.into());
                return;
            }
            Wait::Event(WorkerEvent::Exited(status)) => {
                shared.child_alive.store(false, Ordering::SeqCst);
                drain_channel(shared, events, CHANNEL_DRAIN_WINDOW);
                settle(shared, events, status);
                return;
            }
            Wait::Timeout => {
                let limit = max_duration.unwrap_or_default();
                fail(shared, events, WorkerError::MaxDurationExceeded(limit));
                return;
            }
            Wait::Disconnected => {
                // Both feeder threads gone without a terminal event.
                fail(shared, events, FrameError::ConnectionClosed.into());
                return;
            }
        }
    }
}

fn deliver(shared: &Shared, payload: Bytes) {
    if shared.live.load(Ordering::SeqCst) {
        shared.sink.deliver(payload);
    } else {
        debug!(bytes = payload.len(), "dropping message; worker not live");
    }
}

/// Wait for the exit status after channel EOF, delivering any remaining
/// traffic meanwhile.
fn await_exit_status(
    shared: &Shared,
    events: &mpsc::Receiver<WorkerEvent>,
    window: Duration,
) -> Option<ExitStatus> {
    let deadline = Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(WorkerEvent::Exited(status)) => {
                shared.child_alive.store(false, Ordering::SeqCst);
                return Some(status);
            }
            Ok(WorkerEvent::Codec(CodecEvent::Message(payload))) => deliver(shared, payload),
            Ok(WorkerEvent::Codec(_)) => {}
            Err(_) => return None,
        }
    }
}

/// After the exit status, deliver whatever the channel still holds, up to
/// its EOF or error.
fn drain_channel(shared: &Shared, events: &mpsc::Receiver<WorkerEvent>, window: Duration) {
    let deadline = Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(WorkerEvent::Codec(CodecEvent::Message(payload))) => deliver(shared, payload),
            Ok(WorkerEvent::Codec(CodecEvent::Error(_))) => return,
            Ok(_) => {}
            Err(_) => return,
        }
    }
}

/// Resolve the lifetime from the child's exit status; zero while live is
/// the only success path.
fn settle(shared: &Shared, events: &mpsc::Receiver<WorkerEvent>, status: ExitStatus) {
    if status.success() {
        if shared.live.swap(false, Ordering::SeqCst) {
            info!(pid = shared.pid, "worker exited cleanly");
            shared.lifetime.resolve(Ok(()));
        }
    } else {
        fail(shared, events, WorkerError::NonZeroExit { status });
    }
}

/// Terminal error routine. Fires at most once; the first error wins.
///
/// If the child has not been observed to exit yet: SIGTERM, wait up to
/// [`EXIT_GRACE`] for the exit event, and SIGKILL on grace expiry (in which
/// case the lifetime reports the missed deadline instead of the trigger).
fn fail(shared: &Shared, events: &mpsc::Receiver<WorkerEvent>, error: WorkerError) {
    if !shared.live.swap(false, Ordering::SeqCst) {
        debug!(error = %error, "worker already torn down; dropping error");
        return;
    }
    warn!(pid = shared.pid, error = %error, "worker failed");
    let error = Arc::new(error);

    if !shared.child_alive.swap(false, Ordering::SeqCst) {
        shared.lifetime.resolve(Err(error));
        return;
    }

    let pid = Pid::from_raw(shared.pid);
    if let Err(err) = signal::kill(pid, Signal::SIGTERM) {
        // Likely already gone; the wait thread will confirm.
        debug!(error = %err, "SIGTERM delivery failed");
    }

    match await_exit(events, EXIT_GRACE) {
        Some(status) => {
            debug!(?status, "worker exited within the grace period");
            shared.lifetime.resolve(Err(error));
        }
        None => {
            warn!(pid = shared.pid, "worker ignored SIGTERM; killing");
            let _ = signal::kill(pid, Signal::SIGKILL);
            shared.lifetime.resolve(Err(Arc::new(WorkerError::KillTimeout)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::WorkerOptions;

    #[test]
    fn handshake_timeout_rejects_spawn() {
        // sleep never speaks the protocol.
        let options = WorkerOptions::new("/bin/sleep")
            .arg("5")
            .handshake_timeout(Some(Duration::from_millis(150)));

        let started = Instant::now();
        let err = Worker::spawn(options).unwrap_err();
        assert!(matches!(err, WorkerError::HandshakeTimeout(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn exit_before_handshake_rejects_spawn() {
        let options =
            WorkerOptions::new("/bin/true").handshake_timeout(Some(Duration::from_secs(5)));

        let err = Worker::spawn(options).unwrap_err();
        assert!(matches!(
            err,
            WorkerError::ExitedBeforeHandshake { .. } | WorkerError::ClosedBeforeHandshake
        ));
    }

    #[test]
    fn missing_program_fails_spawn() {
        let options = WorkerOptions::new("/nonexistent/workerproc-no-such-binary");
        let err = Worker::spawn(options).unwrap_err();
        assert!(matches!(err, WorkerError::Spawn(_)));
    }
}
