use std::collections::VecDeque;
use std::io::Write;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::codec::encode_prefix;
use crate::engine::ErrorLatch;
use crate::error::{FrameError, Result};

/// One queued write: a length prefix, a payload, or the leading handshake
/// byte. A message is exactly two units (prefix then payload) so large
/// payloads are never copied into a combined buffer.
struct WriteUnit {
    data: Bytes,
    /// Completion for the message this unit finishes (attached to the
    /// payload unit only).
    done: Option<mpsc::Sender<Result<()>>>,
}

struct SendQueue {
    units: VecDeque<WriteUnit>,
    closed: bool,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<SendQueue>,
    cond: Condvar,
}

/// Completion handle for one queued message.
///
/// Resolves once both of the message's write units have been handed to the
/// channel by the drain loop (accepted without loss, not necessarily
/// flushed to the peer).
#[derive(Debug)]
pub struct SendTicket {
    rx: mpsc::Receiver<Result<()>>,
}

impl SendTicket {
    /// Block until the message has fully left the queue.
    pub fn wait(self) -> Result<()> {
        match self.rx.recv() {
            Ok(result) => result,
            Err(_) => Err(FrameError::QueueClosed),
        }
    }
}

/// Ordered, backpressure-aware send side of a codec.
///
/// All writes go through a single background drain thread that processes
/// units strictly in enqueue order; a blocking `write_all` on the channel
/// is the backpressure wait. Because a message's two units are enqueued in
/// one critical section, messages are never interleaved or reordered even
/// under concurrent senders.
pub struct FrameSender {
    shared: Arc<Shared>,
    drain: Option<thread::JoinHandle<()>>,
}

impl FrameSender {
    /// Start a sender over a writable channel half.
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self::with_latch(writer, None)
    }

    pub(crate) fn with_latch<W: Write + Send + 'static>(
        writer: W,
        latch: Option<ErrorLatch>,
    ) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(SendQueue {
                units: VecDeque::new(),
                closed: false,
                shutdown: false,
            }),
            cond: Condvar::new(),
        });

        let drain = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("workerproc-send".into())
                .spawn(move || drain_loop(writer, &shared, latch))
                .expect("spawning the send drain thread should succeed")
        };

        Self {
            shared,
            drain: Some(drain),
        }
    }

    /// Queue a message for sending.
    ///
    /// Fails synchronously on oversized payloads (the connection stays
    /// usable) and on a closed queue. The returned ticket resolves when
    /// the message has fully drained.
    pub fn send(&self, payload: Bytes) -> Result<SendTicket> {
        let prefix = encode_prefix(payload.len())?;
        let (tx, rx) = mpsc::channel();

        let mut queue = self.shared.queue.lock().expect("send queue poisoned");
        if queue.closed || queue.shutdown {
            return Err(FrameError::QueueClosed);
        }
        queue.units.push_back(WriteUnit {
            data: Bytes::copy_from_slice(&prefix),
            done: None,
        });
        queue.units.push_back(WriteUnit {
            data: payload,
            done: Some(tx),
        });
        drop(queue);
        self.shared.cond.notify_one();

        Ok(SendTicket { rx })
    }

    /// Queue the single leading handshake byte, ahead of any frames.
    pub fn send_handshake(&self, byte: u8) -> Result<()> {
        let mut queue = self.shared.queue.lock().expect("send queue poisoned");
        if queue.closed || queue.shutdown {
            return Err(FrameError::QueueClosed);
        }
        queue.units.push_back(WriteUnit {
            data: Bytes::copy_from_slice(&[byte]),
            done: None,
        });
        drop(queue);
        self.shared.cond.notify_one();
        Ok(())
    }

    /// A ticket that resolves once everything queued before it has drained.
    pub fn drain_marker(&self) -> Result<SendTicket> {
        let (tx, rx) = mpsc::channel();
        let mut queue = self.shared.queue.lock().expect("send queue poisoned");
        if queue.closed || queue.shutdown {
            return Err(FrameError::QueueClosed);
        }
        queue.units.push_back(WriteUnit {
            data: Bytes::new(),
            done: Some(tx),
        });
        drop(queue);
        self.shared.cond.notify_one();
        Ok(SendTicket { rx })
    }

    /// Drain everything queued so far, then stop the drain thread.
    pub fn close(mut self) {
        self.begin_shutdown();
        if let Some(handle) = self.drain.take() {
            let _ = handle.join();
        }
    }

    fn begin_shutdown(&self) {
        let mut queue = self.shared.queue.lock().expect("send queue poisoned");
        queue.shutdown = true;
        drop(queue);
        self.shared.cond.notify_one();
    }
}

impl Drop for FrameSender {
    fn drop(&mut self) {
        // Signal shutdown but do not join: the drain thread finishes the
        // remaining queue on its own (or bails on the first write error).
        self.begin_shutdown();
    }
}

fn drain_loop<W: Write>(mut writer: W, shared: &Shared, latch: Option<ErrorLatch>) {
    loop {
        let unit = {
            let mut queue = shared.queue.lock().expect("send queue poisoned");
            loop {
                if let Some(unit) = queue.units.pop_front() {
                    break unit;
                }
                if queue.shutdown || queue.closed {
                    return;
                }
                queue = shared
                    .cond
                    .wait(queue)
                    .expect("send queue poisoned");
            }
        };

        trace!(bytes = unit.data.len(), "draining write unit");
        match write_unit(&mut writer, &unit.data) {
            Ok(()) => {
                if let Some(done) = unit.done {
                    let _ = done.send(Ok(()));
                }
            }
            Err(err) => {
                debug!(error = %err, "send drain failed; closing queue");
                if let Some(done) = unit.done {
                    let copy = std::io::Error::new(err.kind(), err.to_string());
                    let _ = done.send(Err(FrameError::Io(copy)));
                }
                if let Some(latch) = &latch {
                    latch.trip(FrameError::Io(err));
                }
                fail_pending(shared);
                return;
            }
        }
    }
}

fn write_unit<W: Write>(writer: &mut W, data: &[u8]) -> std::io::Result<()> {
    writer.write_all(data)?;
    writer.flush()
}

fn fail_pending(shared: &Shared) {
    let mut queue = shared.queue.lock().expect("send queue poisoned");
    queue.closed = true;
    for unit in queue.units.drain(..) {
        if let Some(done) = unit.done {
            let _ = done.send(Err(FrameError::QueueClosed));
        }
    }
}
