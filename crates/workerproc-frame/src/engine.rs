use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use workerproc_channel::ChannelStream;

use crate::codec::Role;
use crate::decoder::{DecodeEvent, FrameDecoder};
use crate::error::{FrameError, Result};
use crate::sender::{FrameSender, SendTicket};

/// Size of the buffer handed to each blocking channel read.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Inbound event from a running codec, delivered through the event channel.
///
/// Events are sent from background threads, never invoked synchronously from
/// a caller's stack, so a receiver attached before the codec starts observes
/// every event in order.
#[derive(Debug)]
pub enum CodecEvent {
    /// The peer's handshake byte arrived and validated.
    Handshake,
    /// A complete inbound message.
    Message(Bytes),
    /// The codec failed. Emitted at most once; the codec is dead after.
    Error(FrameError),
}

/// One-shot error signal shared by the reader and drain threads.
///
/// Whichever side fails first delivers the single `CodecEvent::Error`;
/// later failures are dropped.
pub(crate) struct ErrorLatch {
    tripped: Arc<AtomicBool>,
    events: mpsc::Sender<CodecEvent>,
}

impl Clone for ErrorLatch {
    fn clone(&self) -> Self {
        Self {
            tripped: Arc::clone(&self.tripped),
            events: self.events.clone(),
        }
    }
}

impl ErrorLatch {
    fn new(events: mpsc::Sender<CodecEvent>) -> Self {
        Self {
            tripped: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    pub(crate) fn trip(&self, error: FrameError) {
        if self.tripped.swap(true, Ordering::SeqCst) {
            trace!(error = %error, "codec error after latch tripped; dropping");
            return;
        }
        debug!(error = %error, "codec error");
        let _ = self.events.send(CodecEvent::Error(error));
    }

    fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

/// A running bidirectional framing codec over one channel.
///
/// Owns a reader thread (incremental decode, events forwarded to the
/// supplied channel) and a send drain thread (ordered writes with
/// backpressure). Inbound delivery is strictly ordered: handshake first,
/// then messages in arrival order, with at most one trailing error.
pub struct FrameCodec {
    role: Role,
    sender: Option<FrameSender>,
    reader: Option<thread::JoinHandle<()>>,
}

impl FrameCodec {
    /// Start a codec over separate read and write halves.
    ///
    /// `events` must be wired to a receiver before messages can arrive,
    /// which the mpsc channel guarantees by construction.
    pub fn spawn<R, W>(reader: R, writer: W, role: Role, events: mpsc::Sender<CodecEvent>) -> Self
    where
        R: Read + Send + 'static,
        W: std::io::Write + Send + 'static,
    {
        let latch = ErrorLatch::new(events.clone());
        let sender = FrameSender::with_latch(writer, Some(latch.clone()));

        let reader = thread::Builder::new()
            .name("workerproc-recv".into())
            .spawn(move || read_loop(reader, role, events, latch))
            .expect("spawning the codec reader thread should succeed");

        Self {
            role,
            sender: Some(sender),
            reader: Some(reader),
        }
    }

    /// Start a codec over both directions of a channel stream.
    pub fn over_channel(
        stream: ChannelStream,
        role: Role,
        events: mpsc::Sender<CodecEvent>,
    ) -> Result<Self> {
        let writer = stream
            .try_clone()
            .map_err(|err| FrameError::Io(std::io::Error::other(err)))?;
        Ok(Self::spawn(stream, writer, role, events))
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Queue this side's handshake byte. Must be called exactly once,
    /// before any `send`.
    pub fn announce(&self) -> Result<()> {
        self.sender()?.send_handshake(self.role.handshake_byte())
    }

    /// Queue an outbound message. The ticket resolves once the message has
    /// fully drained to the channel.
    pub fn send(&self, payload: Bytes) -> Result<SendTicket> {
        self.sender()?.send(payload)
    }

    /// A ticket resolving once every previously queued message has drained.
    pub fn drain(&self) -> Result<SendTicket> {
        self.sender()?.drain_marker()
    }

    /// Drain outstanding writes and stop the send thread.
    ///
    /// The reader thread exits on its own when the channel reaches EOF or
    /// errors; callers that want a prompt stop should shut the channel
    /// down first.
    pub fn close(mut self) {
        if let Some(sender) = self.sender.take() {
            sender.close();
        }
    }

    fn sender(&self) -> Result<&FrameSender> {
        self.sender.as_ref().ok_or(FrameError::QueueClosed)
    }
}

impl Drop for FrameCodec {
    fn drop(&mut self) {
        // Detach the reader thread; it winds down on its own once the
        // channel closes. The sender's own Drop signals its drain thread.
        if let Some(reader) = self.reader.take() {
            drop(reader);
        }
    }
}

fn read_loop<R: Read>(mut reader: R, role: Role, events: mpsc::Sender<CodecEvent>, latch: ErrorLatch) {
    let mut decoder = FrameDecoder::new(role);
    let mut buf = BytesMut::zeroed(READ_CHUNK_SIZE);

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => {
                trace!("channel reached EOF");
                latch.trip(FrameError::ConnectionClosed);
                return;
            }
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                latch.trip(FrameError::Io(err));
                return;
            }
        };

        let chunk = Bytes::copy_from_slice(&buf[..n]);
        match decoder.feed(chunk) {
            Ok(decoded) => {
                for event in decoded {
                    let forwarded = match event {
                        DecodeEvent::Handshake => CodecEvent::Handshake,
                        DecodeEvent::Message(payload) => CodecEvent::Message(payload),
                    };
                    if events.send(forwarded).is_err() {
                        // Receiver gone: nobody is listening anymore.
                        return;
                    }
                }
            }
            Err(err) => {
                latch.trip(err);
                return;
            }
        }

        if latch.is_tripped() {
            return;
        }
    }
}
